use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Exponential backoff with proportional jitter, capped at `backoff_max`.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    config: RetryConfig,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn base_delay_ms(&self, attempt: u16) -> u64 {
        if attempt == 0 {
            return 0;
        }

        let exp = i32::from(attempt.saturating_sub(1));
        let scaled = (self.config.backoff_base_ms as f64) * 2f64.powi(exp);
        let capped = scaled.min(self.config.backoff_max_ms as f64);
        capped.max(0.0) as u64
    }

    pub fn delay(&self, attempt: u16) -> Duration {
        let mut rng = rand::rng();
        Duration::from_millis(self.jittered_delay_ms(attempt, &mut rng))
    }

    fn jittered_delay_ms(&self, attempt: u16, rng: &mut impl Rng) -> u64 {
        let base = self.base_delay_ms(attempt);
        if base == 0 {
            return 0;
        }

        let upper_cap = self.config.backoff_max_ms.max(1) as f64;
        let spread = base as f64 * f64::from(self.config.jitter_ratio.max(0.0));
        if spread < 1.0 {
            return base;
        }
        let lower = (base as f64 - spread).max(1.0);
        let upper = (base as f64 + spread).min(upper_cap).max(lower);

        rng.random_range(lower..=upper).round() as u64
    }
}

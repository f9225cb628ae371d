use std::time::Duration;

use govscan_model::Region;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SCANNER_ROLE_NAME: &str = "GRCGovernanceScanner";

/// Upper bound accepted for per-job fan-out.
pub const MAX_TASK_PARALLELISM: usize = 256;

/// Process-wide engine settings.
///
/// Built once at startup and shared by `Arc` with the scheduler and every
/// job. Nothing inside the engine reads the environment after construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// System-wide cap on running scan jobs.
    pub max_concurrent_scans: usize,
    /// Wall-clock deadline per job, in milliseconds.
    pub scan_timeout_ms: u64,
    /// Region scanned when neither the request nor the account names one.
    pub aws_region: Region,
    /// Role assumed when the account does not override it.
    pub aws_scanner_role_name: String,
    /// Queueing behaviour once every scan slot is busy.
    pub admission: AdmissionConfig,
    /// Per-job cap on concurrently running (account, region) tasks.
    pub task_parallelism: usize,
    /// What the job does with in-flight tasks once its deadline passes.
    pub deadline_policy: DeadlinePolicy,
    /// Bound on a single collector call, in milliseconds.
    pub request_timeout_ms: u64,
    /// Per-page retry policy for transient collector failures.
    pub retry: RetryConfig,
    /// Number of finished jobs kept queryable before the oldest is evicted.
    pub retain_finished_jobs: usize,
    /// Capacity of the scan event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 5,
            scan_timeout_ms: minutes_to_ms(30),
            aws_region: Region::default(),
            aws_scanner_role_name: DEFAULT_SCANNER_ROLE_NAME.to_string(),
            admission: AdmissionConfig::default(),
            task_parallelism: 8,
            deadline_policy: DeadlinePolicy::default(),
            request_timeout_ms: 30_000,
            retry: RetryConfig::default(),
            retain_finished_jobs: 256,
            event_channel_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn with_scan_timeout_minutes(mut self, minutes: u64) -> Self {
        self.scan_timeout_ms = minutes_to_ms(minutes);
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.max_concurrent_scans == 0 {
            return Err(InvalidConfig::new(
                "MAX_CONCURRENT_SCANS",
                "must be at least 1",
            ));
        }
        if self.scan_timeout_ms == 0 {
            return Err(InvalidConfig::new(
                "SCAN_TIMEOUT_MINUTES",
                "must be greater than zero",
            ));
        }
        if self.aws_scanner_role_name.trim().is_empty() {
            return Err(InvalidConfig::new(
                "AWS_SCANNER_ROLE_NAME",
                "must not be empty",
            ));
        }
        if self.task_parallelism == 0 || self.task_parallelism > MAX_TASK_PARALLELISM
        {
            return Err(InvalidConfig::new(
                "SCAN_TASK_PARALLELISM",
                format!("must be between 1 and {MAX_TASK_PARALLELISM}"),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(InvalidConfig::new(
                "SCAN_REQUEST_TIMEOUT_SECS",
                "must be greater than zero",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(InvalidConfig::new(
                "event_channel_capacity",
                "must be at least 1",
            ));
        }
        self.retry.validate()
    }
}

/// Admission behaviour when all `max_concurrent_scans` slots are taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// FIFO queue up to `max_queued_scans`, reject beyond it.
    #[default]
    Queue,
    /// Reject as soon as every slot is busy.
    Reject,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub policy: AdmissionPolicy,
    pub max_queued_scans: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            policy: AdmissionPolicy::Queue,
            max_queued_scans: 20,
        }
    }
}

/// Handling of tasks still in flight when a job deadline passes.
///
/// Both policies force non-terminal tasks to `TimedOut` at the deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// Wait up to one request timeout for in-flight work to observe
    /// cancellation, abort the rest, then report the job terminal.
    #[default]
    Drain,
    /// Report the job terminal immediately; in-flight work winds down in the
    /// background and its late results are discarded.
    Detach,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per pagination page, including the first one.
    pub max_attempts_per_page: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Percentage-based jitter to spread out retries.
    pub jitter_ratio: f32,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), InvalidConfig> {
        if self.max_attempts_per_page == 0 {
            return Err(InvalidConfig::new(
                "SCAN_RETRY_MAX_ATTEMPTS",
                "must be at least 1",
            ));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(InvalidConfig::new(
                "SCAN_RETRY_MAX_MS",
                "must not be lower than SCAN_RETRY_BASE_MS",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(InvalidConfig::new(
                "retry.jitter_ratio",
                "must be within 0.0..=1.0",
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_page: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 20_000,
            jitter_ratio: 0.25,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration {field}: {reason}")]
pub struct InvalidConfig {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidConfig {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub const fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60_000)
}

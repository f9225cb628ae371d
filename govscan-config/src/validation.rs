use govscan_core::{AdmissionPolicy, EngineConfig, InvalidConfig};
use thiserror::Error;
use tracing::warn;

/// Scan deadlines above this many minutes are accepted but flagged.
pub const LONG_SCAN_TIMEOUT_MINUTES: u64 = 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Engine(#[from] InvalidConfig),
}

impl ConfigGuardRailError {
    pub(crate) fn invalid_value(
        key: &'static str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn log(&self) {
        for warning in &self.items {
            match &warning.hint {
                Some(hint) => {
                    warn!(message = %warning.message, hint = %hint, "configuration warning")
                }
                None => warn!(message = %warning.message, "configuration warning"),
            }
        }
    }
}

/// Fails on settings the engine cannot run with and collects warnings for
/// settings that are legal but likely unintended.
pub fn apply_guard_rails(
    config: &EngineConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    config.validate()?;

    let mut warnings = ConfigWarnings::default();

    let timeout_minutes = config.scan_timeout_ms / 60_000;
    if timeout_minutes > LONG_SCAN_TIMEOUT_MINUTES {
        warnings.push_with_hint(
            format!("SCAN_TIMEOUT_MINUTES is {timeout_minutes}; scans may hold slots for over a day"),
            "Lower SCAN_TIMEOUT_MINUTES unless the accounts really take that long",
        );
    }

    if config.request_timeout_ms >= config.scan_timeout_ms {
        warnings.push_with_hint(
            "SCAN_REQUEST_TIMEOUT_SECS is not shorter than the scan deadline",
            "A single slow page call can consume the whole scan; shorten the request timeout",
        );
    }

    if config.admission.policy == AdmissionPolicy::Queue
        && config.admission.max_queued_scans == 0
    {
        warnings.push_with_hint(
            "SCAN_MAX_QUEUED is 0; the admission queue is disabled",
            "Submissions beyond MAX_CONCURRENT_SCANS will be rejected. Set SCAN_ADMISSION_POLICY=reject to make this explicit",
        );
    }

    if config.task_parallelism > config.max_concurrent_scans.saturating_mul(32) {
        warnings.push(format!(
            "SCAN_TASK_PARALLELISM={} allows {} concurrent page calls across all scans",
            config.task_parallelism,
            config.task_parallelism.saturating_mul(config.max_concurrent_scans)
        ));
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use govscan_core::AdmissionConfig;

    use super::*;

    #[test]
    fn defaults_pass_without_warnings() {
        let warnings =
            apply_guard_rails(&EngineConfig::default()).expect("defaults are valid");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn engine_violations_surface_as_errors() {
        let config = EngineConfig {
            max_concurrent_scans: 0,
            ..EngineConfig::default()
        };
        let err = apply_guard_rails(&config).expect_err("zero cap");
        assert!(matches!(
            err,
            ConfigGuardRailError::Engine(InvalidConfig {
                field: "MAX_CONCURRENT_SCANS",
                ..
            })
        ));
    }

    #[test]
    fn disabled_queue_is_flagged() {
        let config = EngineConfig {
            admission: AdmissionConfig {
                policy: AdmissionPolicy::Queue,
                max_queued_scans: 0,
            },
            ..EngineConfig::default()
        };
        let warnings = apply_guard_rails(&config).expect("legal config");
        assert_eq!(warnings.len(), 1);
        assert!(warnings.items[0].message.contains("SCAN_MAX_QUEUED"));
        assert!(warnings.items[0].hint.is_some());
    }

    #[test]
    fn long_timeouts_are_flagged() {
        let config = EngineConfig::default().with_scan_timeout_minutes(3 * 24 * 60);
        let warnings = apply_guard_rails(&config).expect("legal config");
        assert!(
            warnings
                .items
                .iter()
                .any(|warning| warning.message.contains("SCAN_TIMEOUT_MINUTES"))
        );
    }

    #[test]
    fn request_timeout_longer_than_deadline_is_flagged() {
        let config = EngineConfig {
            request_timeout_ms: 120_000,
            ..EngineConfig::default().with_scan_timeout_minutes(1)
        };
        let warnings = apply_guard_rails(&config).expect("legal config");
        assert_eq!(warnings.len(), 1);
        assert!(warnings.items[0].message.contains("SCAN_REQUEST_TIMEOUT_SECS"));
    }
}

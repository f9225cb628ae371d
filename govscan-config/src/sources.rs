use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use govscan_core::{AdmissionPolicy, DeadlinePolicy};
use serde::{Deserialize, Serialize};

use crate::validation::ConfigGuardRailError;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_scans: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_timeout_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_scanner_role_name: Option<String>,
    #[serde(default)]
    pub admission: FileAdmissionConfig,
    #[serde(default)]
    pub tasks: FileTaskConfig,
    #[serde(default)]
    pub retry: FileRetryConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_finished_jobs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileAdmissionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<AdmissionPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queued_scans: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileTaskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_policy: Option<DeadlinePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileRetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_ratio: Option<f32>,
}

/// Environment-derived configuration values.
///
/// Unset variables stay `None`; set but malformed ones fail the read.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub max_concurrent_scans: Option<usize>,
    pub scan_timeout_minutes: Option<u64>,
    pub aws_region: Option<String>,
    pub aws_scanner_role_name: Option<String>,
    pub max_queued_scans: Option<usize>,
    pub admission_policy: Option<AdmissionPolicy>,
    pub task_parallelism: Option<usize>,
    pub deadline_policy: Option<DeadlinePolicy>,
    pub request_timeout_secs: Option<u64>,
    pub retry_max_attempts: Option<u16>,
    pub retry_base_ms: Option<u64>,
    pub retry_max_ms: Option<u64>,
    pub retain_finished_jobs: Option<usize>,
}

impl EnvConfig {
    /// Reads every known key through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigGuardRailError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        Ok(Self {
            config_path: vars.string("GOVSCAN_CONFIG_PATH").map(PathBuf::from),
            max_concurrent_scans: vars.parse("MAX_CONCURRENT_SCANS")?,
            scan_timeout_minutes: vars.parse("SCAN_TIMEOUT_MINUTES")?,
            aws_region: vars.string("AWS_REGION"),
            aws_scanner_role_name: vars.raw("AWS_SCANNER_ROLE_NAME"),
            max_queued_scans: vars.parse("SCAN_MAX_QUEUED")?,
            admission_policy: vars.policy("SCAN_ADMISSION_POLICY", parse_admission)?,
            task_parallelism: vars.parse("SCAN_TASK_PARALLELISM")?,
            deadline_policy: vars.policy("SCAN_DEADLINE_POLICY", parse_deadline)?,
            request_timeout_secs: vars.parse("SCAN_REQUEST_TIMEOUT_SECS")?,
            retry_max_attempts: vars.parse("SCAN_RETRY_MAX_ATTEMPTS")?,
            retry_base_ms: vars.parse("SCAN_RETRY_BASE_MS")?,
            retry_max_ms: vars.parse("SCAN_RETRY_MAX_MS")?,
            retain_finished_jobs: vars.parse("SCAN_RETAIN_FINISHED_JOBS")?,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value as set, whitespace included.
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Trimmed value; blank counts as unset.
    fn string(&self, key: &str) -> Option<String> {
        self.raw(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigGuardRailError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.string(key)
            .map(|value| {
                value.parse().map_err(|err: T::Err| {
                    ConfigGuardRailError::invalid_value(key, &value, err.to_string())
                })
            })
            .transpose()
    }

    fn policy<T>(
        &self,
        key: &'static str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ConfigGuardRailError> {
        self.string(key)
            .map(|value| {
                parse(&value.to_ascii_lowercase()).ok_or_else(|| {
                    ConfigGuardRailError::invalid_value(key, &value, "unrecognised policy")
                })
            })
            .transpose()
    }
}

fn parse_admission(raw: &str) -> Option<AdmissionPolicy> {
    match raw {
        "queue" => Some(AdmissionPolicy::Queue),
        "reject" => Some(AdmissionPolicy::Reject),
        _ => None,
    }
}

fn parse_deadline(raw: &str) -> Option<DeadlinePolicy> {
    match raw {
        "drain" => Some(DeadlinePolicy::Drain),
        "detach" => Some(DeadlinePolicy::Detach),
        _ => None,
    }
}

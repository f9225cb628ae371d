use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use govscan_core::config::minutes_to_ms;
use govscan_core::{AdmissionConfig, EngineConfig, RetryConfig};
use govscan_model::Region;
use thiserror::Error;
use tracing::debug;

use crate::sources::{EnvConfig, FileConfig};
use crate::validation::{self, ConfigGuardRailError, ConfigWarnings};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["govscan.toml", "config/govscan.toml"];
const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Debug, Default, Clone)]
struct ConfigLoaderOptions {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Resolves the configuration against the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        self.load_with_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration with `lookup` standing in for the process
    /// environment. Variables from the env file only fill keys `lookup`
    /// leaves unset.
    pub fn load_with_lookup<F>(&self, lookup: F) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (env_file_vars, env_file) = self.read_env_file()?;
        let env = EnvConfig::from_lookup(|key| {
            lookup(key).or_else(|| env_file_vars.get(key).cloned())
        })?;

        let (file_config, config_path) = self.load_file_config(&env)?;
        let config = compose_config(file_config.unwrap_or_default(), env)?;
        let warnings = validation::apply_guard_rails(&config)?;

        Ok(ConfigLoad {
            config,
            warnings,
            metadata: ConfigMetadata {
                config_path,
                env_file,
            },
        })
    }

    fn read_env_file(
        &self,
    ) -> Result<(HashMap<String, String>, Option<PathBuf>), ConfigLoadError> {
        let path = self
            .options
            .env_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));

        let entries = match dotenvy::from_path_iter(&path) {
            Ok(entries) => entries,
            Err(dotenvy::Error::Io(_)) => return Ok((HashMap::new(), None)),
            Err(err) => return Err(err.into()),
        };
        let vars = entries.collect::<Result<HashMap<_, _>, _>>()?;
        debug!(path = %path.display(), count = vars.len(), "loaded env file");
        Ok((vars, Some(path)))
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = if let Some(path) = &self.options.config_path {
            (path.clone(), true)
        } else if let Some(path) = &env.config_path {
            (path.clone(), true)
        } else {
            match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => (path, false),
                None => return Ok((None, None)),
            }
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Environment beats file beats default, field by field.
fn compose_config(
    file: FileConfig,
    env: EnvConfig,
) -> Result<EngineConfig, ConfigGuardRailError> {
    let defaults = EngineConfig::default();
    let FileConfig {
        max_concurrent_scans: file_max_concurrent_scans,
        scan_timeout_minutes: file_scan_timeout_minutes,
        aws_region: file_aws_region,
        aws_scanner_role_name: file_role_name,
        admission: file_admission,
        tasks: file_tasks,
        retry: file_retry,
        retain_finished_jobs: file_retain_finished_jobs,
        event_channel_capacity: file_event_channel_capacity,
    } = file;

    let aws_region = match env.aws_region.or(file_aws_region) {
        Some(raw) => raw.parse::<Region>().map_err(|err| {
            ConfigGuardRailError::invalid_value("AWS_REGION", &raw, err.to_string())
        })?,
        None => defaults.aws_region,
    };

    let scan_timeout_ms = env
        .scan_timeout_minutes
        .or(file_scan_timeout_minutes)
        .map(minutes_to_ms)
        .unwrap_or(defaults.scan_timeout_ms);

    let request_timeout_ms = env
        .request_timeout_secs
        .or(file_tasks.request_timeout_secs)
        .map(|secs| secs.saturating_mul(1_000))
        .unwrap_or(defaults.request_timeout_ms);

    let admission = AdmissionConfig {
        policy: env
            .admission_policy
            .or(file_admission.policy)
            .unwrap_or(defaults.admission.policy),
        max_queued_scans: env
            .max_queued_scans
            .or(file_admission.max_queued_scans)
            .unwrap_or(defaults.admission.max_queued_scans),
    };

    let retry = RetryConfig {
        max_attempts_per_page: env
            .retry_max_attempts
            .or(file_retry.max_attempts)
            .unwrap_or(defaults.retry.max_attempts_per_page),
        backoff_base_ms: env
            .retry_base_ms
            .or(file_retry.base_ms)
            .unwrap_or(defaults.retry.backoff_base_ms),
        backoff_max_ms: env
            .retry_max_ms
            .or(file_retry.max_ms)
            .unwrap_or(defaults.retry.backoff_max_ms),
        jitter_ratio: file_retry.jitter_ratio.unwrap_or(defaults.retry.jitter_ratio),
    };

    Ok(EngineConfig {
        max_concurrent_scans: env
            .max_concurrent_scans
            .or(file_max_concurrent_scans)
            .unwrap_or(defaults.max_concurrent_scans),
        scan_timeout_ms,
        aws_region,
        aws_scanner_role_name: env
            .aws_scanner_role_name
            .or(file_role_name)
            .unwrap_or(defaults.aws_scanner_role_name),
        admission,
        task_parallelism: env
            .task_parallelism
            .or(file_tasks.parallelism)
            .unwrap_or(defaults.task_parallelism),
        deadline_policy: env
            .deadline_policy
            .or(file_tasks.deadline_policy)
            .unwrap_or(defaults.deadline_policy),
        request_timeout_ms,
        retry,
        retain_finished_jobs: env
            .retain_finished_jobs
            .or(file_retain_finished_jobs)
            .unwrap_or(defaults.retain_finished_jobs),
        event_channel_capacity: file_event_channel_capacity
            .unwrap_or(defaults.event_channel_capacity),
    })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

/// Where the resolved values came from.
#[derive(Debug, Default, Clone)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: EngineConfig,
    pub warnings: ConfigWarnings,
    pub metadata: ConfigMetadata,
}

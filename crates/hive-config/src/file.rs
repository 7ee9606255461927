//! YAML configuration file.
//!
//! ```yaml
//! manager:
//!   thread_count: 4
//!   thread_prefix: mail
//! worker:
//!   sleep_delay: 500ms
//!   queues: [mail, reports]
//!   max_priority: 10
//! ```
//!
//! Every field is optional. Environment parameters are layered on top with
//! [`HiveConfig::apply_parameters`].

use std::path::{Path, PathBuf};

use hive_core::{HiveError, Result};
use serde::{Deserialize, Serialize};

use crate::params::{self, Parameters};
use crate::settings::WorkerSettings;

/// Worker thread management settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Number of worker threads to start
    pub thread_count: usize,
    /// Prefix for worker thread names
    pub thread_prefix: Option<String>,
    /// Skip worker startup entirely
    pub skip: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            thread_count: 1,
            thread_prefix: None,
            skip: false,
        }
    }
}

/// Worker settings as written in the file; unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    /// Seconds (`2.5`) or a humantime duration (`500ms`)
    pub sleep_delay: Option<String>,
    pub read_ahead: Option<u32>,
    pub queues: Option<Vec<String>>,
    pub exit_on_complete: Option<bool>,
}

/// Top-level hive configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub manager: ManagerConfig,
    pub worker: WorkerSection,
}

impl HiveConfig {
    /// Default config location: `~/.hive/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".hive").join("config.yaml"))
    }

    /// Load and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HiveError::config_not_found_with_source(path, e)
            } else {
                HiveError::io("reading config", path, e)
            }
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            HiveError::ConfigInvalid { message, .. } => HiveError::ConfigInvalid {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Load the default config file if it exists, else built-in defaults.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| HiveError::ConfigInvalid {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Layer environment (or host supplied) parameters over the file values.
    pub fn apply_parameters(&mut self, params: &Parameters) -> Result<()> {
        if let Some(count) = params.parse::<usize>(params::THREAD_COUNT_KEY)? {
            self.manager.thread_count = count;
        }
        if let Some(prefix) = params.get(params::THREAD_PREFIX_KEY) {
            self.manager.thread_prefix = Some(prefix);
        }
        if let Some(skip) = params.flag(params::SKIP_KEY)? {
            self.manager.skip = skip;
        }
        if let Some(queues) = params.queues() {
            self.worker.queues = Some(queues);
        }
        if let Some(min) = params.parse::<i32>(params::MIN_PRIORITY_KEY)? {
            self.worker.min_priority = Some(min);
        }
        if let Some(max) = params.parse::<i32>(params::MAX_PRIORITY_KEY)? {
            self.worker.max_priority = Some(max);
        }
        if let Some(delay) = params.get(params::SLEEP_DELAY_KEY) {
            self.worker.sleep_delay = Some(delay);
        }
        if let Some(read_ahead) = params.parse::<u32>(params::READ_AHEAD_KEY)? {
            self.worker.read_ahead = Some(read_ahead);
        }
        if let Some(exit) = params.flag(params::EXIT_ON_COMPLETE_KEY)? {
            self.worker.exit_on_complete = Some(exit);
        }
        Ok(())
    }

    /// Resolve the worker section into settings, validating the result.
    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        let mut settings = WorkerSettings::default();
        let section = &self.worker;
        settings.min_priority = section.min_priority.or(settings.min_priority);
        settings.max_priority = section.max_priority.or(settings.max_priority);
        if let Some(raw) = &section.sleep_delay {
            settings.sleep_delay = params::parse_sleep_delay(raw)
                .map_err(|msg| HiveError::config_validation("sleep_delay", msg))?;
        }
        if let Some(read_ahead) = section.read_ahead {
            settings.read_ahead = read_ahead;
        }
        if let Some(queues) = &section.queues {
            settings.queues = queues.clone();
        }
        settings.exit_on_complete = section.exit_on_complete.or(settings.exit_on_complete);
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = HiveConfig::from_yaml("{}").unwrap();
        assert_eq!(config, HiveConfig::default());
        assert_eq!(config.manager.thread_count, 1);
        assert_eq!(config.worker_settings().unwrap(), WorkerSettings::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "manager:\n  thread_count: 4\n  thread_prefix: mail\nworker:\n  sleep_delay: 500ms\n  queues: [mail, reports]\n  max_priority: 10"
        )
        .unwrap();

        let config = HiveConfig::load(file.path()).unwrap();
        assert_eq!(config.manager.thread_count, 4);
        assert_eq!(config.manager.thread_prefix.as_deref(), Some("mail"));

        let settings = config.worker_settings().unwrap();
        assert_eq!(settings.sleep_delay, Duration::from_millis(500));
        assert_eq!(settings.queues, vec!["mail", "reports"]);
        assert_eq!(settings.max_priority, Some(10));
        assert_eq!(settings.read_ahead, 5);
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = HiveConfig::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, HiveError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_invalid_yaml_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "manager: [not, a, map]").unwrap();
        let err = HiveConfig::load(file.path()).unwrap_err();
        match err {
            HiveError::ConfigInvalid { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parameters_override_file_values() {
        let mut config = HiveConfig::from_yaml("manager:\n  thread_count: 2\nworker:\n  read_ahead: 3").unwrap();
        let params = Parameters::default()
            .with(params::THREAD_COUNT_KEY, "6")
            .with(params::QUEUES_KEY, "critical,high")
            .with(params::SLEEP_DELAY_KEY, "0.25")
            .with(params::EXIT_ON_COMPLETE_KEY, "true")
            .with(params::SKIP_KEY, "false");
        config.apply_parameters(&params).unwrap();

        assert_eq!(config.manager.thread_count, 6);
        let settings = config.worker_settings().unwrap();
        assert_eq!(settings.queues, vec!["critical", "high"]);
        assert_eq!(settings.sleep_delay, Duration::from_millis(250));
        assert_eq!(settings.read_ahead, 3);
        assert_eq!(settings.exit_on_complete, Some(true));
    }

    #[test]
    fn test_bad_parameter_is_reported() {
        let mut config = HiveConfig::default();
        let params = Parameters::default().with(params::MIN_PRIORITY_KEY, "high");
        let err = config.apply_parameters(&params).unwrap_err();
        assert!(err.to_string().contains(params::MIN_PRIORITY_KEY));
    }

    #[test]
    fn test_bad_sleep_delay_is_reported_on_resolve() {
        let config = HiveConfig::from_yaml("worker:\n  sleep_delay: whenever").unwrap();
        let err = config.worker_settings().unwrap_err();
        assert!(err.is_config_error());
    }
}

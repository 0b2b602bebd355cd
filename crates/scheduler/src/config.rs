use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Scheduler configuration, typically parsed from TOML.
///
/// ```toml
/// [scheduler]
/// worker_threads = 4
/// thread_name_prefix = "tickwork-worker"
/// retired_history = 4096
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads for asynchronous tasks. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Name prefix for worker threads (suffixed with the worker index).
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// How many retired task ids keep answering `Completed` / `Cancelled`.
    #[serde(default = "default_retired_history")]
    pub retired_history: usize,
}

fn default_worker_threads() -> usize { 0 }
fn default_thread_name_prefix() -> String { "tickwork-worker".into() }
fn default_retired_history() -> usize { 4096 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name_prefix: default_thread_name_prefix(),
            retired_history: default_retired_history(),
        }
    }
}

/// On-disk layout: settings live under a `[scheduler]` table.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scheduler: SchedulerConfig,
}

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        let mut config = file.scheduler;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(SchedulerError::Config(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        if self.worker_threads > 1024 {
            return Err(SchedulerError::Config(format!(
                "worker_threads = {} exceeds the limit of 1024",
                self.worker_threads
            )));
        }
        Ok(())
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `TICKWORK_WORKER_THREADS` -> `worker_threads`
    /// - `TICKWORK_THREAD_NAME_PREFIX` -> `thread_name_prefix`
    /// - `TICKWORK_RETIRED_HISTORY` -> `retired_history`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TICKWORK_WORKER_THREADS") {
            if let Ok(n) = v.parse::<usize>() {
                self.worker_threads = n;
            }
        }
        if let Ok(v) = std::env::var("TICKWORK_THREAD_NAME_PREFIX") {
            self.thread_name_prefix = v;
        }
        if let Ok(v) = std::env::var("TICKWORK_RETIRED_HISTORY") {
            if let Ok(n) = v.parse::<usize>() {
                self.retired_history = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.thread_name_prefix, "tickwork-worker");
        assert_eq!(config.retired_history, 4096);
    }

    #[test]
    fn resolved_worker_threads() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_worker_threads() > 0);

        config.worker_threads = 8;
        assert_eq!(config.resolved_worker_threads(), 8);
    }

    #[test]
    fn parse_scheduler_table() {
        let toml = r#"
[scheduler]
worker_threads = 3
thread_name_prefix = "plugin-async"
"#;
        let cfg = SchedulerConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.worker_threads, 3);
        assert_eq!(cfg.thread_name_prefix, "plugin-async");
        assert_eq!(cfg.retired_history, 4096); // default
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = SchedulerConfig::from_toml("").unwrap();
        assert_eq!(cfg.thread_name_prefix, "tickwork-worker");
    }

    #[test]
    fn reject_blank_thread_prefix() {
        let toml = r#"
[scheduler]
thread_name_prefix = "  "
"#;
        let err = SchedulerConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("thread_name_prefix"));
    }

    #[test]
    fn reject_malformed_toml() {
        let err = SchedulerConfig::from_toml("[scheduler\nworker_threads = ").unwrap_err();
        assert!(matches!(err, SchedulerError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SchedulerConfig::from_file("/nonexistent/tickwork.toml").unwrap_err();
        assert!(matches!(err, SchedulerError::ConfigIo(_)));
    }
}

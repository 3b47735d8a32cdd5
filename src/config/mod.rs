//! Configuration types for the pipeline tools.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while validating configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid retry attempts {0}: at least one attempt is required")]
    InvalidMaxAttempts(u32),

    #[error("Invalid report extension '{0}'")]
    InvalidExtension(String),
}

/// Bounded retry behaviour for moves that hit a permission error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per move, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts, in seconds
    #[serde(default = "default_interval_secs")]
    pub backoff_secs: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_interval_secs() -> u64 {
    3600
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_interval_secs(),
        }
    }
}

impl RetryConfig {
    /// Build the runtime policy, rejecting a zero attempt budget.
    pub fn policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.backoff_secs))
    }
}

/// Validated retry policy used by the move algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(max_attempts));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    /// Policy with no pause between attempts.
    pub fn immediate(max_attempts: u32) -> Result<Self, ConfigError> {
        Self::new(max_attempts, Duration::ZERO)
    }

    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[inline]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Duration::from_secs(default_interval_secs()),
        }
    }
}

/// Configuration for the directory synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between checks for the control markers
    #[serde(default = "default_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    /// File whose first line names a directory to ship early
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,

    /// File whose presence ends polling and starts the bulk sweep
    #[serde(default = "default_termination_marker")]
    pub termination_marker: String,
}

fn default_completion_marker() -> String {
    "completed.txt".to_string()
}

fn default_termination_marker() -> String {
    "sentinel.txt".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_interval_secs(),
            retry: RetryConfig::default(),
            completion_marker: default_completion_marker(),
            termination_marker: default_termination_marker(),
        }
    }
}

impl SyncConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Configuration for the tile report aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Extension (without the dot) of the per-tile info reports
    #[serde(default = "default_report_extension")]
    pub report_extension: String,
}

fn default_report_extension() -> String {
    "txt".to_string()
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            report_extension: default_report_extension(),
        }
    }
}

impl SummaryConfig {
    /// Normalised extension, with any leading dot removed.
    pub fn extension(&self) -> Result<&str, ConfigError> {
        let ext = self.report_extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(ConfigError::InvalidExtension(self.report_extension.clone()));
        }
        Ok(ext)
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub summary: SummaryConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_sync_config() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(3600));
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.completion_marker, "completed.txt");
        assert_eq!(config.termination_marker, "sentinel.txt");
    }

    #[test]
    fn test_retry_policy_rejects_zero_attempts() {
        assert!(RetryPolicy::immediate(0).is_err());

        let policy = RetryConfig {
            max_attempts: 3,
            backoff_secs: 0,
        }
        .policy()
        .unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), Duration::ZERO);
    }

    #[test]
    fn test_summary_extension() {
        let mut config = SummaryConfig::default();
        assert_eq!(config.extension().unwrap(), "txt");

        config.report_extension = ".log".to_string();
        assert_eq!(config.extension().unwrap(), "log");

        config.report_extension = ".".to_string();
        assert!(config.extension().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "sync:\n  poll_interval_secs: 5\n  retry:\n    backoff_secs: 1\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.sync.retry.backoff_secs, 1);
        assert_eq!(config.sync.retry.max_attempts, 10);
        assert_eq!(config.summary.report_extension, "txt");
    }

    #[test]
    fn test_yaml_round_trip_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.sync.termination_marker = "done.flag".to_string();
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.sync.termination_marker, "done.flag");
    }
}

//! Provider Configuration
//!
//! Settings shared by the information base and its controllers. Every field
//! has a default, so an empty JSON object is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::observability::{log_event, Event, Severity};

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Sequence id stamped on every MdibVersionGroup (generated when absent)
    #[serde(default)]
    pub sequence_id: Option<String>,

    /// Optional instance id of the sequence
    #[serde(default)]
    pub instance_id: Option<u64>,

    /// Capacity of each controller's invocation queue (default: 10)
    #[serde(default = "default_worker_queue_capacity")]
    pub worker_queue_capacity: usize,

    /// Worker thread name prefix (default: "sco-worker")
    #[serde(default = "default_worker_thread_prefix")]
    pub worker_thread_prefix: String,

    /// Buffer size of the report broadcast channel (default: 256)
    #[serde(default = "default_report_channel_capacity")]
    pub report_channel_capacity: usize,

    /// Minimum severity written by the logger (default: INFO)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,
}

fn default_worker_queue_capacity() -> usize {
    10
}

fn default_worker_thread_prefix() -> String {
    "sco-worker".to_string()
}

fn default_report_channel_capacity() -> usize {
    256
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            sequence_id: None,
            instance_id: None,
            worker_queue_capacity: default_worker_queue_capacity(),
            worker_thread_prefix: default_worker_thread_prefix(),
            report_channel_capacity: default_report_channel_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl ProviderConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        log_event(
            Event::ConfigLoaded,
            &[("path", path.display().to_string().as_str())],
        );
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "worker_queue_capacity must be at least 1".into(),
            ));
        }
        if self.report_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "report_channel_capacity must be at least 1".into(),
            ));
        }
        if let Some(seq) = &self.sequence_id {
            if seq.trim().is_empty() {
                return Err(ConfigError::Invalid("sequence_id must not be blank".into()));
            }
        }
        Ok(())
    }

    /// Configured sequence id, or a fresh `urn:uuid:` one.
    pub fn resolve_sequence_id(&self) -> String {
        self.sequence_id
            .clone()
            .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()))
    }

    /// Same config with a different queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.worker_queue_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.worker_queue_capacity, 10);
        assert_eq!(config.worker_thread_prefix, "sco-worker");
        assert_eq!(config.log_level, Severity::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = ProviderConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ProviderConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config = ProviderConfig::from_json_str(
            r#"{"sequence_id": "urn:uuid:fixed", "worker_queue_capacity": 3, "log_level": "WARN"}"#,
        )
        .unwrap();
        assert_eq!(config.sequence_id.as_deref(), Some("urn:uuid:fixed"));
        assert_eq!(config.worker_queue_capacity, 3);
        assert_eq!(config.log_level, Severity::Warn);
        assert_eq!(config.resolve_sequence_id(), "urn:uuid:fixed");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ProviderConfig::from_json_str(r#"{"worker_queue_capacity": 0}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = ProviderConfig::from_json_str("{not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_generated_sequence_id() {
        let config = ProviderConfig::default();
        let a = config.resolve_sequence_id();
        let b = config.resolve_sequence_id();
        assert!(a.starts_with("urn:uuid:"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"instance_id": 4}}"#).unwrap();

        let config = ProviderConfig::load(file.path()).unwrap();
        assert_eq!(config.instance_id, Some(4));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ProviderConfig::load("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

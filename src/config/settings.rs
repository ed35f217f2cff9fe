//! Coordinator configuration
//!
//! One JSON file (`txncore.json`) configures a coordinator process. Every
//! field has a default, so a missing file is equivalent to an empty object:
//! `load_or_default` is the normal entry point. Values are validated on
//! load; a config that parses but fails validation is rejected the same
//! way as one that does not parse.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::{AuditLog, FileAuditLog};
use crate::transaction::TxnOptions;

use super::errors::{ConfigError, ConfigResult};

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnConfig {
    /// Directory holding the transaction log and audit stream.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Failure-scope identity written into the log's service data.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Base wait between completion retry passes, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Retry passes before outcome delivery is abandoned. Zero retries
    /// until cancelled.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// How long shutdown waits for in-flight work to drain, in
    /// milliseconds.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Write an audit record for every protocol exchange.
    #[serde(default)]
    pub audit_enabled: bool,

    /// Share one branch between adapters reporting the same resource
    /// manager.
    #[serde(default = "default_true")]
    pub join_same_rm: bool,

    /// Allow the single-vote and sole-agent one-phase shortcuts.
    #[serde(default = "default_true")]
    pub one_phase_optimisation: bool,
}

fn default_data_dir() -> String {
    "./txncore-data".to_string()
}

fn default_server_name() -> String {
    "txncore".to_string()
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_retry_limit() -> u32 {
    20
}

fn default_drain_timeout_ms() -> u64 {
    30000
}

fn default_true() -> bool {
    true
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server_name: default_server_name(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_limit: default_retry_limit(),
            drain_timeout_ms: default_drain_timeout_ms(),
            audit_enabled: false,
            join_same_rm: default_true(),
            one_phase_optimisation: default_true(),
        }
    }
}

impl TxnConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::read_failed(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: TxnConfig = serde_json::from_str(&content).map_err(|e| {
            ConfigError::parse_failed(format!("invalid config JSON in {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or fall back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate field values.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.is_empty() {
            return Err(ConfigError::invalid_value("data_dir must not be empty"));
        }
        if self.server_name.is_empty() {
            return Err(ConfigError::invalid_value("server_name must not be empty"));
        }
        if self.retry_interval_ms == 0 {
            return Err(ConfigError::invalid_value("retry_interval_ms must be > 0"));
        }
        if self.drain_timeout_ms == 0 {
            return Err(ConfigError::invalid_value("drain_timeout_ms must be > 0"));
        }
        Ok(())
    }

    /// Get the data directory as a path.
    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    /// Where the audit stream is written when auditing is enabled.
    pub fn audit_path(&self) -> PathBuf {
        self.data_path().join("audit.log")
    }

    /// Open the audit stream this configuration selects, `None` when
    /// auditing is disabled. The data directory must already exist.
    pub fn open_audit_log(&self) -> io::Result<Option<Arc<dyn AuditLog>>> {
        if !self.audit_enabled {
            return Ok(None);
        }
        let log = FileAuditLog::open(self.audit_path())?;
        Ok(Some(Arc::new(log)))
    }

    /// The per-transaction options this configuration selects.
    pub fn txn_options(&self) -> TxnOptions {
        TxnOptions {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            retry_limit: self.retry_limit,
            join_same_rm: self.join_same_rm,
            one_phase_optimisation: self.one_phase_optimisation,
        }
    }

    /// The shutdown drain timeout as a duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::ConfigErrorCode;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TxnConfig::default();
        assert_eq!(config.data_dir, "./txncore-data");
        assert_eq!(config.server_name, "txncore");
        assert_eq!(config.retry_interval_ms, 1000);
        assert_eq!(config.retry_limit, 20);
        assert_eq!(config.drain_timeout_ms, 30000);
        assert!(!config.audit_enabled);
        assert!(config.join_same_rm);
        assert!(config.one_phase_optimisation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("txncore.json");
        let config = TxnConfig::load_or_default(&path).unwrap();
        assert_eq!(config, TxnConfig::default());
    }

    #[test]
    fn test_load_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("txncore.json");
        let err = TxnConfig::load(&path).unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::ReadFailed);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("txncore.json");
        fs::write(&path, r#"{"server_name": "tx1", "retry_limit": 0}"#).unwrap();

        let config = TxnConfig::load_or_default(&path).unwrap();
        assert_eq!(config.server_name, "tx1");
        assert_eq!(config.retry_limit, 0);
        assert_eq!(config.data_dir, "./txncore-data");
        assert_eq!(config.retry_interval_ms, 1000);
    }

    #[test]
    fn test_bad_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("txncore.json");
        fs::write(&path, "{not json").unwrap();

        let err = TxnConfig::load(&path).unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::ParseFailed);
    }

    #[test]
    fn test_zero_retry_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("txncore.json");
        fs::write(&path, r#"{"retry_interval_ms": 0}"#).unwrap();

        let err = TxnConfig::load(&path).unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::InvalidValue);
    }

    #[test]
    fn test_empty_data_dir_is_rejected() {
        let config = TxnConfig {
            data_dir: String::new(),
            ..TxnConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::InvalidValue);
    }

    #[test]
    fn test_txn_options_mapping() {
        let config = TxnConfig {
            retry_interval_ms: 250,
            retry_limit: 3,
            join_same_rm: false,
            one_phase_optimisation: false,
            ..TxnConfig::default()
        };
        let options = config.txn_options();
        assert_eq!(options.retry_interval, Duration::from_millis(250));
        assert_eq!(options.retry_limit, 3);
        assert!(!options.join_same_rm);
        assert!(!options.one_phase_optimisation);
    }

    #[test]
    fn test_audit_path_is_under_data_dir() {
        let config = TxnConfig::default();
        assert_eq!(
            config.audit_path(),
            Path::new("./txncore-data").join("audit.log")
        );
    }

    #[test]
    fn test_open_audit_log_disabled() {
        let config = TxnConfig::default();
        assert!(config.open_audit_log().unwrap().is_none());
    }

    #[test]
    fn test_open_audit_log_creates_stream() {
        let dir = TempDir::new().unwrap();
        let config = TxnConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            audit_enabled: true,
            ..TxnConfig::default()
        };

        let log = config.open_audit_log().unwrap();
        assert!(log.is_some());
        assert!(config.audit_path().exists());
    }
}

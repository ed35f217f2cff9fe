//! Process configuration
//!
//! A single JSON file configures the coordinator. Missing file means
//! all defaults; present-but-invalid means startup fails.

mod errors;
mod settings;

pub use errors::{ConfigError, ConfigErrorCode, ConfigResult};
pub use settings::TxnConfig;

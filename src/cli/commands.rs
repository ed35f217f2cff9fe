//! CLI command implementations
//!
//! Both commands are offline tools over the data directory. `init`
//! creates the directory layout and an empty transaction log; `inspect`
//! replays the log read-only and reports what a restart would find.
//! Neither touches a running coordinator's state.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::config::TxnConfig;
use crate::transaction::{
    decode_heuristic, decode_state, ParticipantRecord, SECTION_GLOBAL_ID, SECTION_HEURISTIC,
    SECTION_PARTICIPANT, SECTION_STATE,
};
use crate::txlog::{replay, LogWriter, RecoveredUnit};
use crate::xa::Xid;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments, dispatches to the appropriate command, and on failure
/// writes the error envelope to stdout before returning the error.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    let result = run_command(cli.command);
    if let Err(e) = &result {
        let _ = write_error(e.code_str(), e.message());
    }
    result
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Inspect { config } => inspect(&config),
    }
}

fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("txlog").join("tranlog.log")
}

fn is_initialized(data_dir: &Path) -> bool {
    log_path(data_dir).exists()
}

/// Initialize a coordinator data directory
///
/// Creates the directory layout and an empty transaction log. Does not
/// start anything and writes no transaction records.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = TxnConfig::load_or_default(config_path)?;
    let data_dir = config.data_path();

    if is_initialized(data_dir) {
        return Err(CliError::already_initialized());
    }

    fs::create_dir_all(data_dir).map_err(|e| {
        CliError::init_failed(format!(
            "failed to create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    // Opening creates <data_dir>/txlog/tranlog.log.
    LogWriter::open(data_dir).map_err(|e| CliError::init_failed(e.to_string()))?;

    write_response(json!({
        "initialized": true,
        "data_dir": config.data_dir,
        "server_name": config.server_name,
    }))?;

    Ok(())
}

/// Report the transaction log's service data and live units
///
/// Read-only: replays the log the way restart recovery would and prints
/// what it finds, without reopening participants or driving outcomes.
pub fn inspect(config_path: &Path) -> CliResult<()> {
    let config = TxnConfig::load_or_default(config_path)?;
    let report = inspect_report(&config)?;
    write_response(report)?;
    Ok(())
}

fn inspect_report(config: &TxnConfig) -> CliResult<Value> {
    let data_dir = config.data_path();
    if !is_initialized(data_dir) {
        return Err(CliError::not_initialized());
    }

    let recovered =
        replay(&log_path(data_dir)).map_err(|e| CliError::inspect_failed(e.to_string()))?;

    let service = match recovered.service_data() {
        Some(service) => json!({
            "epoch": service.epoch,
            "server_name": service.server_name,
        }),
        None => Value::Null,
    };

    let units: Vec<Value> = recovered
        .units()
        .map(|(unit_id, unit)| unit_report(unit_id, unit))
        .collect();

    Ok(json!({
        "data_dir": config.data_dir,
        "inspected_at": chrono::Utc::now().to_rfc3339(),
        "last_sequence": recovered.last_sequence(),
        "live_units": recovered.live_unit_count(),
        "service": service,
        "torn": recovered.is_torn(),
        "units": units,
    }))
}

fn unit_report(unit_id: u64, unit: &RecoveredUnit) -> Value {
    let state = unit
        .last_item(SECTION_STATE)
        .and_then(decode_state)
        .map(|state| state.as_str())
        .unwrap_or("UNKNOWN");

    let xid = unit
        .last_item(SECTION_GLOBAL_ID)
        .and_then(|item| Xid::from_bytes(item).ok())
        .map(|xid| xid.to_string())
        .map(Value::from)
        .unwrap_or(Value::Null);

    let heuristic = unit
        .last_item(SECTION_HEURISTIC)
        .and_then(decode_heuristic)
        .map(|verdict| verdict.to_string())
        .map(Value::from)
        .unwrap_or(Value::Null);

    let participants: Vec<Value> = unit
        .section(SECTION_PARTICIPANT)
        .unwrap_or(&[])
        .iter()
        .map(|item| match ParticipantRecord::decode(item) {
            Some(record) => json!({
                "recovery_id": record.recovery_id,
                "priority": record.priority,
                "status": record.status.to_string(),
                "branch": record.xid.to_string(),
            }),
            None => json!({ "unreadable": true }),
        })
        .collect();

    json!({
        "unit_id": unit_id,
        "state": state,
        "xid": xid,
        "heuristic": heuristic,
        "participants": participants,
    })
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use crate::participant::ResourceStatus;
    use crate::transaction::{encode_state, TransactionState};
    use tempfile::TempDir;

    fn create_config(temp_dir: &TempDir) -> PathBuf {
        let config_path = temp_dir.path().join("txncore.json");
        let data_dir = temp_dir.path().join("data");

        let config = json!({
            "data_dir": data_dir.to_string_lossy()
        });

        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    #[test]
    fn test_init_creates_log() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);
        let data_dir = temp_dir.path().join("data");

        init(&config_path).unwrap();

        assert!(data_dir.join("txlog").join("tranlog.log").exists());
    }

    #[test]
    fn test_init_refuses_reinit() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);

        init(&config_path).unwrap();

        let result = init(&config_path);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), CliErrorCode::AlreadyInitialized);
    }

    #[test]
    fn test_inspect_requires_init() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);

        let config = TxnConfig::load_or_default(&config_path).unwrap();
        let result = inspect_report(&config);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), CliErrorCode::NotInitialized);
    }

    #[test]
    fn test_inspect_empty_log() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);
        init(&config_path).unwrap();

        let config = TxnConfig::load_or_default(&config_path).unwrap();
        let report = inspect_report(&config).unwrap();

        assert_eq!(report["live_units"], 0);
        assert_eq!(report["last_sequence"], 0);
        assert!(report["service"].is_null());
        assert_eq!(report["torn"], false);
        assert_eq!(report["units"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_inspect_reports_live_unit() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);
        init(&config_path).unwrap();

        let config = TxnConfig::load_or_default(&config_path).unwrap();
        let xid = Xid::generate();
        {
            let mut writer = LogWriter::open(config.data_path()).unwrap();
            writer.append_service_data(2, "server1").unwrap();
            let unit_id = writer.allocate_unit_id();
            writer
                .append_unit_write(unit_id, SECTION_GLOBAL_ID, xid.to_bytes())
                .unwrap();
            let record = ParticipantRecord {
                recovery_id: 7,
                priority: 0,
                status: ResourceStatus::Prepared,
                xid: xid.new_branch(1),
            };
            writer
                .append_unit_write(unit_id, SECTION_PARTICIPANT, record.encode())
                .unwrap();
            writer
                .append_unit_write(
                    unit_id,
                    SECTION_STATE,
                    encode_state(TransactionState::Prepared),
                )
                .unwrap();
            writer.force().unwrap();
        }

        let report = inspect_report(&config).unwrap();
        assert_eq!(report["live_units"], 1);
        assert_eq!(report["service"]["epoch"], 2);
        assert_eq!(report["service"]["server_name"], "server1");

        let units = report["units"].as_array().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0]["state"], "PREPARED");
        assert_eq!(units[0]["xid"], xid.to_string());
        assert!(units[0]["heuristic"].is_null());

        let participants = units[0]["participants"].as_array().unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0]["recovery_id"], 7);
        assert_eq!(participants[0]["status"], "PREPARED");
    }
}

//! Transaction log writer
//!
//! Appends are buffered; a force makes everything appended so far durable
//! (TRANLOG.md §5). Callers force at protocol commit points rather than on
//! every append, so a crash between forces leaves a torn tail that the
//! next open truncates away.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use std::io::Write;

use crate::observability::{log_event_with_fields, Event, Logger};

use super::errors::{TxLogError, TxLogResult};
use super::reader::replay;
use super::record::{LogRecord, RecordPayload};

/// Appending side of the transaction log.
///
/// Also the allocator for recoverable unit ids: ids resume above the
/// highest id ever seen in the log, so removed units are never reused
/// within one log generation.
pub struct LogWriter {
    log_path: PathBuf,
    file: File,
    next_sequence: u64,
    next_unit_id: u64,
}

impl LogWriter {
    /// Opens or creates the log at `<data_dir>/txlog/tranlog.log`.
    ///
    /// Replays any existing content to find the next sequence and unit id.
    /// A torn tail left by a crash is truncated here, before the first
    /// append, so new records land on the valid prefix.
    pub fn open(data_dir: &Path) -> TxLogResult<Self> {
        let log_dir = data_dir.join("txlog");
        let log_path = log_dir.join("tranlog.log");

        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).map_err(|e| {
                TxLogError::append_failed(
                    format!("failed to create log directory: {}", log_dir.display()),
                    e,
                )
            })?;
        }

        let recovered = replay(&log_path)?;
        if recovered.is_torn() {
            Self::truncate_torn_tail(&log_path, recovered.valid_len())?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("failed to open log file: {}", log_path.display()),
                    e,
                )
            })?;

        Ok(Self {
            log_path,
            file,
            next_sequence: recovered.last_sequence() + 1,
            next_unit_id: recovered.highest_unit_id() + 1,
        })
    }

    fn truncate_torn_tail(log_path: &Path, valid_len: u64) -> TxLogResult<()> {
        let file_len = fs::metadata(log_path)
            .map_err(|e| TxLogError::append_failed("failed to read log metadata", e))?
            .len();

        let file = OpenOptions::new()
            .write(true)
            .open(log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("failed to open log for tail truncation: {}", log_path.display()),
                    e,
                )
            })?;
        file.set_len(valid_len)
            .map_err(|e| TxLogError::append_failed("failed to truncate torn tail", e))?;
        file.sync_all()
            .map_err(|e| TxLogError::force_failed("fsync failed after tail truncation", e))?;

        Logger::warn(
            "LOG_TAIL_TRUNCATED",
            &[
                ("discarded_bytes", &(file_len - valid_len).to_string()),
                ("valid_bytes", &valid_len.to_string()),
            ],
        );
        Ok(())
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the next sequence number that will be assigned.
    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence
    }

    /// Returns the last assigned sequence number, or 0 if nothing written.
    pub fn last_sequence_number(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Hands out a fresh recoverable unit id.
    pub fn allocate_unit_id(&mut self) -> u64 {
        let id = self.next_unit_id;
        self.next_unit_id += 1;
        id
    }

    /// Appends one record, assigning it the next sequence number.
    ///
    /// The record is not durable until [`force`](Self::force) returns.
    pub fn append(&mut self, payload: RecordPayload) -> TxLogResult<u64> {
        let sequence = self.next_sequence;
        let record = LogRecord::new(sequence, payload);
        let serialized = record.serialize();

        self.file.write_all(&serialized).map_err(|e| {
            TxLogError::append_failed(
                format!("failed to write log record at sequence {}", sequence),
                e,
            )
        })?;

        self.next_sequence += 1;
        Logger::trace(
            Event::LogAppend.as_str(),
            &[
                ("kind", record.payload.kind().as_str()),
                ("sequence", &sequence.to_string()),
            ],
        );
        Ok(sequence)
    }

    /// Appends a UnitWrite record.
    pub fn append_unit_write(
        &mut self,
        unit_id: u64,
        section_id: u16,
        item: Vec<u8>,
    ) -> TxLogResult<u64> {
        self.append(RecordPayload::UnitWrite {
            unit_id,
            section_id,
            item,
        })
    }

    /// Appends a UnitRemove record.
    pub fn append_unit_remove(&mut self, unit_id: u64) -> TxLogResult<u64> {
        self.append(RecordPayload::UnitRemove { unit_id })
    }

    /// Appends a ServiceData record.
    pub fn append_service_data(
        &mut self,
        epoch: u32,
        server_name: impl Into<String>,
    ) -> TxLogResult<u64> {
        self.append(RecordPayload::ServiceData(super::record::ServiceData::new(
            epoch,
            server_name,
        )))
    }

    /// Forces everything appended so far to disk.
    ///
    /// This is the durability point: a record is recoverable only once a
    /// force has covered it. Failure is fatal for the log instance.
    pub fn force(&mut self) -> TxLogResult<()> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_all())
            .map_err(|e| TxLogError::force_failed("transaction log force failed", e))?;

        Logger::trace(
            Event::LogForce.as_str(),
            &[("last_sequence", &self.last_sequence_number().to_string())],
        );
        Ok(())
    }

    /// Truncates the log to empty at a keypoint (TRANLOG.md §7).
    ///
    /// Used at clean shutdown when no live units remain. The old file is
    /// removed, a new empty file is created and fsynced along with its
    /// directory, and sequence and unit-id allocation restart at 1.
    pub fn truncate(&mut self) -> TxLogResult<()> {
        let log_dir = self.log_path.parent().unwrap_or(Path::new("."));

        if self.log_path.exists() {
            fs::remove_file(&self.log_path).map_err(|e| {
                TxLogError::append_failed(
                    format!("failed to remove log during keypoint: {}", self.log_path.display()),
                    e,
                )
            })?;
        }

        let new_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("failed to recreate log: {}", self.log_path.display()),
                    e,
                )
            })?;
        new_file
            .sync_all()
            .map_err(|e| TxLogError::force_failed("fsync failed for recreated log", e))?;

        // Make the directory entry durable as well
        let dir_handle = OpenOptions::new().read(true).open(log_dir).map_err(|e| {
            TxLogError::append_failed(
                format!("failed to open log directory for fsync: {}", log_dir.display()),
                e,
            )
        })?;
        dir_handle
            .sync_all()
            .map_err(|e| TxLogError::force_failed("fsync failed for log directory", e))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("failed to reopen log after keypoint: {}", self.log_path.display()),
                    e,
                )
            })?;

        self.file = file;
        self.next_sequence = 1;
        self.next_unit_id = 1;

        log_event_with_fields(Event::LogTruncate, &[("log", &self.log_path.display().to_string())]);
        Ok(())
    }
}

//! Transaction log reading and replay
//!
//! Two read disciplines (TRANLOG.md §6):
//! - [`LogReader`] reads records one at a time and fails on the first
//!   invalid one.
//! - [`replay`] drives a [`LogReader`] tolerantly, which is what recovery
//!   needs: an invalid record ends the log, everything before it is the
//!   recovered state, and the torn remainder is reported back so the
//!   writer can truncate it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::observability::{log_event_with_fields, Event, Logger};

use super::errors::{TxLogError, TxLogResult};
use super::record::{LogRecord, RecordPayload, ServiceData, MIN_RECORD_SIZE};

/// Strict sequential reader over a transaction log file.
pub struct LogReader {
    log_path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    last_sequence: u64,
}

impl LogReader {
    /// Opens a transaction log file for reading.
    pub fn open(log_path: &Path) -> TxLogResult<Self> {
        let file = File::open(log_path).map_err(|e| {
            TxLogError::corruption(format!(
                "failed to open transaction log {}: {}",
                log_path.display(),
                e
            ))
        })?;
        let metadata = file.metadata().map_err(|e| {
            TxLogError::corruption(format!("failed to read transaction log metadata: {}", e))
        })?;

        Ok(Self {
            log_path: log_path.to_path_buf(),
            file_size: metadata.len(),
            reader: BufReader::new(file),
            current_offset: 0,
            last_sequence: 0,
        })
    }

    /// Opens the log at its conventional location, `<data_dir>/txlog/tranlog.log`.
    pub fn open_from_data_dir(data_dir: &Path) -> TxLogResult<Self> {
        Self::open(&data_dir.join("txlog").join("tranlog.log"))
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the byte offset of the next unread record.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Returns the last successfully read sequence number, 0 before any read.
    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at a clean end of file. Any malformed record,
    /// including a torn tail, is an error here; tolerant handling lives
    /// in [`replay`].
    pub fn read_next(&mut self) -> TxLogResult<Option<LogRecord>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < MIN_RECORD_SIZE as u64 {
            return Err(TxLogError::corruption_at_offset(
                self.current_offset,
                format!(
                    "torn record: {} bytes remaining, minimum record size is {}",
                    remaining, MIN_RECORD_SIZE
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            TxLogError::corruption_at_offset(
                self.current_offset,
                format!("failed to read record length: {}", e),
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < MIN_RECORD_SIZE as u64 {
            return Err(TxLogError::corruption_at_offset(
                self.current_offset,
                format!("invalid record length: {}", record_length),
            ));
        }
        if record_length > remaining {
            return Err(TxLogError::corruption_at_offset(
                self.current_offset,
                format!(
                    "record length {} exceeds remaining file size {}",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            TxLogError::corruption_at_offset(
                self.current_offset,
                format!("failed to read record body: {}", e),
            )
        })?;

        let (record, consumed) = LogRecord::deserialize(&record_buf)
            .map_err(|e| TxLogError::corruption_at_offset(self.current_offset, e.to_string()))?;

        if record.sequence_number != self.last_sequence + 1 {
            return Err(TxLogError::corruption_at_sequence(
                record.sequence_number,
                format!(
                    "non-sequential sequence number: expected {}, got {}",
                    self.last_sequence + 1,
                    record.sequence_number
                ),
            ));
        }

        self.current_offset += consumed as u64;
        self.last_sequence = record.sequence_number;
        Ok(Some(record))
    }

    /// Reads every record in the log, failing on the first invalid one.
    pub fn read_all(&mut self) -> TxLogResult<Vec<LogRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// One live recoverable unit rebuilt from the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveredUnit {
    sections: BTreeMap<u16, Vec<Vec<u8>>>,
}

impl RecoveredUnit {
    /// All items written to a section, in log order.
    pub fn section(&self, section_id: u16) -> Option<&[Vec<u8>]> {
        self.sections.get(&section_id).map(|items| items.as_slice())
    }

    /// The most recent item in a section. Sections that are rewritten on
    /// every force (coordinator state) are read this way.
    pub fn last_item(&self, section_id: u16) -> Option<&[u8]> {
        self.sections
            .get(&section_id)
            .and_then(|items| items.last())
            .map(|item| item.as_slice())
    }

    /// Section identifiers present in this unit.
    pub fn section_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.sections.keys().copied()
    }

    fn push(&mut self, section_id: u16, item: Vec<u8>) {
        self.sections.entry(section_id).or_default().push(item);
    }
}

/// The outcome of replaying a transaction log.
#[derive(Debug, Default)]
pub struct RecoveredLog {
    /// Live recoverable units keyed by unit id.
    units: BTreeMap<u64, RecoveredUnit>,
    /// Latest service data seen, if any.
    service: Option<ServiceData>,
    /// Highest sequence number of a valid record.
    last_sequence: u64,
    /// Highest unit id ever mentioned, including removed units.
    highest_unit_id: u64,
    /// Byte length of the valid prefix of the file.
    valid_len: u64,
    /// Whether replay stopped at a torn tail.
    torn: bool,
}

impl RecoveredLog {
    /// The state of a log that does not exist yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Live units in unit-id order.
    pub fn units(&self) -> impl Iterator<Item = (u64, &RecoveredUnit)> {
        self.units.iter().map(|(id, unit)| (*id, unit))
    }

    /// A single live unit.
    pub fn unit(&self, unit_id: u64) -> Option<&RecoveredUnit> {
        self.units.get(&unit_id)
    }

    /// Number of live units.
    pub fn live_unit_count(&self) -> usize {
        self.units.len()
    }

    /// Whether any live units remain.
    pub fn has_live_units(&self) -> bool {
        !self.units.is_empty()
    }

    /// Latest service data, if the log recorded any.
    pub fn service_data(&self) -> Option<&ServiceData> {
        self.service.as_ref()
    }

    /// Highest sequence number of a valid record, 0 for an empty log.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Highest unit id ever mentioned, including removed units. Unit id
    /// allocation resumes above this.
    pub fn highest_unit_id(&self) -> u64 {
        self.highest_unit_id
    }

    /// Byte length of the valid prefix of the file.
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Whether replay stopped at a torn tail.
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    fn apply(&mut self, record: LogRecord) {
        self.last_sequence = record.sequence_number;
        match record.payload {
            RecordPayload::UnitWrite {
                unit_id,
                section_id,
                item,
            } => {
                self.highest_unit_id = self.highest_unit_id.max(unit_id);
                self.units
                    .entry(unit_id)
                    .or_default()
                    .push(section_id, item);
            }
            RecordPayload::UnitRemove { unit_id } => {
                self.highest_unit_id = self.highest_unit_id.max(unit_id);
                self.units.remove(&unit_id);
            }
            RecordPayload::ServiceData(data) => {
                self.service = Some(data);
            }
        }
    }
}

/// Replays a transaction log per TRANLOG.md §6.
///
/// A missing file is an empty log. An invalid record ends replay with a
/// warning: the valid prefix is the recovered state and the result is
/// marked torn. A log that exists but cannot be read at all is fatal.
pub fn replay(log_path: &Path) -> TxLogResult<RecoveredLog> {
    if !log_path.exists() {
        return Ok(RecoveredLog::empty());
    }

    let mut reader = LogReader::open(log_path).map_err(|e| {
        log_event_with_fields(Event::LogCorruption, &[("detail", &e.to_string())]);
        e
    })?;
    let mut recovered = RecoveredLog::empty();

    loop {
        match reader.read_next() {
            Ok(Some(record)) => recovered.apply(record),
            Ok(None) => break,
            Err(e) => {
                recovered.torn = true;
                Logger::warn(
                    "LOG_TAIL_TORN",
                    &[
                        ("detail", &e.to_string()),
                        ("valid_bytes", &reader.current_offset().to_string()),
                    ],
                );
                break;
            }
        }
    }

    recovered.valid_len = reader.current_offset();
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::super::writer::LogWriter;
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn log_path(dir: &TempDir) -> PathBuf {
        dir.path().join("txlog").join("tranlog.log")
    }

    // === STRICT READER TESTS ===

    #[test]
    fn test_read_empty_log() {
        let temp_dir = TempDir::new().unwrap();
        {
            let _writer = LogWriter::open(temp_dir.path()).unwrap();
        }

        let mut reader = LogReader::open(&log_path(&temp_dir)).unwrap();
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_read_back_in_order() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(temp_dir.path()).unwrap();
            writer.append_unit_write(1, 0, b"state".to_vec()).unwrap();
            writer
                .append_unit_write(1, 1, b"participant".to_vec())
                .unwrap();
            writer.append_unit_remove(1).unwrap();
            writer.force().unwrap();
        }

        let mut reader = LogReader::open(&log_path(&temp_dir)).unwrap();
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sequence_number, 1);
        assert_eq!(records[2].sequence_number, 3);
        assert!(matches!(
            records[2].payload,
            RecordPayload::UnitRemove { unit_id: 1 }
        ));
    }

    #[test]
    fn test_strict_reader_rejects_corruption() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(temp_dir.path()).unwrap();
            writer.append_unit_write(1, 0, b"state".to_vec()).unwrap();
            writer.force().unwrap();
        }

        let path = log_path(&temp_dir);
        {
            use std::io::{Seek, SeekFrom};
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(8)).unwrap();
            file.write_all(&[0xFF]).unwrap();
        }

        let mut reader = LogReader::open(&path).unwrap();
        let err = reader.read_next().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code().code(), "TXN_LOG_CORRUPTION");
    }

    // === REPLAY TESTS ===

    #[test]
    fn test_replay_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let recovered = replay(&log_path(&temp_dir)).unwrap();
        assert!(!recovered.has_live_units());
        assert!(!recovered.is_torn());
        assert_eq!(recovered.last_sequence(), 0);
    }

    #[test]
    fn test_replay_builds_unit_map() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(temp_dir.path()).unwrap();
            writer.append_unit_write(1, 0, b"s1".to_vec()).unwrap();
            writer.append_unit_write(2, 0, b"s2".to_vec()).unwrap();
            writer.append_unit_write(1, 3, b"p1".to_vec()).unwrap();
            writer.append_unit_write(1, 3, b"p2".to_vec()).unwrap();
            writer.force().unwrap();
        }

        let recovered = replay(&log_path(&temp_dir)).unwrap();
        assert_eq!(recovered.live_unit_count(), 2);

        let unit = recovered.unit(1).unwrap();
        assert_eq!(unit.section(3).unwrap().len(), 2);
        assert_eq!(unit.section(3).unwrap()[0], b"p1");
        assert_eq!(unit.last_item(0), Some(&b"s1"[..]));
        assert!(unit.section(9).is_none());
    }

    #[test]
    fn test_replay_unit_remove_deletes() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(temp_dir.path()).unwrap();
            writer.append_unit_write(1, 0, b"a".to_vec()).unwrap();
            writer.append_unit_write(2, 0, b"b".to_vec()).unwrap();
            writer.append_unit_remove(1).unwrap();
            writer.force().unwrap();
        }

        let recovered = replay(&log_path(&temp_dir)).unwrap();
        assert_eq!(recovered.live_unit_count(), 1);
        assert!(recovered.unit(1).is_none());
        assert!(recovered.unit(2).is_some());
        // Removed ids still count towards allocation
        assert_eq!(recovered.highest_unit_id(), 2);
    }

    #[test]
    fn test_replay_latest_service_data_wins() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(temp_dir.path()).unwrap();
            writer.append_service_data(1, "server1").unwrap();
            writer.append_service_data(2, "server1").unwrap();
            writer.force().unwrap();
        }

        let recovered = replay(&log_path(&temp_dir)).unwrap();
        let service = recovered.service_data().unwrap();
        assert_eq!(service.epoch, 2);
        assert_eq!(service.server_name, "server1");
        assert!(!recovered.has_live_units());
    }

    #[test]
    fn test_replay_tolerates_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let valid_len;
        {
            let mut writer = LogWriter::open(temp_dir.path()).unwrap();
            writer.append_unit_write(1, 0, b"keep me".to_vec()).unwrap();
            writer.force().unwrap();
        }

        let path = log_path(&temp_dir);
        {
            valid_len = std::fs::metadata(&path).unwrap().len();
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            // A partial record, as a crash mid-write would leave
            file.write_all(&[0x30, 0x00, 0x00, 0x00, 0x01, 0xAB]).unwrap();
        }

        let recovered = replay(&path).unwrap();
        assert!(recovered.is_torn());
        assert_eq!(recovered.valid_len(), valid_len);
        assert_eq!(recovered.live_unit_count(), 1);
        assert_eq!(recovered.unit(1).unwrap().last_item(0), Some(&b"keep me"[..]));
    }

    #[test]
    fn test_replay_sequence_gap_ends_log() {
        let temp_dir = TempDir::new().unwrap();
        let path = log_path(&temp_dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&path)
                .unwrap();
            file.write_all(&LogRecord::unit_write(1, 1, 0, b"ok".to_vec()).serialize())
                .unwrap();
            // Sequence 3 after 1: invalid, ends the log
            file.write_all(&LogRecord::unit_write(3, 2, 0, b"skipped".to_vec()).serialize())
                .unwrap();
        }

        let recovered = replay(&path).unwrap();
        assert!(recovered.is_torn());
        assert_eq!(recovered.last_sequence(), 1);
        assert_eq!(recovered.live_unit_count(), 1);
    }
}

//! Transaction log record types
//!
//! Per TRANLOG.md §3, each record is framed as:
//! - Record Length (u32 LE), total including this field and the checksum
//! - Record Kind (u8)
//! - Sequence Number (u64 LE)
//! - Payload (variable, kind-specific per TRANLOG.md §4)
//! - Checksum (u32 LE), CRC32 over everything before it

use std::io;

use crc32fast::Hasher;

/// Minimum size of a framed record: length + kind + sequence + checksum.
pub(crate) const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 4;

fn record_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Record kinds per TRANLOG.md §4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// One data item added to a section of a recoverable unit
    UnitWrite = 0,
    /// A recoverable unit removed from the log
    UnitRemove = 1,
    /// Server-wide metadata (epoch, owning server)
    ServiceData = 2,
}

impl RecordKind {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordKind::UnitWrite),
            1 => Some(RecordKind::UnitRemove),
            2 => Some(RecordKind::ServiceData),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Display string, used in traces and `inspect` output
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::UnitWrite => "UNIT_WRITE",
            RecordKind::UnitRemove => "UNIT_REMOVE",
            RecordKind::ServiceData => "SERVICE_DATA",
        }
    }
}

/// Server-wide log metadata, latest record wins on replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    /// Recovery epoch, incremented per restart that found live units
    pub epoch: u32,
    /// Name of the server instance that owns the log
    pub server_name: String,
}

impl ServiceData {
    pub fn new(epoch: u32, server_name: impl Into<String>) -> Self {
        Self {
            epoch,
            server_name: server_name.into(),
        }
    }
}

/// Kind-specific record payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPayload {
    /// Append `item` to `section_id` of unit `unit_id`
    UnitWrite {
        unit_id: u64,
        section_id: u16,
        item: Vec<u8>,
    },
    /// Remove unit `unit_id` and all its sections
    UnitRemove { unit_id: u64 },
    /// Replace the log's service data
    ServiceData(ServiceData),
}

impl RecordPayload {
    /// The framing kind byte for this payload
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::UnitWrite { .. } => RecordKind::UnitWrite,
            RecordPayload::UnitRemove { .. } => RecordKind::UnitRemove,
            RecordPayload::ServiceData(_) => RecordKind::ServiceData,
        }
    }

    /// Encode the payload per TRANLOG.md §4
    fn encode(&self) -> Vec<u8> {
        match self {
            RecordPayload::UnitWrite {
                unit_id,
                section_id,
                item,
            } => {
                let mut buf = Vec::with_capacity(8 + 2 + 4 + item.len());
                buf.extend_from_slice(&unit_id.to_le_bytes());
                buf.extend_from_slice(&section_id.to_le_bytes());
                buf.extend_from_slice(&(item.len() as u32).to_le_bytes());
                buf.extend_from_slice(item);
                buf
            }
            RecordPayload::UnitRemove { unit_id } => unit_id.to_le_bytes().to_vec(),
            RecordPayload::ServiceData(data) => {
                let name = data.server_name.as_bytes();
                let mut buf = Vec::with_capacity(4 + 4 + name.len());
                buf.extend_from_slice(&data.epoch.to_le_bytes());
                buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
                buf.extend_from_slice(name);
                buf
            }
        }
    }

    /// Decode a payload of the given kind
    fn decode(kind: RecordKind, data: &[u8]) -> io::Result<Self> {
        match kind {
            RecordKind::UnitWrite => {
                if data.len() < 8 + 2 + 4 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "UnitWrite payload too short",
                    ));
                }
                let unit_id = u64::from_le_bytes([
                    data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
                ]);
                let section_id = u16::from_le_bytes([data[8], data[9]]);
                let item_len =
                    u32::from_le_bytes([data[10], data[11], data[12], data[13]]) as usize;
                if data.len() != 14 + item_len {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "UnitWrite item length {} does not match payload size {}",
                            item_len,
                            data.len()
                        ),
                    ));
                }
                Ok(RecordPayload::UnitWrite {
                    unit_id,
                    section_id,
                    item: data[14..].to_vec(),
                })
            }
            RecordKind::UnitRemove => {
                if data.len() != 8 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "UnitRemove payload must be exactly 8 bytes",
                    ));
                }
                let unit_id = u64::from_le_bytes([
                    data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
                ]);
                Ok(RecordPayload::UnitRemove { unit_id })
            }
            RecordKind::ServiceData => {
                if data.len() < 4 + 4 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "ServiceData payload too short",
                    ));
                }
                let epoch = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let name_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
                if data.len() != 8 + name_len {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "ServiceData name length {} does not match payload size {}",
                            name_len,
                            data.len()
                        ),
                    ));
                }
                let server_name = String::from_utf8(data[8..].to_vec()).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("ServiceData name is not UTF-8: {}", e),
                    )
                })?;
                Ok(RecordPayload::ServiceData(ServiceData {
                    epoch,
                    server_name,
                }))
            }
        }
    }
}

/// One framed transaction log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Position in the log (starts at 1, strictly increments)
    pub sequence_number: u64,
    /// Kind-specific content
    pub payload: RecordPayload,
}

impl LogRecord {
    pub fn new(sequence_number: u64, payload: RecordPayload) -> Self {
        Self {
            sequence_number,
            payload,
        }
    }

    /// Create a UnitWrite record
    pub fn unit_write(sequence_number: u64, unit_id: u64, section_id: u16, item: Vec<u8>) -> Self {
        Self::new(
            sequence_number,
            RecordPayload::UnitWrite {
                unit_id,
                section_id,
                item,
            },
        )
    }

    /// Create a UnitRemove record
    pub fn unit_remove(sequence_number: u64, unit_id: u64) -> Self {
        Self::new(sequence_number, RecordPayload::UnitRemove { unit_id })
    }

    /// Create a ServiceData record
    pub fn service_data(sequence_number: u64, epoch: u32, server_name: impl Into<String>) -> Self {
        Self::new(
            sequence_number,
            RecordPayload::ServiceData(ServiceData::new(epoch, server_name)),
        )
    }

    /// Serialize the complete framed record per TRANLOG.md §3
    pub fn serialize(&self) -> Vec<u8> {
        let payload = self.payload.encode();
        let record_length = (MIN_RECORD_SIZE + payload.len()) as u32;

        // Checksum covers everything before the checksum field
        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.push(self.payload.kind().as_u8());
        record.extend_from_slice(&self.sequence_number.to_le_bytes());
        record.extend_from_slice(&payload);

        let checksum = record_crc(&record);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Deserialize a framed record, verifying the checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum = record_crc(&data[0..checksum_offset]);
        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let kind = RecordKind::from_u8(data[4]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid record kind: {}", data[4]),
            )
        })?;
        let sequence_number = u64::from_le_bytes([
            data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
        ]);

        let payload = RecordPayload::decode(kind, &data[13..checksum_offset])?;

        Ok((
            LogRecord {
                sequence_number,
                payload,
            },
            record_length,
        ))
    }
}

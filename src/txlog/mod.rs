//! Transaction recovery log
//!
//! Durable record of in-flight two-phase work, one file per data
//! directory. Format and replay rules are defined in TRANLOG.md. The
//! writer appends recoverable-unit sections and forces at protocol
//! commit points; replay rebuilds the live units for resync.

mod errors;
mod reader;
mod record;
mod writer;

pub use errors::{Severity, TxLogError, TxLogErrorCode, TxLogResult};
pub use reader::{replay, LogReader, RecoveredLog, RecoveredUnit};
pub use record::{LogRecord, RecordKind, RecordPayload, ServiceData};
pub use writer::LogWriter;

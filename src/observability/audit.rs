//! Completion-flow audit trail
//!
//! When auditing is enabled, every commit/rollback/forget flow sent to a
//! participant and every response received back is recorded append-only,
//! giving operators a durable account of who was told what during completion
//! and recovery. Records are synced before the flow continues.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Audit action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// A commit or rollback flow was sent to a participant.
    CompletionSent,

    /// A participant answered a completion flow.
    CompletionResponse,

    /// A forget flow was sent to a participant in a heuristic state.
    ForgetSent,

    /// A participant answered a forget flow.
    ForgetResponse,
}

impl AuditAction {
    /// Returns the action name string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CompletionSent => "COMPLETION_SENT",
            AuditAction::CompletionResponse => "COMPLETION_RESPONSE",
            AuditAction::ForgetSent => "FORGET_SENT",
            AuditAction::ForgetResponse => "FORGET_RESPONSE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of the completion being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditDirection {
    /// Participant was told to commit.
    Commit,

    /// Participant was told to roll back.
    Rollback,
}

impl AuditDirection {
    /// Returns the direction string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditDirection::Commit => "COMMIT",
            AuditDirection::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for AuditDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record.
///
/// Each record carries the transaction identity, the participant branch, the
/// direction of the flow, and for responses the XA return code.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// Unique record ID.
    pub id: Uuid,

    /// Timestamp when the flow occurred.
    pub timestamp: SystemTime,

    /// The audited action.
    pub action: AuditAction,

    /// Global transaction identity (formatted gtrid).
    pub transaction: String,

    /// Participant branch index within the transaction.
    pub branch: Option<u32>,

    /// Participant recovery id, when recoverable.
    pub recovery_id: Option<u64>,

    /// Direction of the completion flow.
    pub direction: Option<AuditDirection>,

    /// Symbolic XA return code (responses only).
    pub xa_code: Option<String>,
}

impl AuditRecord {
    /// Create a new audit record for a transaction.
    pub fn new(action: AuditAction, transaction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: SystemTime::now(),
            action,
            transaction: transaction.into(),
            branch: None,
            recovery_id: None,
            direction: None,
            xa_code: None,
        }
    }

    /// Set the participant branch index.
    pub fn with_branch(mut self, branch: u32) -> Self {
        self.branch = Some(branch);
        self
    }

    /// Set the participant recovery id.
    pub fn with_recovery_id(mut self, id: u64) -> Self {
        self.recovery_id = Some(id);
        self
    }

    /// Set the completion direction.
    pub fn with_direction(mut self, direction: AuditDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Set the symbolic XA return code.
    pub fn with_xa_code(mut self, code: impl Into<String>) -> Self {
        self.xa_code = Some(code.into());
        self
    }

    /// Serialize to a JSON line (for append-only logging).
    pub fn to_json(&self) -> String {
        // Manual JSON keeps the line format deterministic
        let timestamp = DateTime::<Utc>::from(self.timestamp).to_rfc3339();

        let mut json = format!(
            r#"{{"id":"{}","ts":"{}","action":"{}","transaction":"{}""#,
            self.id,
            timestamp,
            self.action,
            escape_json(&self.transaction)
        );

        if let Some(branch) = self.branch {
            json.push_str(&format!(r#","branch":{}"#, branch));
        }
        if let Some(rid) = self.recovery_id {
            json.push_str(&format!(r#","recovery_id":{}"#, rid));
        }
        if let Some(direction) = self.direction {
            json.push_str(&format!(r#","direction":"{}""#, direction));
        }
        if let Some(ref code) = self.xa_code {
            json.push_str(&format!(r#","xa_code":"{}""#, escape_json(code)));
        }

        json.push('}');
        json
    }
}

/// Escape special JSON characters.
fn escape_json(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Audit log trait.
///
/// Appends are synchronous; the record must be visible after the call
/// returns.
pub trait AuditLog: Send + Sync {
    /// Append a record to the audit log.
    fn append(&self, record: &AuditRecord) -> io::Result<()>;

    /// Sync the audit log to durable storage.
    fn sync(&self) -> io::Result<()>;
}

/// File-based audit log implementation.
///
/// Append-only, one JSON record per line, fsync after each write.
pub struct FileAuditLog {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl FileAuditLog {
    /// Open or create an audit log file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Get the audit log path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let json = record.to_json();
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        // Sync to disk for durability
        writer.get_ref().sync_all()
    }

    fn sync(&self) -> io::Result<()> {
        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.get_ref().sync_all()
    }
}

/// In-memory audit log for testing.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    /// Create a new in-memory audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).push(record.clone());
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

//! Audit record destinations.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::AuditRecord;
use crate::error::LogWriteError;

/// Durable, append-only storage for audit records.
///
/// `append` must either persist the record or fail within `timeout`.
pub trait AuditSink: Send + Sync {
    /// Appends one record.
    fn append(&self, record: &AuditRecord, timeout: Duration) -> Result<(), LogWriteError>;
}

/// In-memory sink for testing.
///
/// # Example
///
/// ```
/// use gateway_pipeline::audit::MemoryAuditSink;
///
/// let sink = MemoryAuditSink::new();
/// assert!(sink.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all records, in write order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Clears all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord, timeout: Duration) -> Result<(), LogWriteError> {
        let mut records = self
            .records
            .try_lock_for(timeout)
            .ok_or(LogWriteError::Timeout(timeout))?;
        records.push(record.clone());
        Ok(())
    }
}

/// Appends one JSON document per line to a file.
///
/// Each record is serialized in full and handed to the file in one
/// `write_all`. If that write fails partway, a newline is attempted so the
/// next record starts on its own line; the truncated line stays in the file.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Opens `path` for appending, creating it and its parent directories.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// File the sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn append(&self, record: &AuditRecord, timeout: Duration) -> Result<(), LogWriteError> {
        let started = Instant::now();
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self
            .file
            .try_lock_for(timeout)
            .ok_or(LogWriteError::Timeout(timeout))?;
        write_line(&mut *file, &line)?;

        // A blocking write cannot be interrupted; report it as late instead.
        if started.elapsed() > timeout {
            return Err(LogWriteError::Timeout(timeout));
        }
        Ok(())
    }
}

fn write_line<W: Write>(out: &mut W, line: &[u8]) -> std::io::Result<()> {
    if let Err(err) = out.write_all(line) {
        let _ = out.write_all(b"\n");
        return Err(err);
    }
    out.flush()
}

/// Emits records as structured `tracing` events on the `gateway_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, record: &AuditRecord, _timeout: Duration) -> Result<(), LogWriteError> {
        let request = serde_json::to_string(&record.request)?;
        let response = serde_json::to_string(&record.response)?;
        let debug_json = serde_json::to_string(&record.debug)?;
        let server = serde_json::to_string(&record.server)?;

        tracing::info!(
            target: "gateway_audit",
            request_id = %record.request_id,
            auth_id = %record.auth_id,
            module = %record.module,
            action = %record.action,
            user_id = ?record.user_id,
            code = record.code,
            debug = %debug_json,
            ip = ?record.ip,
            server = %server,
            date = %record.date,
            timestamp = record.timestamp,
            request = %request,
            response = %response,
            "audit record"
        );
        Ok(())
    }
}

//! Audit logging.
//!
//! Every request that reaches the pipeline produces exactly one
//! [`AuditRecord`], written before the response is handed back to the
//! transport:
//! - `AuditRecord`: what gets persisted (input, full envelope, attribution)
//! - `AuditSink`: where it goes (memory, JSON-lines file, `tracing`)
//! - `AuditLogger`: the stage itself, including failure reporting
//!
//! The record always carries the full envelope, `debug` included, even when
//! the transmitted copy has it stripped.

mod logger;
mod record;
mod sink;

pub use logger::{AuditLogger, FailureAlert};
pub use record::AuditRecord;
pub use sink::{AuditSink, JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink};

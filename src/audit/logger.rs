//! The audit logger stage.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::{AuditRecord, AuditSink};
use crate::envelope::ResponseEnvelope;
use crate::error::{panic_message, LogWriteError};
use crate::request::RequestContext;

/// Callback invoked with every failed audit write.
pub type FailureAlert = dyn Fn(&AuditRecord, &LogWriteError) + Send + Sync;

/// Writes exactly one record per request and reports failed writes.
///
/// A failed write never changes the response. It is logged on the
/// `gateway_ops` target, counted, and passed to the optional alert callback.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
    failures: AtomicU64,
    on_failure: Option<Arc<FailureAlert>>,
}

impl AuditLogger {
    /// Creates a logger over `sink` with a per-write budget.
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self {
            sink,
            timeout,
            failures: AtomicU64::new(0),
            on_failure: None,
        }
    }

    /// Registers the alert callback.
    pub fn on_failure<F>(mut self, alert: F) -> Self
    where
        F: Fn(&AuditRecord, &LogWriteError) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(alert));
        self
    }

    /// Captures and writes the record for `ctx` and its final envelope.
    ///
    /// A panicking sink counts as a failed write. A panicking alert is
    /// logged and otherwise ignored. The error is returned for the caller's
    /// information only; it has already been reported.
    pub fn record(
        &self,
        ctx: &RequestContext,
        envelope: &ResponseEnvelope,
    ) -> Result<(), LogWriteError> {
        let record = AuditRecord::capture(ctx, envelope, Utc::now());

        let written = panic::catch_unwind(AssertUnwindSafe(|| {
            self.sink.append(&record, self.timeout)
        }))
        .unwrap_or_else(|payload| Err(LogWriteError::Panicked(panic_message(&*payload))));

        match written {
            Ok(()) => Ok(()),
            Err(err) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::error!(
                    target: "gateway_ops",
                    request_id = %record.request_id,
                    code = record.code,
                    failures,
                    error = %err,
                    "audit write failed"
                );
                if let Some(alert) = &self.on_failure {
                    let alerted = panic::catch_unwind(AssertUnwindSafe(|| alert(&record, &err)));
                    if let Err(payload) = alerted {
                        tracing::error!(
                            target: "gateway_ops",
                            request_id = %record.request_id,
                            panic = %panic_message(&*payload),
                            "audit failure alert panicked"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Number of failed writes since creation.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("timeout", &self.timeout)
            .field("failures", &self.failure_count())
            .field("on_failure", &self.on_failure.is_some())
            .finish_non_exhaustive()
    }
}

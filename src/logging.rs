use std::fmt;

/// Request-scoped logging.
///
/// `RequestLog` is obtained from `RequestContext::log()` and is lifetime-bound
/// to the context. Every event carries the request id and the current route.
#[derive(Debug, Clone, Copy)]
pub struct RequestLog<'a> {
    request_id: &'a str,
    controller: &'a str,
    action: &'a str,
}

impl<'a> RequestLog<'a> {
    /// Creates a logger for one request.
    ///
    /// This is `pub(crate)`; only `RequestContext` creates it.
    pub(crate) fn new(request_id: &'a str, controller: &'a str, action: &'a str) -> Self {
        Self {
            request_id,
            controller,
            action,
        }
    }

    /// Returns the request ID associated with this logger.
    pub fn request_id(&self) -> &str {
        self.request_id
    }

    /// Logs an info-level message.
    ///
    /// Use with `format_args!`:
    /// ```
    /// # use gateway_pipeline::request::RequestContext;
    /// # use gateway_pipeline::web::RawRequest;
    /// # let ctx = RequestContext::new(RawRequest::new("user", "info"), serde_json::Map::new());
    /// ctx.log().info(format_args!("handling {}", ctx.action()));
    /// ```
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(
            request_id = %self.request_id,
            controller = %self.controller,
            action = %self.action,
            "{}",
            args
        );
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(
            request_id = %self.request_id,
            controller = %self.controller,
            action = %self.action,
            "{}",
            args
        );
    }

    /// Logs an error-level message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(
            request_id = %self.request_id,
            controller = %self.controller,
            action = %self.action,
            "{}",
            args
        );
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(
            request_id = %self.request_id,
            controller = %self.controller,
            action = %self.action,
            "{}",
            args
        );
    }
}

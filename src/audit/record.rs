//! Audit record schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::ResponseEnvelope;
use crate::request::RequestContext;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One append-only entry per request, whatever its outcome.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use gateway_pipeline::audit::AuditRecord;
/// use gateway_pipeline::envelope::ResponseEnvelope;
/// use gateway_pipeline::request::RequestContext;
/// use gateway_pipeline::web::RawRequest;
/// use serde_json::json;
///
/// let input = json!({ "auth_id": "svc-1", "data": { "user_id": 9 } });
/// let ctx = RequestContext::new(
///     RawRequest::new("user", "info"),
///     input.as_object().unwrap().clone(),
/// );
/// let envelope = ResponseEnvelope {
///     code: 1,
///     msg: String::new(),
///     time: 0,
///     data: json!({}),
///     debug: None,
/// };
///
/// let record = AuditRecord::capture(&ctx, &envelope, Utc::now());
/// assert_eq!(record.auth_id, "svc-1");
/// assert_eq!(record.module, "user");
/// assert_eq!(record.user_id.as_deref(), Some("9"));
/// assert_eq!(record.code, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Request identifier for correlation.
    pub request_id: String,
    /// Caller credential, empty when absent.
    pub auth_id: String,
    /// Input `module` when not empty, else the routed controller.
    pub module: String,
    /// Input `action` when not empty, else the routed action.
    pub action: String,
    /// `data.user_id`, when present and not empty.
    pub user_id: Option<String>,
    /// Final envelope code.
    pub code: i64,
    /// Final envelope debug payload.
    pub debug: Option<Value>,
    /// Full decoded input.
    pub request: Map<String, Value>,
    /// Full envelope, `debug` included.
    pub response: ResponseEnvelope,
    /// Transport/server metadata.
    pub server: Map<String, Value>,
    /// Caller address.
    pub ip: Option<String>,
    /// Write time, `YYYY-MM-DD HH:MM:SS` UTC.
    pub date: String,
    /// Write time, epoch seconds.
    pub timestamp: i64,
}

impl AuditRecord {
    /// Captures the record for `ctx` and its final envelope at time `at`.
    pub fn capture(ctx: &RequestContext, envelope: &ResponseEnvelope, at: DateTime<Utc>) -> Self {
        let request = ctx.request();

        Self {
            request_id: ctx.request_id().to_string(),
            auth_id: request.auth_id.clone().unwrap_or_default(),
            module: request
                .module
                .clone()
                .unwrap_or_else(|| ctx.controller().to_string()),
            action: request
                .action
                .clone()
                .unwrap_or_else(|| ctx.action().to_string()),
            user_id: request.user_id(),
            code: envelope.code,
            debug: envelope.debug.clone(),
            request: ctx.input().clone(),
            response: envelope.clone(),
            server: ctx.server().clone(),
            ip: ctx.remote_addr().map(str::to_string),
            date: at.format(DATE_FORMAT).to_string(),
            timestamp: at.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::RawRequest;
    use chrono::TimeZone;
    use serde_json::json;

    fn envelope(code: i64, debug: Option<Value>) -> ResponseEnvelope {
        ResponseEnvelope {
            code,
            msg: "m".to_string(),
            time: 1,
            data: json!({}),
            debug,
        }
    }

    #[test]
    fn missing_identity_fields_fall_back() {
        let ctx = RequestContext::new(
            RawRequest::new("order", "list").with_remote_addr("10.1.1.1"),
            Map::new(),
        );
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();

        let record = AuditRecord::capture(&ctx, &envelope(-7, Some(json!("x"))), at);

        assert_eq!(record.auth_id, "");
        assert_eq!(record.module, "order");
        assert_eq!(record.action, "list");
        assert!(record.user_id.is_none());
        assert_eq!(record.debug, Some(json!("x")));
        assert_eq!(record.ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(record.date, "2024-03-05 07:08:09");
        assert_eq!(record.timestamp, at.timestamp());
    }

    #[test]
    fn input_names_win_over_route() {
        let input = json!({ "auth_id": "a", "module": "legacy", "action": "go" });
        let ctx = RequestContext::new(
            RawRequest::new("index", "index"),
            input.as_object().unwrap().clone(),
        );
        let record = AuditRecord::capture(&ctx, &envelope(1, None), Utc::now());
        assert_eq!(record.module, "legacy");
        assert_eq!(record.action, "go");
        assert_eq!(record.request["auth_id"], "a");
    }

    #[test]
    fn empty_input_names_fall_back_to_route() {
        let input = json!({ "auth_id": "svc-1", "module": "", "data": { "user_id": "" } });
        let ctx = RequestContext::new(
            RawRequest::new("user", "info"),
            input.as_object().unwrap().clone(),
        );
        let record = AuditRecord::capture(&ctx, &envelope(1, None), Utc::now());
        assert_eq!(record.module, "user");
        assert_eq!(record.action, "info");
        assert!(record.user_id.is_none());
    }
}

//! Per-request state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::AuthRecord;
use crate::logging::RequestLog;
use crate::validate::scalar_text;
use crate::web::RawRequest;

/// Scene used when nothing else is selected.
pub const DEFAULT_SCENE: &str = "default";
/// Scene forced by legacy dispatch mode.
pub const LEGACY_SCENE: &str = "old";

/// Typed view of the recognized top-level input keys.
///
/// Anything else lands in `extra`, which is only used for audit attribution.
///
/// # Examples
///
/// ```
/// use gateway_pipeline::request::InboundRequest;
/// use serde_json::json;
///
/// let input = json!({ "auth_id": 42, "data": { "user_id": 7 }, "trace": "t" });
/// let request = InboundRequest::from_input(input.as_object().unwrap());
///
/// assert_eq!(request.auth_id.as_deref(), Some("42"));
/// assert_eq!(request.user_id().as_deref(), Some("7"));
/// assert_eq!(request.extra["trace"], "t");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundRequest {
    /// Caller credential identifier.
    pub auth_id: Option<String>,
    /// Legacy controller name.
    pub module: Option<String>,
    /// Legacy action name.
    pub action: Option<String>,
    /// Action payload.
    pub data: Option<Map<String, Value>>,
    /// Unrecognized keys.
    pub extra: Map<String, Value>,
}

impl InboundRequest {
    /// Builds the typed view. Numbers are accepted where text is expected.
    /// An empty `module`, `action` or `data.user_id` counts as absent.
    pub fn from_input(input: &Map<String, Value>) -> Self {
        let mut request = Self::default();
        for (key, value) in input {
            match key.as_str() {
                "auth_id" => request.auth_id = scalar_text(value),
                "module" => request.module = present_text(value),
                "action" => request.action = present_text(value),
                "data" => request.data = value.as_object().cloned(),
                _ => {
                    request.extra.insert(key.clone(), value.clone());
                }
            }
        }
        request
    }

    /// `data.user_id`, when present.
    pub fn user_id(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|data| data.get("user_id"))
            .and_then(present_text)
    }
}

fn present_text(value: &Value) -> Option<String> {
    scalar_text(value).filter(|text| !text.is_empty())
}

/// Everything the pipeline knows about one request.
///
/// Created once after decoding. The input never changes afterwards; only the
/// scene, the legacy route and the authenticated record are filled in as the
/// request moves through the stages.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    raw_body: Vec<u8>,
    input: Map<String, Value>,
    request: InboundRequest,
    controller: String,
    action: String,
    scene: String,
    received_at: DateTime<Utc>,
    remote_addr: Option<String>,
    server: Map<String, Value>,
    auth: Option<AuthRecord>,
}

impl RequestContext {
    /// Creates a context from the transport request and its decoded input.
    pub fn new(raw: RawRequest, input: Map<String, Value>) -> Self {
        let parts = raw.into_parts();
        let request = InboundRequest::from_input(&input);

        Self {
            request_id: parts
                .request_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            raw_body: parts.body,
            input,
            request,
            controller: parts.controller,
            action: parts.action,
            scene: DEFAULT_SCENE.to_string(),
            received_at: parts.received_at,
            remote_addr: parts.remote_addr,
            server: parts.server,
            auth: None,
        }
    }

    /// Request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Raw body bytes as received.
    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// Decoded input mapping.
    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// Typed view of the input.
    pub fn request(&self) -> &InboundRequest {
        &self.request
    }

    /// Controller the request is routed to.
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Action the request is routed to.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Validation scene.
    pub fn scene(&self) -> &str {
        &self.scene
    }

    /// Arrival time.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Caller address.
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Server metadata.
    pub fn server(&self) -> &Map<String, Value> {
        &self.server
    }

    /// The authenticated record, once the auth gate has passed.
    pub fn auth(&self) -> Option<&AuthRecord> {
        self.auth.as_ref()
    }

    /// Logger stamped with this request's id and route.
    pub fn log(&self) -> RequestLog<'_> {
        RequestLog::new(&self.request_id, &self.controller, &self.action)
    }

    pub(crate) fn input_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.input
    }

    pub(crate) fn set_scene(&mut self, scene: &str) {
        self.scene = scene.to_string();
    }

    /// Routes by the input's `module`/`action`, keeping the transport route for
    /// any key that is absent.
    pub(crate) fn route_from_input(&mut self) {
        if let Some(module) = &self.request.module {
            self.controller = module.clone();
        }
        if let Some(action) = &self.request.action {
            self.action = action.clone();
        }
    }

    pub(crate) fn set_auth(&mut self, record: AuthRecord) {
        self.auth = Some(record);
    }
}

//! Transport-neutral request representation.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A request as handed over by the transport, before decoding.
///
/// Framework integrations build one of these from their native request type:
/// the route they resolved, the raw body, the ordinary parameters and some
/// connection metadata.
///
/// # Examples
///
/// ```
/// use gateway_pipeline::web::RawRequest;
///
/// let raw = RawRequest::new("user", "info")
///     .with_query_string("auth_id=svc-1&data[user_id]=42")
///     .with_remote_addr("10.0.0.8");
///
/// assert_eq!(raw.params()["auth_id"], "svc-1");
/// assert_eq!(raw.params()["data"]["user_id"], "42");
/// assert_eq!(raw.remote_addr(), Some("10.0.0.8"));
/// ```
#[derive(Debug, Clone)]
pub struct RawRequest {
    request_id: Option<String>,
    controller: String,
    action: String,
    body: Vec<u8>,
    params: Map<String, Value>,
    remote_addr: Option<String>,
    server: Map<String, Value>,
    received_at: DateTime<Utc>,
}

impl RawRequest {
    /// Creates a request routed to `controller`/`action`, received now.
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            request_id: None,
            controller: controller.into(),
            action: action.into(),
            body: Vec::new(),
            params: Map::new(),
            remote_addr: None,
            server: Map::new(),
            received_at: Utc::now(),
        }
    }

    /// Uses a transport-supplied request id instead of generating one.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the raw body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds every pair of an `application/x-www-form-urlencoded` string.
    pub fn with_query_string(mut self, query: &str) -> Self {
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            self.add_param(&name, &value);
        }
        self
    }

    /// Sets the caller's address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Overrides the arrival time.
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    /// Adds an ordinary parameter.
    ///
    /// Bracketed names nest: `data[user_id]` sets `user_id` inside the `data`
    /// object and `tags[]` appends to the `tags` array.
    pub fn add_param(&mut self, name: &str, value: &str) {
        let (base, path) = split_name(name);
        insert_nested(&mut self.params, base, &path, Value::String(value.to_string()));
    }

    /// Adds a server/transport metadata entry.
    pub fn add_server(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.server.insert(key.into(), value.into());
    }

    /// Transport-supplied request id, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Route-resolved controller name.
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Route-resolved action name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Ordinary parameters.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Caller address.
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Server metadata.
    pub fn server(&self) -> &Map<String, Value> {
        &self.server
    }

    /// Arrival time.
    pub fn arrival(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub(crate) fn into_parts(self) -> RawParts {
        RawParts {
            request_id: self.request_id,
            controller: self.controller,
            action: self.action,
            body: self.body,
            remote_addr: self.remote_addr,
            server: self.server,
            received_at: self.received_at,
        }
    }
}

/// The pieces of a [`RawRequest`] kept after decoding.
pub(crate) struct RawParts {
    pub(crate) request_id: Option<String>,
    pub(crate) controller: String,
    pub(crate) action: String,
    pub(crate) body: Vec<u8>,
    pub(crate) remote_addr: Option<String>,
    pub(crate) server: Map<String, Value>,
    pub(crate) received_at: DateTime<Utc>,
}

fn split_name(name: &str) -> (String, Vec<String>) {
    match name.find('[') {
        Some(open) if open > 0 && name.ends_with(']') => {
            let inner = &name[open + 1..name.len() - 1];
            let path = inner.split("][").map(str::to_string).collect();
            (name[..open].to_string(), path)
        }
        _ => (name.to_string(), Vec::new()),
    }
}

fn insert_nested(map: &mut Map<String, Value>, key: String, path: &[String], value: Value) {
    let Some((next, rest)) = path.split_first() else {
        map.insert(key, value);
        return;
    };

    let slot = map.entry(key).or_insert(Value::Null);
    if next.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(value);
        }
        return;
    }

    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(inner) = slot {
        insert_nested(inner, next.clone(), rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_params_are_strings() {
        let mut raw = RawRequest::new("c", "a");
        raw.add_param("auth_id", "svc-1");
        assert_eq!(raw.params()["auth_id"], json!("svc-1"));
    }

    #[test]
    fn bracketed_params_nest() {
        let mut raw = RawRequest::new("c", "a");
        raw.add_param("data[user_id]", "7");
        raw.add_param("data[profile][name]", "Ann");
        raw.add_param("tags[]", "x");
        raw.add_param("tags[]", "y");

        assert_eq!(
            serde_json::Value::Object(raw.params().clone()),
            json!({
                "data": { "user_id": "7", "profile": { "name": "Ann" } },
                "tags": ["x", "y"]
            })
        );
    }

    #[test]
    fn malformed_brackets_stay_literal() {
        let mut raw = RawRequest::new("c", "a");
        raw.add_param("[x]", "1");
        raw.add_param("a[b", "2");
        assert!(raw.params().contains_key("[x]"));
        assert!(raw.params().contains_key("a[b"));
    }

    #[test]
    fn query_string_is_form_decoded() {
        let raw = RawRequest::new("c", "a").with_query_string("name=a+b&note=%3Cb%3E");
        assert_eq!(raw.params()["name"], "a b");
        assert_eq!(raw.params()["note"], "<b>");
    }

    #[test]
    fn server_metadata_and_request_id() {
        let mut raw = RawRequest::new("c", "a").with_request_id("req-9");
        raw.add_server("method", "POST");
        assert_eq!(raw.request_id(), Some("req-9"));
        assert_eq!(raw.server()["method"], "POST");
    }
}

//! Uniform response envelope.
//!
//! Every request ends in exactly one [`ResponseEnvelope`], whether a handler
//! succeeded or a stage short-circuited. The envelope carries the application
//! `code`; the transport status is derived from it and is almost always 200.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Environment;
use crate::error::{CODE_FAILURE, CODE_SUCCESS};

/// Key inside `data` that is lifted to the envelope's top-level `debug` field.
pub const DEBUG_KEY: &str = "debug";

/// Transport-level overrides a reply may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHints {
    /// Explicit transport status; wins over the code-derived status.
    pub status: Option<u16>,
    /// Extra response headers, in insertion order.
    pub headers: Vec<(String, String)>,
}

/// What a stage or handler wants to say to the caller, before enveloping.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Application code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Payload; `Null` becomes an empty object.
    pub data: Value,
    /// Transport overrides.
    pub hints: TransportHints,
}

impl Reply {
    /// A success reply (code 1) with no data.
    pub fn success(message: impl Into<String>) -> Self {
        Self::with_parts(CODE_SUCCESS, message)
    }

    /// A failure reply (code 0) with no data.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_parts(CODE_FAILURE, message)
    }

    fn with_parts(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
            hints: TransportHints::default(),
        }
    }

    /// Replaces the application code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    /// Replaces the payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Forces the transport status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.hints.status = Some(status);
        self
    }

    /// Adds a response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.headers.push((name.into(), value.into()));
        self
    }
}

/// The JSON body returned for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Application code: 1 success, 0 failure, negative for validation/auth, >= 1000 caller-defined.
    pub code: i64,
    /// Message for the caller.
    pub msg: String,
    /// Request arrival time, epoch seconds.
    pub time: i64,
    /// Payload, an empty object by default.
    pub data: Value,
    /// Diagnostic payload; never transmitted in the online environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

impl ResponseEnvelope {
    /// Returns a copy without the `debug` field.
    pub fn without_debug(&self) -> Self {
        Self {
            debug: None,
            ..self.clone()
        }
    }
}

/// Maps an application code to a transport status.
///
/// An explicit hint always wins. Otherwise codes in `[200, 1000)` are used as
/// the status verbatim and every other code maps to 200.
///
/// # Examples
///
/// ```
/// use gateway_pipeline::envelope::transport_status;
///
/// assert_eq!(transport_status(1, None), 200);
/// assert_eq!(transport_status(-7, None), 200);
/// assert_eq!(transport_status(404, None), 404);
/// assert_eq!(transport_status(1001, None), 200);
/// assert_eq!(transport_status(1, Some(503)), 503);
/// ```
pub fn transport_status(code: i64, hint: Option<u16>) -> u16 {
    if let Some(status) = hint {
        return status;
    }
    if (200..1000).contains(&code) {
        // In range, so the conversion cannot fail.
        u16::try_from(code).unwrap_or(200)
    } else {
        200
    }
}

/// An envelope ready to be audited and transmitted.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltEnvelope {
    /// The complete envelope, `debug` included. This is what gets audited.
    pub envelope: ResponseEnvelope,
    /// Transport status.
    pub status: u16,
    /// Extra response headers.
    pub headers: Vec<(String, String)>,
    environment: Environment,
}

impl BuiltEnvelope {
    /// The envelope as it may leave the process in the current environment.
    pub fn outgoing(&self) -> ResponseEnvelope {
        if self.environment.is_online() {
            self.envelope.without_debug()
        } else {
            self.envelope.clone()
        }
    }
}

/// Builds envelopes for one environment.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeBuilder {
    environment: Environment,
}

impl EnvelopeBuilder {
    /// Creates a builder for the given environment.
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Turns a reply into an envelope stamped with `time`.
    ///
    /// A `debug` key inside an object payload is moved to the top level.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::config::Environment;
    /// use gateway_pipeline::envelope::{EnvelopeBuilder, Reply};
    /// use serde_json::json;
    ///
    /// let builder = EnvelopeBuilder::new(Environment::Online);
    /// let built = builder.build(
    ///     Reply::error("bad input").with_code(-7).with_data(json!({ "debug": "auth_id" })),
    ///     1_700_000_000,
    /// );
    ///
    /// assert_eq!(built.envelope.debug, Some(json!("auth_id")));
    /// assert_eq!(built.envelope.data, json!({}));
    /// assert!(built.outgoing().debug.is_none());
    /// assert_eq!(built.status, 200);
    /// ```
    pub fn build(&self, reply: Reply, time: i64) -> BuiltEnvelope {
        let (data, debug) = split_debug(reply.data);
        let status = transport_status(reply.code, reply.hints.status);

        BuiltEnvelope {
            envelope: ResponseEnvelope {
                code: reply.code,
                msg: reply.message,
                time,
                data,
                debug,
            },
            status,
            headers: reply.hints.headers,
            environment: self.environment,
        }
    }
}

fn split_debug(data: Value) -> (Value, Option<Value>) {
    match data {
        Value::Null => (Value::Object(Map::new()), None),
        Value::Object(mut map) => {
            let debug = map.remove(DEBUG_KEY);
            (Value::Object(map), debug)
        }
        other => (other, None),
    }
}

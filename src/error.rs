//! Error taxonomy for the request pipeline.
//!
//! Every failure a stage can produce is a typed value here. None of them ever
//! reaches the transport layer directly: [`PipelineError::into_reply`] turns each
//! one into a [`Reply`] that the envelope builder renders.

use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::AuthStatus;
use crate::envelope::Reply;

/// Application code for a successful response.
pub const CODE_SUCCESS: i64 = 1;
/// Application code for a generic failure.
pub const CODE_FAILURE: i64 = 0;
/// Application code shared by validation and credential failures.
pub const CODE_INVALID_REQUEST: i64 = -7;

/// Message emitted when request parameters fail validation.
pub const MSG_INVALID_PARAMS: &str = "missing/invalid request parameters";
/// Message emitted when the caller credential is rejected.
pub const MSG_INVALID_CREDENTIAL: &str = "invalid or unauthorized credential";

/// Field name to human-readable message.
pub type FieldErrors = BTreeMap<String, String>;

/// The raw request body could not be turned into an input mapping.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Percent-decoding produced bytes that are not UTF-8.
    #[error("request body is not valid UTF-8 after percent-decoding")]
    Encoding,

    /// The decoded body is not JSON.
    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded body is JSON, but not an object.
    #[error("request body must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// One or more fields failed their declared rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed for {} field(s)", .errors.len())]
pub struct ValidationError {
    /// Failing fields and their messages.
    pub errors: FieldErrors,
}

impl ValidationError {
    /// Creates a validation error from collected field errors.
    pub fn new(errors: FieldErrors) -> Self {
        Self { errors }
    }
}

/// Failure talking to the credential registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The lookup did not finish within its budget.
    #[error("registry lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The registry could not serve the lookup.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// The caller credential was rejected by the auth gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No registry row exists for the identifier.
    #[error("credential not found")]
    NotFound,

    /// A row exists but its status is not active.
    #[error("credential is {0}")]
    Inactive(AuthStatus),

    /// The registry lookup itself failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl AuthError {
    /// Status text reported in the envelope's `debug` field.
    pub fn observed_status(&self) -> String {
        match self {
            AuthError::NotFound => "not found".to_string(),
            AuthError::Inactive(status) => status.to_string(),
            AuthError::Registry(_) => "unavailable".to_string(),
        }
    }
}

/// A before-action hook chose to end the request early.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("before-action hook aborted with code {code}: {message}")]
pub struct FilterAbort {
    /// Application code for the envelope.
    pub code: i64,
    /// Envelope message.
    pub message: String,
    /// Envelope data; a `debug` key is lifted as usual.
    pub data: Value,
}

impl FilterAbort {
    /// Creates an abort with the given code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Attaches envelope data to the abort.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// No handler is registered for the requested action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The controller/action pair is not in the dispatch table.
    #[error("no handler registered for {controller}/{action}")]
    UnknownAction {
        /// Requested controller.
        controller: String,
        /// Requested action.
        action: String,
    },
}

/// The audit record could not be persisted.
#[derive(Debug, Error)]
pub enum LogWriteError {
    /// The sink's storage failed.
    #[error("audit sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized.
    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The write did not finish within its budget.
    #[error("audit write timed out after {0:?}")]
    Timeout(Duration),

    /// The sink refused the record.
    #[error("audit sink rejected record: {0}")]
    Rejected(String),

    /// The sink panicked while writing.
    #[error("audit sink panicked: {0}")]
    Panicked(String),
}

/// The pipeline could not be assembled from its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A rule-set address names a rule-set that is not registered.
    #[error("unknown rule-set '{0}'")]
    UnknownRuleSet(String),

    /// A rule-set address names a scene the rule-set does not declare.
    #[error("rule-set '{ruleset}' has no scene '{scene}'")]
    UnknownScene {
        /// Rule-set name.
        ruleset: String,
        /// Scene name.
        scene: String,
    },

    /// A rule specification could not be parsed.
    #[error("invalid rule '{rule}' for field '{field}': {reason}")]
    InvalidRule {
        /// Field the rule was declared on.
        field: String,
        /// The offending rule text.
        rule: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No credential registry was supplied.
    #[error("a credential registry is required")]
    MissingRegistry,

    /// The audit log file could not be opened.
    #[error("cannot open audit log: {0}")]
    AuditLog(String),
}

/// Any reason a request stops before its handler produces a reply.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed request body.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Rule failures on the decoded input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Missing or inactive credential.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A before-action hook short-circuited.
    #[error(transparent)]
    Filter(#[from] FilterAbort),

    /// Unknown controller/action.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// An unexpected failure inside a stage or handler.
    #[error("internal defect: {0}")]
    Defect(String),
}

impl PipelineError {
    /// Resolves the error into the reply that will be enveloped.
    pub fn into_reply(self) -> Reply {
        match self {
            PipelineError::Decode(err) => Reply::error("malformed request body")
                .with_data(json!({ "debug": err.to_string() })),
            PipelineError::Validation(err) => Reply::error(MSG_INVALID_PARAMS)
                .with_code(CODE_INVALID_REQUEST)
                .with_data(json!({ "debug": err.errors })),
            PipelineError::Auth(err) => Reply::error(MSG_INVALID_CREDENTIAL)
                .with_code(CODE_INVALID_REQUEST)
                .with_data(json!({ "debug": format!("status: {}", err.observed_status()) })),
            PipelineError::Filter(abort) => Reply::error(abort.message)
                .with_code(abort.code)
                .with_data(abort.data),
            PipelineError::Dispatch(DispatchError::UnknownAction { controller, action }) => {
                Reply::error("unknown action")
                    .with_data(json!({ "debug": format!("{}/{}", controller, action) }))
            }
            PipelineError::Defect(detail) => {
                Reply::error("internal error").with_data(json!({ "debug": detail }))
            }
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Request-lifecycle pipeline for internal API gateway endpoints.
//!
//! Every request runs through the same fixed sequence before any business
//! logic sees it:
//! - **Decode**: percent-decoded JSON body, or ordinary parameters when the body is blank
//! - **Validate**: the input is checked against a named rule-set scene
//! - **Authenticate**: `auth_id` must resolve to an active registry row
//! - **Filter**: scoped before-action hooks run in declaration order
//! - **Dispatch**: a static `(controller, action)` table picks the handler
//! - **Envelope**: one uniform `{code, msg, time, data, debug}` body
//! - **Audit**: one record per request, written before the response is returned
//!
//! Any stage may end the request early. Its error is turned into an envelope
//! on the spot, so the transport only ever sees envelopes.
//!
//! # Core Types
//!
//! - [`PipelineBuilder`]: assembles a pipeline from [`Config`], a registry, hooks and routes
//! - [`Pipeline`]: runs a [`RawRequest`] to a [`Response`]
//! - [`RequestContext`]: per-request state seen by hooks and handlers
//! - [`Reply`]: what a handler or hook wants to say, before enveloping
//! - [`ResponseEnvelope`]: the body every caller receives
//! - [`AuditRecord`]: what gets persisted for every request
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use gateway_pipeline::{
//!     ActionScope, AuthRecord, AuthStatus, Config, FilterAbort, MemoryAuditSink,
//!     MemoryRegistry, PipelineBuilder, RawRequest, Reply, RequestContext,
//! };
//! use serde_json::json;
//!
//! let registry = Arc::new(MemoryRegistry::new());
//! registry.insert(AuthRecord::new("svc-1", AuthStatus::Active));
//! let audit = Arc::new(MemoryAuditSink::new());
//!
//! let pipeline = PipelineBuilder::new(Config::default())
//!     .registry(registry)
//!     .audit_sink(audit.clone())
//!     .before_action("maintenance", ActionScope::only(["ban"]), |_| {
//!         Err(FilterAbort::new(1001, "temporarily unavailable"))
//!     })
//!     .route("user", "info", |ctx: &RequestContext, _: &AuthRecord| {
//!         Reply::success("").with_data(json!({ "action": ctx.action() }))
//!     })
//!     .build()
//!     .expect("pipeline builds");
//!
//! let response = pipeline.handle(
//!     RawRequest::new("user", "info").with_body(r#"{"auth_id":"svc-1"}"#),
//! );
//! assert_eq!(response.envelope.code, 1);
//! assert_eq!(response.envelope.data, json!({ "action": "info" }));
//!
//! let response = pipeline.handle(RawRequest::new("user", "info"));
//! assert_eq!(response.envelope.code, -7);
//!
//! assert_eq!(audit.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod filter;
mod logging;
pub mod pipeline;
pub mod request;
pub mod validate;
pub mod web;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink};
pub use auth::{AuthGate, AuthRecord, AuthStatus, MemoryRegistry, Registry};
pub use config::{Config, DispatchMode, Environment};
pub use dispatch::{DispatchTable, Handler};
pub use envelope::{Reply, ResponseEnvelope};
pub use error::{BuildError, FilterAbort, PipelineError};
pub use filter::{ActionScope, FilterChain};
pub use logging::RequestLog;
pub use pipeline::{Pipeline, PipelineBuilder, Response};
pub use request::RequestContext;
pub use web::RawRequest;

//! The request pipeline.
//!
//! Decode, validate, authenticate, run before-action hooks, dispatch, build
//! the envelope, write the audit record. Stages run in that order and each
//! either hands the context on or ends the request with a [`PipelineError`].
//! Whatever happens, the caller gets exactly one envelope and exactly one
//! audit write is attempted.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Map;

use crate::audit::{
    AuditLogger, AuditRecord, AuditSink, FailureAlert, JsonLinesAuditSink, TracingAuditSink,
};
use crate::auth::{AuthGate, Registry};
use crate::config::{Config, DispatchMode};
use crate::dispatch::{DispatchTable, Handler};
use crate::envelope::{EnvelopeBuilder, Reply, ResponseEnvelope};
use crate::error::{panic_message, BuildError, FilterAbort, LogWriteError, PipelineError};
use crate::filter::{ActionScope, BeforeAction, FilterChain};
use crate::request::{RequestContext, LEGACY_SCENE};
use crate::validate::{validate, FailurePolicy, RuleRegistry, RuleSet, SceneRef, ValidateOptions};
use crate::web::{decode_input, RawRequest};

/// What the transport writes back.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Transport status.
    pub status: u16,
    /// Extra headers requested by the handler.
    pub headers: Vec<(String, String)>,
    /// The envelope as it may leave the process.
    pub envelope: ResponseEnvelope,
}

impl Response {
    /// JSON body bytes.
    pub fn body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.envelope)
    }
}

/// Assembles a [`Pipeline`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use gateway_pipeline::auth::{AuthRecord, AuthStatus, MemoryRegistry};
/// use gateway_pipeline::audit::MemoryAuditSink;
/// use gateway_pipeline::config::Config;
/// use gateway_pipeline::envelope::Reply;
/// use gateway_pipeline::pipeline::PipelineBuilder;
/// use gateway_pipeline::request::RequestContext;
/// use gateway_pipeline::web::RawRequest;
/// use serde_json::json;
///
/// let registry = Arc::new(MemoryRegistry::new());
/// registry.insert(AuthRecord::new("svc-1", AuthStatus::Active));
/// let audit = Arc::new(MemoryAuditSink::new());
///
/// let pipeline = PipelineBuilder::new(Config::default())
///     .registry(registry)
///     .audit_sink(audit.clone())
///     .route("user", "info", |_: &RequestContext, _: &AuthRecord| {
///         Reply::success("").with_data(json!({ "foo": 1 }))
///     })
///     .build()
///     .unwrap();
///
/// let response = pipeline.handle(
///     RawRequest::new("user", "info").with_body(r#"{"auth_id":"svc-1"}"#),
/// );
///
/// assert_eq!(response.status, 200);
/// assert_eq!(response.envelope.code, 1);
/// assert_eq!(response.envelope.data, json!({ "foo": 1 }));
/// assert_eq!(audit.records()[0].code, 1);
/// ```
pub struct PipelineBuilder {
    config: Config,
    rules: RuleRegistry,
    registry: Option<Arc<dyn Registry>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    filters: FilterChain,
    routes: DispatchTable,
    on_log_failure: Option<Arc<FailureAlert>>,
}

impl PipelineBuilder {
    /// Starts from `config` and the built-in `internal` rule-set.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            rules: RuleRegistry::with_builtin(),
            registry: None,
            audit_sink: None,
            filters: FilterChain::new(),
            routes: DispatchTable::new(),
            on_log_failure: None,
        }
    }

    /// Adds or replaces a rule-set.
    pub fn ruleset(mut self, set: RuleSet) -> Self {
        self.rules.register(set);
        self
    }

    /// Sets the credential registry. Required.
    pub fn registry<R>(mut self, registry: Arc<R>) -> Self
    where
        R: Registry + 'static,
    {
        self.registry = Some(registry as Arc<dyn Registry>);
        self
    }

    /// Sets the audit sink. Defaults to the configured JSON-lines file, or
    /// `tracing` when no file is configured.
    pub fn audit_sink<S>(mut self, sink: Arc<S>) -> Self
    where
        S: AuditSink + 'static,
    {
        self.audit_sink = Some(sink as Arc<dyn AuditSink>);
        self
    }

    /// Appends a before-action hook. Hooks run in the order they are added.
    pub fn before_action<F>(mut self, name: &str, scope: ActionScope, hook: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<(), FilterAbort> + Send + Sync + 'static,
    {
        self.filters.register(BeforeAction::new(name, scope, hook));
        self
    }

    /// Registers the handler for `controller`/`action`.
    pub fn route<H>(mut self, controller: &str, action: &str, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.routes.route(controller, action, handler);
        self
    }

    /// Alert callback for failed audit writes.
    pub fn on_log_failure<F>(mut self, alert: F) -> Self
    where
        F: Fn(&AuditRecord, &LogWriteError) + Send + Sync + 'static,
    {
        self.on_log_failure = Some(Arc::new(alert));
        self
    }

    /// Resolves scenes, opens the audit sink and returns the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] for an unknown rule-set or scene, an invalid
    /// configured rule, a missing registry, or an audit file that cannot be
    /// opened.
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let Self {
            config,
            mut rules,
            registry,
            audit_sink,
            filters,
            routes,
            on_log_failure,
        } = self;

        for def in &config.rulesets {
            rules.register(RuleSet::from_def(def)?);
        }

        let default_scene = rules.lookup(&config.validation_ruleset, None)?;
        let legacy_scene = match config.dispatch_mode {
            DispatchMode::Legacy => {
                Some(rules.lookup(&config.validation_ruleset, Some(LEGACY_SCENE))?)
            }
            DispatchMode::Routed => None,
        };

        let registry = registry.ok_or(BuildError::MissingRegistry)?;
        let gate = AuthGate::new(registry, config.registry_timeout());

        let sink: Arc<dyn AuditSink> = match (audit_sink, &config.audit_log_path) {
            (Some(sink), _) => sink,
            (None, Some(path)) => Arc::new(
                JsonLinesAuditSink::open(path).map_err(|e| BuildError::AuditLog(e.to_string()))?,
            ),
            (None, None) => Arc::new(TracingAuditSink),
        };
        let mut audit = AuditLogger::new(sink, config.audit_timeout());
        if let Some(alert) = on_log_failure {
            audit = audit.on_failure(move |record, err| alert(record, err));
        }

        tracing::info!(
            environment = ?config.environment,
            dispatch_mode = ?config.dispatch_mode,
            ruleset = %config.validation_ruleset,
            hooks = filters.len(),
            routes = routes.len(),
            "pipeline built"
        );

        Ok(Pipeline {
            envelopes: EnvelopeBuilder::new(config.environment),
            config,
            default_scene,
            legacy_scene,
            gate,
            filters,
            routes,
            audit,
        })
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("filters", &self.filters)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// A built pipeline. Shareable across threads; every request gets its own
/// [`RequestContext`].
pub struct Pipeline {
    config: Config,
    default_scene: SceneRef,
    legacy_scene: Option<SceneRef>,
    gate: AuthGate,
    filters: FilterChain,
    routes: DispatchTable,
    envelopes: EnvelopeBuilder,
    audit: AuditLogger,
}

impl Pipeline {
    /// Runs one request to completion.
    ///
    /// Never fails and never panics on behalf of a stage: every outcome,
    /// including a panicking handler or audit sink, becomes an envelope, and
    /// the audit write is attempted before this returns.
    pub fn handle(&self, raw: RawRequest) -> Response {
        let decoded = decode_input(raw.body(), raw.params(), self.config.strip_tags);
        let (input, decode_error) = match decoded {
            Ok(input) => (input, None),
            Err(err) => (Map::new(), Some(err)),
        };
        let mut ctx = RequestContext::new(raw, input);

        let reply = match decode_error {
            Some(err) => {
                ctx.log().warn(format_args!("rejecting request: {}", err));
                PipelineError::from(err).into_reply()
            }
            None => self.run_guarded(&mut ctx),
        };

        self.finish(&ctx, reply)
    }

    /// The configuration the pipeline was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Failed audit writes since the pipeline was built.
    pub fn audit_failures(&self) -> u64 {
        self.audit.failure_count()
    }

    fn run_guarded(&self, ctx: &mut RequestContext) -> Reply {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(ctx)));

        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                ctx.log().info(format_args!("request ended early: {}", err));
                err.into_reply()
            }
            Err(payload) => {
                let detail = panic_message(&*payload);
                ctx.log().error(format_args!("stage panicked: {}", detail));
                PipelineError::Defect(detail).into_reply()
            }
        }
    }

    fn run(&self, ctx: &mut RequestContext) -> Result<Reply, PipelineError> {
        let scene = match &self.legacy_scene {
            Some(legacy) => {
                ctx.route_from_input();
                ctx.set_scene(LEGACY_SCENE);
                legacy
            }
            None => &self.default_scene,
        };

        let options = ValidateOptions::new()
            .batch(self.config.batch_validate)
            .policy(FailurePolicy::Raise);
        validate(ctx.input_mut(), scene, options)?;

        let auth_id = ctx.request().auth_id.clone().unwrap_or_default();
        let record = self.gate.authenticate(&auth_id)?;
        ctx.set_auth(record.clone());

        self.filters.run(ctx)?;

        let handler = self.routes.resolve(ctx.controller(), ctx.action())?;
        ctx.log().debug(format_args!("dispatching"));

        Ok(handler.handle(ctx, &record))
    }

    fn finish(&self, ctx: &RequestContext, reply: Reply) -> Response {
        let built = self.envelopes.build(reply, ctx.received_at().timestamp());

        let audited =
            panic::catch_unwind(AssertUnwindSafe(|| self.audit.record(ctx, &built.envelope)));
        match audited {
            Ok(Ok(())) => {}
            Ok(Err(err)) => ctx
                .log()
                .warn(format_args!("responding without audit record: {}", err)),
            Err(payload) => ctx.log().error(format_args!(
                "audit stage panicked: {}",
                panic_message(&*payload)
            )),
        }

        let envelope = built.outgoing();
        ctx.log()
            .info(format_args!("responded with code {}", envelope.code));

        Response {
            status: built.status,
            headers: built.headers,
            envelope,
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("filters", &self.filters)
            .field("routes", &self.routes)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

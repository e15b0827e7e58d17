//! Integration tests for the transport boundary and configuration-driven
//! behavior: form parameters, legacy dispatch, configured rule-sets and the
//! JSON-lines audit file.

use std::io::{BufRead, BufReader};
use std::sync::Arc;

use gateway_pipeline::audit::AuditRecord;
use gateway_pipeline::validate::RuleSet;
use gateway_pipeline::{
    AuthRecord, AuthStatus, BuildError, Config, DispatchMode, MemoryAuditSink, MemoryRegistry,
    PipelineBuilder, RawRequest, Reply, RequestContext,
};
use serde_json::json;

fn registry() -> Arc<MemoryRegistry> {
    let registry = MemoryRegistry::new();
    registry.insert(AuthRecord::new("svc-1", AuthStatus::Active).with_metadata("name", json!("billing")));
    Arc::new(registry)
}

fn echo(ctx: &RequestContext, auth: &AuthRecord) -> Reply {
    Reply::success("").with_data(json!({
        "controller": ctx.controller(),
        "action": ctx.action(),
        "input": ctx.input(),
        "caller": auth.metadata["name"],
    }))
}

#[test]
fn form_parameters_flow_through_with_tags_stripped() {
    let audit = Arc::new(MemoryAuditSink::new());
    let pipeline = PipelineBuilder::new(Config::default())
        .registry(registry())
        .audit_sink(audit.clone())
        .route("note", "add", echo)
        .build()
        .unwrap();

    let raw = RawRequest::new("note", "add")
        .with_query_string("auth_id=svc-1&text=%3Cb%3Ehello%3C%2Fb%3E&data[user_id]=12")
        .with_remote_addr("192.0.2.10");
    let response = pipeline.handle(raw);

    assert_eq!(response.envelope.code, 1);
    assert_eq!(response.envelope.data["input"]["text"], "hello");
    assert_eq!(response.envelope.data["caller"], "billing");

    let record = &audit.records()[0];
    assert_eq!(record.user_id.as_deref(), Some("12"));
    assert_eq!(record.ip.as_deref(), Some("192.0.2.10"));
    assert_eq!(record.module, "note");
    assert_eq!(record.action, "add");
}

#[test]
fn tag_stripping_follows_configuration() {
    let config = Config {
        strip_tags: false,
        ..Config::default()
    };
    let pipeline = PipelineBuilder::new(config)
        .registry(registry())
        .audit_sink(Arc::new(MemoryAuditSink::new()))
        .route("note", "add", echo)
        .build()
        .unwrap();

    let response = pipeline.handle(
        RawRequest::new("note", "add").with_query_string("auth_id=svc-1&text=%3Ci%3Ex%3C%2Fi%3E"),
    );
    assert_eq!(response.envelope.data["input"]["text"], "<i>x</i>");
}

#[test]
fn legacy_mode_routes_by_input_and_validates_old_scene() {
    let audit = Arc::new(MemoryAuditSink::new());
    let config = Config {
        dispatch_mode: DispatchMode::Legacy,
        ..Config::default()
    };
    let pipeline = PipelineBuilder::new(config)
        .registry(registry())
        .audit_sink(audit.clone())
        .route("order", "list", echo)
        .build()
        .unwrap();

    let response = pipeline.handle(
        RawRequest::new("index", "index")
            .with_body(json!({ "auth_id": "svc-1", "module": "Order", "action": "list" }).to_string()),
    );
    assert_eq!(response.envelope.code, 1);
    assert_eq!(response.envelope.data["controller"], "Order");

    // `module` is required by the legacy scene.
    let response = pipeline.handle(
        RawRequest::new("index", "index")
            .with_body(json!({ "auth_id": "svc-1", "action": "list" }).to_string()),
    );
    assert_eq!(response.envelope.code, -7);
    assert_eq!(response.envelope.debug, Some(json!({ "module": "required" })));
    assert_eq!(audit.len(), 2);
}

#[test]
fn custom_ruleset_with_batch_validation() {
    let config = Config {
        validation_ruleset: "strict".to_string(),
        batch_validate: true,
        ..Config::default()
    };
    let strict = RuleSet::new("strict")
        .field("auth_id", "require|alphaDash")
        .unwrap()
        .field("page", "require|integer|min:1")
        .unwrap()
        .message("page.integer", "page must be a whole number");

    let pipeline = PipelineBuilder::new(config)
        .registry(registry())
        .audit_sink(Arc::new(MemoryAuditSink::new()))
        .ruleset(strict)
        .route("order", "list", echo)
        .build()
        .unwrap();

    let response = pipeline.handle(
        RawRequest::new("order", "list").with_body(json!({ "auth_id": "svc 1", "page": "x" }).to_string()),
    );

    assert_eq!(response.envelope.code, -7);
    assert_eq!(
        response.envelope.debug,
        Some(json!({
            "auth_id": "must contain letters, digits, '_' and '-' only",
            "page": "page must be a whole number",
        }))
    );
}

#[test]
fn configured_rulesets_and_audit_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "gateway.toml",
            r#"
                validation_ruleset = "orders"
                audit_log_path = "logs/audit.jsonl"
                rust_log = "warn,gateway_audit=info"

                [[rulesets]]
                name = "orders"

                [[rulesets.fields]]
                name = "auth_id"
                rules = "require"

                [[rulesets.fields]]
                name = "order_id"
                rules = "require|integer"

                [rulesets.scenes]
                default = ["auth_id", "order_id"]

                [rulesets.messages]
                "order_id.require" = "order_id is mandatory"
            "#,
        )?;

        let config = Config::load().expect("config loads");
        let _ = tracing_subscriber::fmt()
            .with_env_filter(config.env_filter().expect("filter parses"))
            .with_test_writer()
            .try_init();

        let pipeline = PipelineBuilder::new(config)
            .registry(registry())
            .route("order", "show", echo)
            .build()
            .expect("pipeline builds");

        let response = pipeline.handle(
            RawRequest::new("order", "show").with_body(json!({ "auth_id": "svc-1" }).to_string()),
        );
        assert_eq!(response.envelope.code, -7);
        assert_eq!(response.envelope.debug, Some(json!({ "order_id": "order_id is mandatory" })));

        let response = pipeline.handle(
            RawRequest::new("order", "show")
                .with_body(json!({ "auth_id": "svc-1", "order_id": 5 }).to_string()),
        );
        assert_eq!(response.envelope.code, 1);

        let path = jail.directory().join("logs/audit.jsonl");
        let file = std::fs::File::open(path).expect("audit file exists");
        let codes: Vec<i64> = BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str::<AuditRecord>(&line.unwrap()).unwrap().code)
            .collect();
        assert_eq!(codes, vec![-7, 1]);
        Ok(())
    });
}

#[test]
fn invalid_configured_rule_fails_the_build() {
    let config = Config {
        rulesets: vec![serde_json::from_value(json!({
            "name": "broken",
            "fields": [{ "name": "id", "rules": "require|shiny" }]
        }))
        .unwrap()],
        ..Config::default()
    };

    let err = PipelineBuilder::new(config)
        .registry(registry())
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidRule { ref field, .. } if field == "id"));
}

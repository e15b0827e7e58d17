//! The validation engine.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use super::ruleset::{FieldRules, SceneRef};
use crate::error::{BuildError, FieldErrors, ValidationError};

/// Result of checking an input against a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Every rule passed.
    Valid,
    /// At least one field failed.
    Invalid(FieldErrors),
}

impl ValidationOutcome {
    /// Returns true when every rule passed.
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    /// Field errors, if any.
    pub fn errors(&self) -> Option<&FieldErrors> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid(errors) => Some(errors),
        }
    }
}

/// What `validate` does with a failed outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return `Ok(ValidationOutcome::Invalid(..))` for the caller to inspect.
    #[default]
    Return,
    /// Return `Err(ValidationError)`.
    Raise,
}

/// Hook run against the validator and the input before declarative rules.
pub type ValidateCallback<'a> = Box<dyn FnOnce(&mut Validator, &mut Map<String, Value>) + 'a>;

/// Per-call options for [`validate`].
#[derive(Default)]
pub struct ValidateOptions<'a> {
    messages: HashMap<String, String>,
    batch: bool,
    callback: Option<ValidateCallback<'a>>,
    policy: FailurePolicy,
}

impl<'a> ValidateOptions<'a> {
    /// Options with no overrides, first-error mode and [`FailurePolicy::Return`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message override keyed by `<field>.<rule>`, `<field>` or `<rule>`.
    pub fn message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(key.into(), message.into());
        self
    }

    /// Collect every failing field instead of stopping at the first.
    pub fn batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// Runs `callback` before the declarative rules.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&mut Validator, &mut Map<String, Value>) + 'a,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Chooses how a failed outcome is reported.
    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl fmt::Debug for ValidateOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateOptions")
            .field("messages", &self.messages)
            .field("batch", &self.batch)
            .field("callback", &self.callback.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

/// An in-progress validation of one input against one scene.
///
/// Callbacks receive a `&mut Validator` and may add rules or record errors
/// of their own before the scene's rules run.
#[derive(Debug, Clone)]
pub struct Validator {
    scene: SceneRef,
    batch: bool,
    messages: HashMap<String, String>,
    extra: Vec<FieldRules>,
    rejected: FieldErrors,
}

impl Validator {
    /// Creates a validator for `scene` using the rule-set's message overrides.
    pub fn new(scene: SceneRef) -> Self {
        let messages = scene.ruleset().messages().clone();
        Self {
            scene,
            batch: false,
            messages,
            extra: Vec::new(),
            rejected: FieldErrors::new(),
        }
    }

    /// Enables or disables batch mode.
    pub fn batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// Merges message overrides over the rule-set's.
    pub fn messages(mut self, overrides: HashMap<String, String>) -> Self {
        self.messages.extend(overrides);
        self
    }

    /// Adds ad-hoc rules for a field, checked after the scene's rules.
    pub fn rule(&mut self, field: impl Into<String>, spec: &str) -> Result<&mut Self, BuildError> {
        self.extra.push(FieldRules::parse(field, spec)?);
        Ok(self)
    }

    /// Records a failure for `field` directly.
    pub fn reject(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.rejected
            .entry(field.into())
            .or_insert_with(|| message.into());
        self
    }

    /// Checks `data` and returns the outcome.
    ///
    /// In first-error mode the first failing rule ends the check. In batch mode
    /// every field is checked and each failing field reports its first failure.
    pub fn check(&self, data: &Map<String, Value>) -> ValidationOutcome {
        let mut errors = self.rejected.clone();
        if !self.batch && !errors.is_empty() {
            return ValidationOutcome::Invalid(errors);
        }

        let fields = self.scene.fields().into_iter().chain(self.extra.iter());
        for field in fields {
            if errors.contains_key(field.field()) {
                continue;
            }
            let value = data.get(field.field());
            let failed = field.rules().iter().find(|rule| !rule.check(value, data));
            if let Some(rule) = failed {
                errors.insert(field.field().to_string(), self.message_for(field.field(), rule));
                if !self.batch {
                    break;
                }
            }
        }

        if errors.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid(errors)
        }
    }

    fn message_for(&self, field: &str, rule: &super::Rule) -> String {
        [format!("{}.{}", field, rule.key()), field.to_string(), rule.key().to_string()]
            .iter()
            .find_map(|key| self.messages.get(key).cloned())
            .unwrap_or_else(|| rule.default_message())
    }
}

/// Validates `data` against `scene`.
///
/// The optional callback runs first and may mutate `data`, add rules or
/// record errors. Declarative rules run afterwards.
///
/// # Examples
///
/// ```
/// use gateway_pipeline::validate::{validate, RuleRegistry, ValidateOptions, ValidationOutcome};
/// use serde_json::{json, Map, Value};
///
/// let scene = RuleRegistry::with_builtin().resolve("internal").unwrap();
///
/// let mut data: Map<String, Value> = json!({ "auth_id": "" }).as_object().unwrap().clone();
/// let outcome = validate(&mut data, &scene, ValidateOptions::new()).unwrap();
///
/// match outcome {
///     ValidationOutcome::Invalid(errors) => assert_eq!(errors["auth_id"], "required"),
///     ValidationOutcome::Valid => unreachable!(),
/// }
/// ```
pub fn validate(
    data: &mut Map<String, Value>,
    scene: &SceneRef,
    options: ValidateOptions<'_>,
) -> Result<ValidationOutcome, ValidationError> {
    let ValidateOptions {
        messages,
        batch,
        callback,
        policy,
    } = options;

    let mut validator = Validator::new(scene.clone())
        .batch(batch)
        .messages(messages);

    if let Some(callback) = callback {
        callback(&mut validator, data);
    }

    match validator.check(data) {
        ValidationOutcome::Invalid(errors) if policy == FailurePolicy::Raise => {
            Err(ValidationError::new(errors))
        }
        outcome => Ok(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{RuleRegistry, RuleSet};
    use serde_json::json;

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn orders() -> SceneRef {
        let mut registry = RuleRegistry::new();
        registry.register(
            RuleSet::new("orders")
                .field("id", "require|integer")
                .unwrap()
                .field("qty", "require|between:1,10")
                .unwrap()
                .field("note", "length:0,5")
                .unwrap()
                .scene("create", ["qty", "note"])
                .message("qty.between", "qty out of range"),
        );
        registry.resolve("orders").unwrap()
    }

    #[test]
    fn valid_input_passes() {
        let mut data = input(json!({ "id": "7", "qty": 3 }));
        let outcome = validate(&mut data, &orders(), ValidateOptions::new()).unwrap();
        assert!(outcome.is_valid());
    }

    #[test]
    fn first_error_mode_stops_early() {
        let mut data = input(json!({ "id": "x", "qty": 99 }));
        let outcome = validate(&mut data, &orders(), ValidateOptions::new()).unwrap();
        let errors = outcome.errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["id"], "must be an integer");
    }

    #[test]
    fn batch_mode_collects_every_field() {
        let mut data = input(json!({ "id": "x", "qty": 99, "note": "too long" }));
        let outcome =
            validate(&mut data, &orders(), ValidateOptions::new().batch(true)).unwrap();
        let errors = outcome.errors().unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["qty"], "qty out of range");
    }

    #[test]
    fn per_call_messages_win() {
        let mut data = input(json!({ "qty": 3 }));
        let outcome = validate(
            &mut data,
            &orders(),
            ValidateOptions::new().message("id", "id please"),
        )
        .unwrap();
        assert_eq!(outcome.errors().unwrap()["id"], "id please");
    }

    #[test]
    fn rule_key_message_applies_to_any_field() {
        let mut data = input(json!({}));
        let outcome = validate(
            &mut data,
            &orders(),
            ValidateOptions::new().message("require", "missing"),
        )
        .unwrap();
        assert_eq!(outcome.errors().unwrap()["id"], "missing");
    }

    #[test]
    fn scene_selects_fields() {
        let mut registry = RuleRegistry::new();
        registry.register(
            RuleSet::new("orders")
                .field("id", "require")
                .unwrap()
                .field("qty", "require")
                .unwrap()
                .scene("create", ["qty"]),
        );
        let scene = registry.resolve("orders.create").unwrap();

        let mut data = input(json!({ "qty": 1 }));
        assert!(validate(&mut data, &scene, ValidateOptions::new())
            .unwrap()
            .is_valid());
    }

    #[test]
    fn raise_policy_returns_error() {
        let mut data = input(json!({}));
        let err = validate(
            &mut data,
            &orders(),
            ValidateOptions::new().policy(FailurePolicy::Raise),
        )
        .unwrap_err();
        assert!(err.errors.contains_key("id"));
    }

    #[test]
    fn callback_runs_before_rules_and_may_mutate_input() {
        let mut data = input(json!({ "qty": 3 }));
        let outcome = validate(
            &mut data,
            &orders(),
            ValidateOptions::new().callback(|_, data| {
                data.insert("id".to_string(), json!(5));
            }),
        )
        .unwrap();
        assert!(outcome.is_valid());
        assert_eq!(data["id"], 5);
    }

    #[test]
    fn callback_can_add_rules_and_reject() {
        let mut data = input(json!({ "id": 1, "qty": 3, "coupon": "abc" }));
        let outcome = validate(
            &mut data,
            &orders(),
            ValidateOptions::new().batch(true).callback(|v, data| {
                v.rule("coupon", "integer").unwrap();
                if data.get("qty") == Some(&json!(3)) {
                    v.reject("qty", "three is unlucky");
                }
            }),
        )
        .unwrap();

        let errors = outcome.errors().unwrap();
        assert_eq!(errors["coupon"], "must be an integer");
        assert_eq!(errors["qty"], "three is unlucky");
    }
}

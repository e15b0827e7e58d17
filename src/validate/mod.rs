//! Scene-based input validation.
//!
//! - [`Rule`]: a single declarative check parsed from `require|integer` syntax
//! - [`RuleSet`]: per-field rules plus named scenes
//! - [`RuleRegistry`]: resolves `"<ruleset>.<scene>"` into a [`SceneRef`] once
//! - [`validate`]: checks an input against a resolved scene

mod rule;
mod ruleset;
mod validator;

pub use rule::{Rule, RuleParseError};
pub use ruleset::{FieldDef, FieldRules, RuleRegistry, RuleSet, RuleSetDef, SceneRef};
pub use validator::{
    validate, FailurePolicy, ValidateCallback, ValidateOptions, ValidationOutcome, Validator,
};

pub(crate) use rule::scalar_text;

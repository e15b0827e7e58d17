//! Named rule-sets and their scenes.
//!
//! A rule-set declares rules per field; a scene selects a subset of those
//! fields for one call site. Scene addresses (`"internal.old"`) are resolved
//! into a [`SceneRef`] once, at pipeline build time, so the request path never
//! parses them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::rule::Rule;
use crate::error::BuildError;
use crate::request::{DEFAULT_SCENE, LEGACY_SCENE};

/// Serialized form of one field's rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Input key.
    pub name: String,
    /// Pipe-separated rule list, e.g. `require|integer`.
    pub rules: String,
}

/// Serialized form of a rule-set, as found in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetDef {
    /// Rule-set name used in scene addresses.
    pub name: String,
    /// Fields in check order.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Scene name to the fields it checks.
    #[serde(default)]
    pub scenes: BTreeMap<String, Vec<String>>,
    /// Message overrides keyed by `<field>.<rule>` or `<field>`.
    #[serde(default)]
    pub messages: BTreeMap<String, String>,
}

/// Parsed rules for one field.
#[derive(Debug, Clone)]
pub struct FieldRules {
    pub(crate) field: String,
    pub(crate) rules: Vec<Rule>,
}

impl FieldRules {
    /// Parses `spec` into rules for `field`.
    pub fn parse(field: impl Into<String>, spec: &str) -> Result<Self, BuildError> {
        let field = field.into();
        let rules = Rule::parse_list(spec).map_err(|err| BuildError::InvalidRule {
            field: field.clone(),
            rule: err.rule().to_string(),
            reason: err.reason().to_string(),
        })?;
        Ok(Self { field, rules })
    }

    /// Input key these rules apply to.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The parsed rules, in check order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// A validated, ready-to-use rule-set.
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    fields: Vec<FieldRules>,
    scenes: HashMap<String, Vec<String>>,
    messages: HashMap<String, String>,
}

impl RuleSet {
    /// Creates an empty rule-set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            scenes: HashMap::new(),
            messages: HashMap::new(),
        }
    }

    /// The rule-set every gateway endpoint validates against by default.
    ///
    /// The default scene requires `auth_id`; the legacy `old` scene also requires
    /// `module` and `action`, which legacy dispatch routes on.
    pub fn internal() -> Self {
        let fields = [
            ("auth_id", vec![Rule::Require]),
            ("module", vec![Rule::Require, Rule::AlphaDash]),
            ("action", vec![Rule::Require, Rule::AlphaDash]),
        ];

        Self {
            name: "internal".to_string(),
            fields: fields
                .into_iter()
                .map(|(field, rules)| FieldRules {
                    field: field.to_string(),
                    rules,
                })
                .collect(),
            scenes: HashMap::from([
                (DEFAULT_SCENE.to_string(), vec!["auth_id".to_string()]),
                (
                    LEGACY_SCENE.to_string(),
                    vec![
                        "auth_id".to_string(),
                        "module".to_string(),
                        "action".to_string(),
                    ],
                ),
            ]),
            messages: HashMap::new(),
        }
    }

    /// Builds a rule-set from its serialized form, parsing every rule.
    pub fn from_def(def: &RuleSetDef) -> Result<Self, BuildError> {
        let mut set = Self::new(def.name.clone());
        for field in &def.fields {
            set = set.field(field.name.clone(), &field.rules)?;
        }
        for (scene, fields) in &def.scenes {
            set = set.scene(scene.clone(), fields.iter().cloned());
        }
        for (key, message) in &def.messages {
            set = set.message(key.clone(), message.clone());
        }
        Ok(set)
    }

    /// Adds rules for a field. Fields are checked in the order they are added.
    pub fn field(mut self, field: impl Into<String>, spec: &str) -> Result<Self, BuildError> {
        let rules = FieldRules::parse(field, spec)?;
        match self.fields.iter_mut().find(|f| f.field == rules.field) {
            Some(existing) => *existing = rules,
            None => self.fields.push(rules),
        }
        Ok(self)
    }

    /// Declares a scene as the list of fields it checks.
    pub fn scene<I, S>(mut self, scene: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scenes
            .insert(scene.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a default message override.
    pub fn message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(key.into(), message.into());
        self
    }

    /// Rule-set name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the scene is declared.
    pub fn has_scene(&self, scene: &str) -> bool {
        self.scenes.contains_key(scene)
    }

    pub(crate) fn messages(&self) -> &HashMap<String, String> {
        &self.messages
    }

    /// Fields checked by `scene`, in declaration order. `None` selects every field.
    pub(crate) fn fields_for(&self, scene: Option<&str>) -> Vec<&FieldRules> {
        match scene.and_then(|s| self.scenes.get(s)) {
            Some(selected) => self
                .fields
                .iter()
                .filter(|f| selected.iter().any(|name| *name == f.field))
                .collect(),
            None => self.fields.iter().collect(),
        }
    }
}

/// A resolved `(rule-set, scene)` pair.
#[derive(Debug, Clone)]
pub struct SceneRef {
    set: Arc<RuleSet>,
    scene: Option<String>,
}

impl SceneRef {
    /// The rule-set this scene belongs to.
    pub fn ruleset(&self) -> &RuleSet {
        &self.set
    }

    /// The scene name, or `None` for "all fields".
    pub fn scene(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    pub(crate) fn fields(&self) -> Vec<&FieldRules> {
        self.set.fields_for(self.scene.as_deref())
    }
}

/// All rule-sets known to a pipeline.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    sets: HashMap<String, Arc<RuleSet>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `internal` rule-set.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(RuleSet::internal());
        registry
    }

    /// Adds or replaces a rule-set.
    pub fn register(&mut self, set: RuleSet) {
        self.sets.insert(set.name.clone(), Arc::new(set));
    }

    /// Resolves `"<ruleset>"` or `"<ruleset>.<scene>"`.
    ///
    /// A missing scene, or the `default` scene on a rule-set that does not
    /// declare one, selects every field. Any other undeclared scene is an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::validate::RuleRegistry;
    ///
    /// let registry = RuleRegistry::with_builtin();
    /// assert!(registry.resolve("internal").is_ok());
    /// assert!(registry.resolve("internal.old").is_ok());
    /// assert!(registry.resolve("internal.nope").is_err());
    /// assert!(registry.resolve("missing").is_err());
    /// ```
    pub fn resolve(&self, address: &str) -> Result<SceneRef, BuildError> {
        match address.split_once('.') {
            Some((name, scene)) => self.lookup(name, Some(scene)),
            None => self.lookup(address, None),
        }
    }

    /// Resolves a structured `(ruleset, scene)` pair. See [`RuleRegistry::resolve`].
    pub fn lookup(&self, name: &str, scene: Option<&str>) -> Result<SceneRef, BuildError> {
        let set = self
            .sets
            .get(name)
            .ok_or_else(|| BuildError::UnknownRuleSet(name.to_string()))?;

        let scene = match scene {
            None => set.has_scene(DEFAULT_SCENE).then(|| DEFAULT_SCENE.to_string()),
            Some(scene) if set.has_scene(scene) => Some(scene.to_string()),
            Some(DEFAULT_SCENE) => None,
            Some(scene) => {
                return Err(BuildError::UnknownScene {
                    ruleset: name.to_string(),
                    scene: scene.to_string(),
                })
            }
        };

        Ok(SceneRef {
            set: Arc::clone(set),
            scene,
        })
    }
}

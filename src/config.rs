//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::validate::RuleSetDef;

const CONFIG_FILE: &str = "gateway.toml";
const ENV_PREFIX: &str = "GATEWAY_";

/// Deployment environment. Only controls whether `debug` leaves the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production. `debug` is stripped from every outgoing envelope.
    Online,
    /// Anything else.
    #[default]
    Offline,
}

impl Environment {
    /// Returns true for the production environment.
    pub fn is_online(self) -> bool {
        matches!(self, Environment::Online)
    }
}

/// How the target controller/action is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// The transport resolved controller/action from the route.
    #[default]
    Routed,
    /// Controller/action come from the input's `module`/`action` fields and
    /// validation uses the `old` scene.
    Legacy,
}

/// Complete pipeline configuration.
///
/// Loaded in priority order:
/// 1. Environment variables prefixed `GATEWAY_` (highest)
/// 2. `gateway.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Environment flag.
    ///
    /// Environment variable: `GATEWAY_ENVIRONMENT`
    #[serde(default)]
    pub environment: Environment,
    /// Dispatch mode.
    ///
    /// Environment variable: `GATEWAY_DISPATCH_MODE`
    #[serde(default)]
    pub dispatch_mode: DispatchMode,
    /// Rule-set used by the pipeline's own validation stage.
    #[serde(default = "default_validation_ruleset")]
    pub validation_ruleset: String,
    /// Collect every field error instead of stopping at the first.
    #[serde(default)]
    pub batch_validate: bool,
    /// Strip HTML tags from ordinary request parameters.
    #[serde(default = "default_strip_tags")]
    pub strip_tags: bool,
    /// Budget for one registry lookup, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub registry_timeout_ms: u64,
    /// Budget for one audit write, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub audit_timeout_ms: u64,
    /// JSON-lines file receiving audit records. When unset, records go to tracing.
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
    /// Additional rule-sets, or replacements for the built-in `internal` one.
    #[serde(default)]
    pub rulesets: Vec<RuleSetDef>,
    /// Log filter directive.
    ///
    /// Environment variable: `GATEWAY_RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `gateway.toml` and `GATEWAY_*` variables.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX));

        Self::from_figment(figment)
    }

    /// Extracts and validates configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Registry lookup budget.
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    /// Audit write budget.
    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    /// Log filter built from `rust_log`, for the host's subscriber.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::Config;
    ///
    /// let config = Config {
    ///     rust_log: "warn,gateway_audit=info".to_string(),
    ///     ..Config::default()
    /// };
    /// assert!(config.env_filter().is_ok());
    ///
    /// let config = Config {
    ///     rust_log: "gateway=shouty".to_string(),
    ///     ..Config::default()
    /// };
    /// assert!(config.env_filter().is_err());
    /// ```
    pub fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.rust_log)
            .with_context(|| format!("invalid rust_log directive '{}'", self.rust_log))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.registry_timeout_ms == 0 {
            anyhow::bail!("registry_timeout_ms must be greater than 0");
        }

        if self.audit_timeout_ms == 0 {
            anyhow::bail!("audit_timeout_ms must be greater than 0");
        }

        if self.validation_ruleset.trim().is_empty() {
            anyhow::bail!("validation_ruleset must not be empty");
        }

        if self.validation_ruleset.contains('.') {
            anyhow::bail!("validation_ruleset names a rule-set, not a scene");
        }

        self.env_filter()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            dispatch_mode: DispatchMode::default(),
            validation_ruleset: default_validation_ruleset(),
            batch_validate: false,
            strip_tags: default_strip_tags(),
            registry_timeout_ms: default_timeout_ms(),
            audit_timeout_ms: default_timeout_ms(),
            audit_log_path: None,
            rulesets: Vec::new(),
            rust_log: default_log_level(),
        }
    }
}

fn default_validation_ruleset() -> String {
    "internal".to_string()
}

fn default_strip_tags() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.environment, Environment::Offline);
        assert_eq!(config.dispatch_mode, DispatchMode::Routed);
        assert_eq!(config.validation_ruleset, "internal");
        assert!(config.strip_tags);
        assert_eq!(config.registry_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                    environment = "offline"
                    batch_validate = true
                    audit_timeout_ms = 250
                "#,
            )?;
            jail.set_env("GATEWAY_ENVIRONMENT", "online");
            jail.set_env("GATEWAY_DISPATCH_MODE", "legacy");
            jail.set_env("GATEWAY_RUST_LOG", "debug,gateway_audit=info");

            let config = Config::load().expect("config loads");

            assert_eq!(config.environment, Environment::Online);
            assert_eq!(config.dispatch_mode, DispatchMode::Legacy);
            assert!(config.batch_validate);
            assert_eq!(config.audit_timeout(), Duration::from_millis(250));
            assert_eq!(config.rust_log, "debug,gateway_audit=info");
            Ok(())
        });
    }

    #[test]
    fn rulesets_load_from_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                    [[rulesets]]
                    name = "orders"

                    [[rulesets.fields]]
                    name = "order_id"
                    rules = "require|integer"

                    [rulesets.scenes]
                    lookup = ["order_id"]
                "#,
            )?;

            let config = Config::load().expect("config loads");

            assert_eq!(config.rulesets.len(), 1);
            assert_eq!(config.rulesets[0].name, "orders");
            assert_eq!(config.rulesets[0].fields[0].rules, "require|integer");
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        config.registry_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audit_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.validation_ruleset = "internal.old".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rust_log = "gateway=shouty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_environment_fails_to_load() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GATEWAY_ENVIRONMENT", "staging");
            assert!(Config::load().is_err());
            Ok(())
        });
    }
}

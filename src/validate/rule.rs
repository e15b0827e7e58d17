//! Declarative field rules.
//!
//! Rules are written in the compact pipe syntax used by rule-set files:
//! `require|integer|between:1,100`. Parsing happens once, when a rule-set is
//! built; checking is cheap.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("static pattern")
});

/// A rule could not be parsed from its text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleParseError {
    rule: String,
    reason: String,
}

impl RuleParseError {
    fn new(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }

    /// The rule text that failed.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Why it failed.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for RuleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rule '{}': {}", self.rule, self.reason)
    }
}

impl std::error::Error for RuleParseError {}

/// A single check applied to one field.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Present and not empty. `"0"` and `0` count as present.
    Require,
    /// Integer, or a string that parses as one.
    Integer,
    /// Any number, or a string that parses as one.
    Number,
    /// `true`, `false`, `0`, `1` or their string forms.
    Boolean,
    /// ASCII letters only.
    Alpha,
    /// ASCII letters and digits.
    AlphaNum,
    /// ASCII letters, digits, `_` and `-`.
    AlphaDash,
    /// An email address.
    Email,
    /// A JSON object or array.
    Array,
    /// Character (or element) count within bounds, inclusive.
    Length {
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },
    /// Numeric value, or length for non-numeric values, at most this.
    Max(f64),
    /// Numeric value, or length for non-numeric values, at least this.
    Min(f64),
    /// Numeric value within bounds, inclusive.
    Between(f64, f64),
    /// One of the listed values.
    In(Vec<String>),
    /// None of the listed values.
    NotIn(Vec<String>),
    /// Matches the pattern.
    Regex(Regex),
    /// Equal to another field.
    Confirm(String),
    /// Different from another field.
    Different(String),
}

impl Rule {
    /// Parses a single rule such as `length:1,32`.
    pub fn parse(text: &str) -> Result<Self, RuleParseError> {
        let text = text.trim();
        let (name, arg) = match text.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg)),
            None => (text, None),
        };

        if name.is_empty() {
            return Err(RuleParseError::new(text, "empty rule name"));
        }

        let rule = match (name, arg) {
            ("require" | "required", None) => Rule::Require,
            ("integer" | "int", None) => Rule::Integer,
            ("number" | "numeric", None) => Rule::Number,
            ("boolean" | "bool", None) => Rule::Boolean,
            ("alpha", None) => Rule::Alpha,
            ("alphaNum", None) => Rule::AlphaNum,
            ("alphaDash", None) => Rule::AlphaDash,
            ("email", None) => Rule::Email,
            ("array", None) => Rule::Array,
            ("length", Some(arg)) => {
                let (min, max) = match arg.split_once(',') {
                    Some((min, max)) => (parse_usize(text, min)?, parse_usize(text, max)?),
                    None => {
                        let exact = parse_usize(text, arg)?;
                        (exact, exact)
                    }
                };
                if min > max {
                    return Err(RuleParseError::new(text, "lower bound exceeds upper bound"));
                }
                Rule::Length { min, max }
            }
            ("max", Some(arg)) => Rule::Max(parse_f64(text, arg)?),
            ("min", Some(arg)) => Rule::Min(parse_f64(text, arg)?),
            ("between", Some(arg)) => {
                let (low, high) = arg
                    .split_once(',')
                    .ok_or_else(|| RuleParseError::new(text, "expected two bounds"))?;
                let (low, high) = (parse_f64(text, low)?, parse_f64(text, high)?);
                if low > high {
                    return Err(RuleParseError::new(text, "lower bound exceeds upper bound"));
                }
                Rule::Between(low, high)
            }
            ("in", Some(arg)) => Rule::In(split_list(arg)),
            ("notIn", Some(arg)) => Rule::NotIn(split_list(arg)),
            ("regex", Some(arg)) => Rule::Regex(
                Regex::new(arg).map_err(|e| RuleParseError::new(text, e.to_string()))?,
            ),
            ("confirm", Some(arg)) => Rule::Confirm(arg.trim().to_string()),
            ("different", Some(arg)) => Rule::Different(arg.trim().to_string()),
            (_, None) => return Err(RuleParseError::new(text, "unknown rule or missing argument")),
            (_, Some(_)) => {
                return Err(RuleParseError::new(text, "unknown rule or unexpected argument"))
            }
        };

        Ok(rule)
    }

    /// Parses a pipe-separated rule list such as `require|integer`.
    ///
    /// `regex:` must come last in the list since its pattern may contain `|`.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::validate::Rule;
    ///
    /// let rules = Rule::parse_list("require|length:1,32").unwrap();
    /// assert_eq!(rules.len(), 2);
    /// assert_eq!(rules[0].key(), "require");
    /// assert_eq!(rules[1].key(), "length");
    /// ```
    pub fn parse_list(text: &str) -> Result<Vec<Self>, RuleParseError> {
        let mut rules = Vec::new();
        let mut rest = text.trim();

        while !rest.is_empty() {
            if rest.starts_with("regex:") {
                rules.push(Rule::parse(rest)?);
                break;
            }
            let (head, tail) = rest.split_once('|').unwrap_or((rest, ""));
            if !head.trim().is_empty() {
                rules.push(Rule::parse(head)?);
            }
            rest = tail.trim_start();
        }

        Ok(rules)
    }

    /// Key used to look up custom messages (`<field>.<key>`).
    pub fn key(&self) -> &'static str {
        match self {
            Rule::Require => "require",
            Rule::Integer => "integer",
            Rule::Number => "number",
            Rule::Boolean => "boolean",
            Rule::Alpha => "alpha",
            Rule::AlphaNum => "alphaNum",
            Rule::AlphaDash => "alphaDash",
            Rule::Email => "email",
            Rule::Array => "array",
            Rule::Length { .. } => "length",
            Rule::Max(_) => "max",
            Rule::Min(_) => "min",
            Rule::Between(..) => "between",
            Rule::In(_) => "in",
            Rule::NotIn(_) => "notIn",
            Rule::Regex(_) => "regex",
            Rule::Confirm(_) => "confirm",
            Rule::Different(_) => "different",
        }
    }

    /// Message used when no override is configured.
    pub fn default_message(&self) -> String {
        match self {
            Rule::Require => "required".to_string(),
            Rule::Integer => "must be an integer".to_string(),
            Rule::Number => "must be numeric".to_string(),
            Rule::Boolean => "must be a boolean".to_string(),
            Rule::Alpha => "must contain letters only".to_string(),
            Rule::AlphaNum => "must contain letters and digits only".to_string(),
            Rule::AlphaDash => "must contain letters, digits, '_' and '-' only".to_string(),
            Rule::Email => "must be a valid email address".to_string(),
            Rule::Array => "must be an object or array".to_string(),
            Rule::Length { min, max } if min == max => format!("length must be {}", min),
            Rule::Length { min, max } => format!("length must be between {} and {}", min, max),
            Rule::Max(max) => format!("must not exceed {}", max),
            Rule::Min(min) => format!("must be at least {}", min),
            Rule::Between(low, high) => format!("must be between {} and {}", low, high),
            Rule::In(values) => format!("must be one of: {}", values.join(",")),
            Rule::NotIn(values) => format!("must not be one of: {}", values.join(",")),
            Rule::Regex(_) => "has an invalid format".to_string(),
            Rule::Confirm(other) => format!("must match {}", other),
            Rule::Different(other) => format!("must differ from {}", other),
        }
    }

    /// Applies the rule to `value`, with `data` available for cross-field rules.
    ///
    /// Every rule except `require` passes when the value is absent or empty.
    pub fn check(&self, value: Option<&Value>, data: &Map<String, Value>) -> bool {
        if let Rule::Require = self {
            return value.is_some_and(|v| !is_empty(v));
        }

        let value = match value {
            Some(v) if !is_empty(v) => v,
            _ => return true,
        };

        match self {
            Rule::Require => true,
            Rule::Integer => as_i64(value).is_some(),
            Rule::Number => as_f64(value).is_some(),
            Rule::Boolean => {
                matches!(scalar_text(value).as_deref(), Some("0" | "1" | "true" | "false"))
            }
            Rule::Alpha => text_all(value, |c| c.is_ascii_alphabetic()),
            Rule::AlphaNum => text_all(value, |c| c.is_ascii_alphanumeric()),
            Rule::AlphaDash => {
                text_all(value, |c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            }
            Rule::Email => value.as_str().is_some_and(|s| EMAIL.is_match(s)),
            Rule::Array => value.is_object() || value.is_array(),
            Rule::Length { min, max } => {
                measure(value).is_some_and(|len| (*min..=*max).contains(&len))
            }
            Rule::Max(max) => magnitude(value).is_some_and(|m| m <= *max),
            Rule::Min(min) => magnitude(value).is_some_and(|m| m >= *min),
            Rule::Between(low, high) => as_f64(value).is_some_and(|n| n >= *low && n <= *high),
            Rule::In(values) => {
                scalar_text(value).is_some_and(|s| values.iter().any(|v| *v == s))
            }
            Rule::NotIn(values) => {
                scalar_text(value).is_some_and(|s| !values.iter().any(|v| *v == s))
            }
            Rule::Regex(pattern) => scalar_text(value).is_some_and(|s| pattern.is_match(&s)),
            Rule::Confirm(other) => data.get(other) == Some(value),
            Rule::Different(other) => data.get(other) != Some(value),
        }
    }
}

fn parse_usize(rule: &str, raw: &str) -> Result<usize, RuleParseError> {
    raw.trim()
        .parse()
        .map_err(|_| RuleParseError::new(rule, format!("'{}' is not a length", raw.trim())))
}

fn parse_f64(rule: &str, raw: &str) -> Result<f64, RuleParseError> {
    raw.trim()
        .parse()
        .map_err(|_| RuleParseError::new(rule, format!("'{}' is not a number", raw.trim())))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Text form of a string or number; `None` for anything else.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn text_all(value: &Value, pred: impl Fn(char) -> bool) -> bool {
    scalar_text(value).is_some_and(|s| s.chars().all(pred))
}

fn measure(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Number(n) => Some(n.to_string().chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn magnitude(value: &Value) -> Option<f64> {
    as_f64(value).or_else(|| measure(value).map(|len| len as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(rule: &str, value: Value) -> bool {
        Rule::parse(rule).unwrap().check(Some(&value), &Map::new())
    }

    #[test]
    fn require_rejects_empty_values() {
        let rule = Rule::Require;
        let data = Map::new();
        assert!(!rule.check(None, &data));
        assert!(!rule.check(Some(&json!(null)), &data));
        assert!(!rule.check(Some(&json!("")), &data));
        assert!(!rule.check(Some(&json!([])), &data));
        assert!(rule.check(Some(&json!("0")), &data));
        assert!(rule.check(Some(&json!(0)), &data));
        assert!(rule.check(Some(&json!(false)), &data));
    }

    #[test]
    fn optional_rules_skip_absent_values() {
        let rule = Rule::parse("integer").unwrap();
        assert!(rule.check(None, &Map::new()));
        assert!(rule.check(Some(&json!("")), &Map::new()));
    }

    #[test]
    fn numeric_rules_accept_strings() {
        assert!(check("integer", json!("42")));
        assert!(check("integer", json!(42)));
        assert!(!check("integer", json!("4.2")));
        assert!(check("number", json!("4.2")));
        assert!(!check("number", json!("abc")));
        assert!(check("between:1,10", json!("5")));
        assert!(!check("between:1,10", json!(11)));
    }

    #[test]
    fn max_and_min_fall_back_to_length() {
        assert!(check("max:3", json!("abc")));
        assert!(!check("max:3", json!("abcd")));
        assert!(check("min:10", json!(10)));
        assert!(!check("min:10", json!(9)));
    }

    #[test]
    fn character_class_rules() {
        assert!(check("alpha", json!("abc")));
        assert!(!check("alpha", json!("ab1")));
        assert!(check("alphaNum", json!("ab1")));
        assert!(check("alphaDash", json!("a_b-1")));
        assert!(!check("alphaDash", json!("a b")));
        assert!(check("email", json!("ops@example.com")));
        assert!(!check("email", json!("ops@")));
    }

    #[test]
    fn list_rules() {
        assert!(check("in:a, b ,c", json!("b")));
        assert!(!check("in:a,b", json!("z")));
        assert!(check("notIn:a,b", json!("z")));
        assert!(check("in:1,2", json!(2)));
    }

    #[test]
    fn cross_field_rules_read_the_whole_input() {
        let mut data = Map::new();
        data.insert("password".to_string(), json!("s3cret"));

        let confirm = Rule::parse("confirm:password").unwrap();
        assert!(confirm.check(Some(&json!("s3cret")), &data));
        assert!(!confirm.check(Some(&json!("other")), &data));

        let different = Rule::parse("different:password").unwrap();
        assert!(different.check(Some(&json!("other")), &data));
    }

    #[test]
    fn regex_keeps_pipes_in_pattern() {
        let rules = Rule::parse_list("require|regex:^(a|b)$").unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[1].check(Some(&json!("b")), &Map::new()));
        assert!(!rules[1].check(Some(&json!("c")), &Map::new()));
    }

    #[test]
    fn parse_rejects_bad_rules() {
        assert!(Rule::parse("frobnicate").is_err());
        assert!(Rule::parse("length:abc").is_err());
        assert!(Rule::parse("length:5,1").is_err());
        assert!(Rule::parse("between:1").is_err());
        assert!(Rule::parse("regex:(").is_err());
        assert!(Rule::parse("require:1").is_err());
    }

    #[test]
    fn length_accepts_exact_form() {
        let rule = Rule::parse("length:3").unwrap();
        assert_eq!(rule.default_message(), "length must be 3");
        assert!(rule.check(Some(&json!("abc")), &Map::new()));
        assert!(!rule.check(Some(&json!("ab")), &Map::new()));
    }

    #[test]
    fn default_message_for_require_is_required() {
        assert_eq!(Rule::Require.default_message(), "required");
    }
}

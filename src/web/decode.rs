//! Input decoding.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::DecodeError;

// A tag opens at `<` followed by anything but whitespace.
static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:>|[^\s>][^>]*(?:>|$))").expect("static pattern"));

/// Produces the decoded input mapping for a request.
///
/// A body that is not blank is URL-decoded (`+` is a space) and parsed as a
/// JSON object.
/// Otherwise the ordinary parameters are used, with HTML tags removed from
/// their string values when `strip` is set.
///
/// # Errors
///
/// Returns [`DecodeError`] when a non-blank body is not UTF-8 after
/// percent-decoding, is not JSON, or is JSON but not an object.
///
/// # Examples
///
/// ```
/// use gateway_pipeline::web::decode_input;
/// use serde_json::Map;
///
/// let input = decode_input(b"%7B%22auth_id%22%3A%22svc-1%22%7D", &Map::new(), true).unwrap();
/// assert_eq!(input["auth_id"], "svc-1");
///
/// assert!(decode_input(b"[1,2]", &Map::new(), true).is_err());
/// ```
pub fn decode_input(
    body: &[u8],
    params: &Map<String, Value>,
    strip: bool,
) -> Result<Map<String, Value>, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        let mut input = params.clone();
        if strip {
            input.values_mut().for_each(strip_value);
        }
        return Ok(input);
    }

    let spaced: Vec<u8> = body
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    let decoded = urlencoding::decode_binary(&spaced);
    let text = std::str::from_utf8(&decoded).map_err(|_| DecodeError::Encoding)?;

    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

/// Removes HTML and PHP-style tags from `text`. A `<` followed by whitespace
/// is text, not a tag. An unterminated tag runs to the end of the string.
///
/// # Examples
///
/// ```
/// use gateway_pipeline::web::strip_tags;
///
/// assert_eq!(strip_tags("<b>bold</b> move"), "bold move");
/// assert_eq!(strip_tags("1 < 2"), "1 < 2");
/// ```
pub fn strip_tags(text: &str) -> String {
    TAG.replace_all(text, "").into_owned()
}

fn strip_value(value: &mut Value) {
    match value {
        Value::String(s) if s.contains('<') => *s = strip_tags(s),
        Value::Array(items) => items.iter_mut().for_each(strip_value),
        Value::Object(map) => map.values_mut().for_each(strip_value),
        _ => {}
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

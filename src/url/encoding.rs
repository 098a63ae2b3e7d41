//! Percent-encoding helpers for URL components.
//!
//! # Responsibilities
//! - Encode single path/query components the way browsers expect
//! - Decode raw paths and query strings back into plain text
//! - Escape dashes inside array elements joined into one path segment
//!
//! # Design Decisions
//! - Built on `url::form_urlencoded` so there is a single escaping table
//! - `~` stays literal: it is the escape character of the string codec

use std::collections::BTreeMap;

use serde_json::Value;
use ::url::form_urlencoded;

/// Escaped form of a literal dash inside an array element (`\-`).
const ESCAPED_DASH: &str = "%5C%2D";

/// Percent-encode one URL component.
///
/// Alphanumerics and `*-._~` pass through; spaces become `%20`.
pub fn encode_uri_component(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace("%7E", "~")
}

/// Decode one percent-encoded component.
///
/// A literal `+` is kept as-is; only `%XX` sequences are decoded.
pub fn decode_uri_component(encoded: &str) -> String {
    if encoded.is_empty() {
        return String::new();
    }
    // Shield characters form_urlencoded treats as structure.
    let shielded = encoded
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");
    form_urlencoded::parse(shielded.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Encode an array element for a dash-joined path segment.
pub fn escape_dashes(element: &str) -> String {
    encode_uri_component(element).replace('-', ESCAPED_DASH)
}

/// Split a decoded dash-joined path segment into its elements.
///
/// Dashes preceded by a backslash are literal and are unescaped.
pub fn split_dashes(segment: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'-') => {
                chars.next();
                current.push('-');
            }
            '-' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

/// Parse a raw query string into search values.
///
/// A key seen once maps to a string, a repeated key to an array of strings.
pub fn parse_query(query: &str) -> BTreeMap<String, Value> {
    let mut values: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
        let value = Value::String(value.into_owned());
        match values.get_mut(key.as_ref()) {
            None => {
                values.insert(key.into_owned(), value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_uri_component("bob"), "bob");
        assert_eq!(encode_uri_component("a b"), "a%20b");
        assert_eq!(encode_uri_component("a/b"), "a%2Fb");
        assert_eq!(encode_uri_component("a~2Fb"), "a~2Fb");
        assert_eq!(encode_uri_component("1+1"), "1%2B1");
    }

    #[test]
    fn test_decode_component() {
        assert_eq!(decode_uri_component("a%20b"), "a b");
        assert_eq!(decode_uri_component("a+b"), "a+b");
        assert_eq!(decode_uri_component("x=1&y"), "x=1&y");
        assert_eq!(decode_uri_component(""), "");
        assert_eq!(decode_uri_component(&encode_uri_component("ü/ß?")), "ü/ß?");
    }

    #[test]
    fn test_dash_escaping() {
        let joined = ["a-b", "c"]
            .iter()
            .map(|e| escape_dashes(e))
            .collect::<Vec<_>>()
            .join("-");
        assert_eq!(joined, "a%5C%2Db-c");
        let decoded = decode_uri_component(&joined);
        assert_eq!(decoded, "a\\-b-c");
        assert_eq!(split_dashes(&decoded), vec!["a-b", "c"]);
    }

    #[test]
    fn test_parse_query_repeated_keys() {
        let values = parse_query("?tab=posts&id=1&id=2");
        assert_eq!(values["tab"], Value::String("posts".into()));
        assert_eq!(values["id"], serde_json::json!(["1", "2"]));
    }
}

//! Parameter types: the codecs behind every URL parameter.
//!
//! # Responsibilities
//! - Define the `ParamType` codec (pattern, is, encode, decode, equals)
//! - Provide the built-in types (string, path, int, bool, date, json, any)
//! - Lift any scalar type over sequences (`Codec` with an `ArrayMode`)
//!
//! # Design Decisions
//! - Values are `serde_json::Value`; "no value" is `None`, never `Null`
//! - A type's pattern is matched against its own encoding, unanchored
//! - Array lifting wraps and unwraps: `auto` yields a scalar for one element

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::url::error::{PatternError, PatternResult};

pub type IsFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type EncodeFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;
pub type DecodeFn = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;
pub type EqualsFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

lazy_static! {
    static ref STRING_ESCAPES: Regex = Regex::new(r"~~|~2F").expect("valid regex");
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Textual form of a value, as handed to `decode`.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A scalar parameter codec.
#[derive(Clone)]
pub struct ParamType {
    name: String,
    pattern: Regex,
    anchored: Regex,
    is: IsFn,
    encode: EncodeFn,
    decode: DecodeFn,
    equals: EqualsFn,
    slash_safe: bool,
}

impl ParamType {
    /// Create a type with the default behaviour: every value is accepted,
    /// values encode to their text and decode to strings, equality is `==`.
    pub fn new(name: impl Into<String>, pattern: &str) -> PatternResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_regex(name, pattern)
    }

    fn from_regex(name: impl Into<String>, pattern: Regex) -> PatternResult<Self> {
        Ok(Self {
            name: name.into(),
            anchored: anchor(&pattern)?,
            pattern,
            is: Arc::new(|_| true),
            encode: Arc::new(value_text),
            decode: Arc::new(|raw| Some(Value::String(raw.to_string()))),
            equals: Arc::new(|a, b| a == b),
            slash_safe: false,
        })
    }

    /// Replace the membership test.
    pub fn with_is(mut self, is: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.is = Arc::new(is);
        self
    }

    /// Replace the encoder.
    pub fn with_encode(mut self, encode: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.encode = Arc::new(encode);
        self
    }

    /// Replace the decoder.
    pub fn with_decode(
        mut self,
        decode: impl Fn(&str) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.decode = Arc::new(decode);
        self
    }

    /// Replace the equality test.
    pub fn with_equals(
        mut self,
        equals: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equals = Arc::new(equals);
        self
    }

    /// Derive a type that shares this codec but matches a different pattern.
    pub(crate) fn with_pattern(&self, name: impl Into<String>, pattern: Regex) -> PatternResult<Self> {
        Ok(Self {
            name: name.into(),
            anchored: anchor(&pattern)?,
            pattern,
            ..self.clone()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// True when the whole of `encoded` matches the pattern.
    pub fn matches(&self, encoded: &str) -> bool {
        self.anchored.is_match(encoded)
    }

    /// True when encoded values may contain literal slashes (catch-all paths).
    pub fn is_slash_safe(&self) -> bool {
        self.slash_safe
    }

    pub fn is(&self, value: &Value) -> bool {
        (self.is)(value)
    }

    pub fn encode(&self, value: &Value) -> String {
        (self.encode)(value)
    }

    pub fn decode(&self, raw: &str) -> Option<Value> {
        (self.decode)(raw)
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        (self.equals)(a, b)
    }

    /// Values of this type pass through; anything else is decoded from its text.
    pub fn normalize(&self, value: &Value) -> Option<Value> {
        if self.is(value) {
            Some(value.clone())
        } else {
            self.decode(&value_text(value))
        }
    }

    /// Lift this type over sequences.
    ///
    /// `auto` unwraps single-element sequences and is only legal in the query
    /// string.
    pub fn as_array(self: &Arc<Self>, mode: ArrayMode, is_search: bool) -> PatternResult<Codec> {
        if mode == ArrayMode::Auto && !is_search {
            return Err(PatternError::AutoArrayOutsideQuery(self.name.clone()));
        }
        Ok(Codec {
            element: self.clone(),
            array: mode,
        })
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamType")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// How a parameter treats sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ArrayModeRepr", into = "ArrayModeRepr")]
pub enum ArrayMode {
    /// Scalar values only.
    Off,
    /// Always a sequence.
    On,
    /// One occurrence is a scalar, several are a sequence (query only).
    Auto,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ArrayModeRepr {
    Flag(bool),
    Mode(String),
}

impl TryFrom<ArrayModeRepr> for ArrayMode {
    type Error = String;

    fn try_from(repr: ArrayModeRepr) -> Result<Self, Self::Error> {
        match repr {
            ArrayModeRepr::Flag(true) => Ok(ArrayMode::On),
            ArrayModeRepr::Flag(false) => Ok(ArrayMode::Off),
            ArrayModeRepr::Mode(mode) if mode == "auto" => Ok(ArrayMode::Auto),
            ArrayModeRepr::Mode(mode) => Err(format!(
                "invalid array mode '{mode}', expected true, false or \"auto\""
            )),
        }
    }
}

impl From<ArrayMode> for ArrayModeRepr {
    fn from(mode: ArrayMode) -> Self {
        match mode {
            ArrayMode::Off => ArrayModeRepr::Flag(false),
            ArrayMode::On => ArrayModeRepr::Flag(true),
            ArrayMode::Auto => ArrayModeRepr::Mode("auto".into()),
        }
    }
}

/// A parameter's effective codec: a scalar type, possibly lifted over sequences.
#[derive(Clone, Debug)]
pub struct Codec {
    element: Arc<ParamType>,
    array: ArrayMode,
}

impl Codec {
    pub fn scalar(element: Arc<ParamType>) -> Self {
        Self {
            element,
            array: ArrayMode::Off,
        }
    }

    pub fn element(&self) -> &Arc<ParamType> {
        &self.element
    }

    pub fn array_mode(&self) -> ArrayMode {
        self.array
    }

    pub fn is_array(&self) -> bool {
        self.array != ArrayMode::Off
    }

    /// Type name; lifted types carry a `[]` suffix.
    pub fn name(&self) -> String {
        if self.is_array() {
            format!("{}[]", self.element.name())
        } else {
            self.element.name().to_string()
        }
    }

    pub fn pattern(&self) -> &Regex {
        self.element.pattern()
    }

    pub fn is(&self, value: &Value) -> bool {
        if !self.is_array() {
            return self.element.is(value);
        }
        wrap(value).iter().all(|v| self.element.is(v))
    }

    /// Encode a value. Sequences encode to an array of strings.
    pub fn encode(&self, value: &Value) -> Option<Value> {
        if !self.is_array() {
            return Some(Value::String(self.element.encode(value)));
        }
        let items = wrap(value)
            .iter()
            .map(|v| Value::String(self.element.encode(v)))
            .collect();
        self.unwrap(items)
    }

    /// Decode raw text (or an array of raw texts).
    pub fn decode(&self, raw: &Value) -> Option<Value> {
        if !self.is_array() {
            return self.element.decode(&value_text(raw));
        }
        let items = wrap(raw)
            .iter()
            .map(|v| self.element.decode(&value_text(v)))
            .collect::<Option<Vec<_>>>()?;
        self.unwrap(items)
    }

    pub fn normalize(&self, value: &Value) -> Option<Value> {
        if !self.is_array() {
            return self.element.normalize(value);
        }
        let items = wrap(value)
            .iter()
            .map(|v| self.element.normalize(v))
            .collect::<Option<Vec<_>>>()?;
        self.unwrap(items)
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        if !self.is_array() {
            return self.element.equals(a, b);
        }
        let (left, right) = (wrap(a), wrap(b));
        left.len() == right.len()
            && left
                .iter()
                .zip(right.iter())
                .all(|(l, r)| self.element.equals(l, r))
    }

    fn unwrap(&self, mut items: Vec<Value>) -> Option<Value> {
        match items.len() {
            0 => None,
            1 if self.array == ArrayMode::Auto => items.pop(),
            _ => Some(Value::Array(items)),
        }
    }
}

fn wrap(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn anchor(pattern: &Regex) -> PatternResult<Regex> {
    let source = format!("^(?:{})$", pattern.as_str());
    Regex::new(&source).map_err(|e| PatternError::InvalidRegex {
        pattern: source,
        reason: e.to_string(),
    })
}

fn builtin_type(name: &str, pattern: &str) -> ParamType {
    ParamType::new(name, pattern).expect("valid regex")
}

fn string_type() -> ParamType {
    builtin_type("string", r"[^/]*")
        .with_is(|v| v.is_string())
        .with_encode(|v| {
            value_text(v).replace('~', "~~").replace('/', "~2F")
        })
        .with_decode(|raw| {
            let text = STRING_ESCAPES.replace_all(raw, |caps: &regex::Captures<'_>| {
                if &caps[0] == "~~" { "~" } else { "/" }
            });
            Some(Value::String(text.into_owned()))
        })
}

fn path_type() -> ParamType {
    let mut path = builtin_type("path", r"(?s:.*)")
        .with_is(|v| v.is_string());
    path.slash_safe = true;
    path
}

fn int_type() -> ParamType {
    builtin_type("int", r"\d+")
        .with_is(|v| v.is_i64() || v.is_u64())
        .with_decode(|raw| raw.parse::<i64>().ok().map(Value::from))
}

fn bool_type() -> ParamType {
    builtin_type("bool", r"0|1")
        .with_is(|v| v.is_boolean())
        .with_encode(|v| {
            let flag = if v.as_bool() == Some(true) { "1" } else { "0" };
            flag.to_string()
        })
        .with_decode(|raw| raw.parse::<i64>().ok().map(|n| Value::Bool(n != 0)))
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?;
    let date = NaiveDate::parse_from_str(text, DATE_FORMAT).ok()?;
    // Strict: "2024-1-5" parses but is not the canonical form.
    (date.format(DATE_FORMAT).to_string() == text).then_some(date)
}

fn date_type() -> ParamType {
    builtin_type("date", r"[0-9]{4}-(?:0[1-9]|1[0-2])-[0-9]{2}")
    .with_is(|v| parse_date(v).is_some())
    .with_decode(|raw| {
        let value = Value::String(raw.to_string());
        parse_date(&value).map(|_| value)
    })
    .with_equals(|a, b| match (parse_date(a), parse_date(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    })
}

fn json_type() -> ParamType {
    builtin_type("json", r"[^/]*")
        .with_is(|v| v.is_object())
        .with_encode(|v| v.to_string())
        .with_decode(|raw| serde_json::from_str::<Value>(raw).ok())
}

fn any_type() -> ParamType {
    builtin_type("any", r"(?s:.*)")
}

/// The types every matcher factory starts with.
pub fn builtin_types() -> HashMap<String, Arc<ParamType>> {
    [
        string_type(),
        path_type(),
        int_type(),
        bool_type(),
        date_type(),
        json_type(),
        any_type(),
    ]
    .into_iter()
    .map(|t| (t.name().to_string(), Arc::new(t)))
    .collect()
}

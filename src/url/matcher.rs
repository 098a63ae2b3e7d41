//! URL pattern compilation, matching and formatting.
//!
//! # Responsibilities
//! - Compile `:name`, `*name`, `{name}` and `{name:pattern}` placeholders
//! - Match a path (plus parsed query) into typed parameter values
//! - Format parameter values back into a URL
//! - Concatenate a child pattern onto a parent matcher
//!
//! # Design Decisions
//! - One capture group per path parameter; anything else fails compilation
//! - Search parameters never take part in the regex
//! - Parameters inherited through `concat` are the parent's own `Arc<Param>`

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::{Captures, Regex, RegexBuilder};
use serde_json::Value;

use crate::url::encoding::{
    decode_uri_component, encode_uri_component, escape_dashes, parse_query, split_dashes,
};
use crate::url::error::{PatternError, PatternResult};
use crate::url::factory::UrlMatcherFactory;
use crate::url::param::{Location, Param, ParamDeclaration, ParamSet, Params, Squash};
use crate::url::types::{ArrayMode, ParamType};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(
        r"([:*])([\w\[\]]+)|\{([\w\[\]]+)(?::\s*((?:[^{}\\]+|\\.|\{(?:[^{}\\]+|\\.)*\})+))?\}"
    )
    .expect("valid regex");
    static ref SEARCH_PLACEHOLDER: Regex = Regex::new(
        r"([:]?)([\w\[\].-]+)|\{([\w\[\].-]+)(?::\s*((?:[^{}\\]+|\\.|\{(?:[^{}\\]+|\\.)*\})+))?\}"
    )
    .expect("valid regex");
    static ref PARAM_NAME: Regex = Regex::new(r"^\w+([-.]+\w+)*(?:\[\])?$").expect("valid regex");
}

/// Per-pattern compile options.
#[derive(Debug, Clone, Default)]
pub struct MatcherConfig {
    /// Parameter declarations by id.
    pub params: HashMap<String, ParamDeclaration>,
    /// Falls back to the parent matcher, then the factory setting.
    pub case_insensitive: Option<bool>,
    /// Falls back to the parent matcher, then the factory setting.
    pub strict: Option<bool>,
}

impl MatcherConfig {
    pub fn with_param(mut self, id: impl Into<String>, declaration: impl Into<ParamDeclaration>) -> Self {
        self.params.insert(id.into(), declaration.into());
        self
    }
}

/// A compiled URL pattern.
pub struct UrlMatcher {
    source: String,
    source_path: String,
    source_search: String,
    segments: Vec<String>,
    regex: Regex,
    params: ParamSet,
    path_params: Vec<Arc<Param>>,
    search_params: Vec<Arc<Param>>,
    own: Vec<Arc<Param>>,
    case_insensitive: bool,
    strict: bool,
}

struct Placeholder<'a> {
    id: &'a str,
    segment: &'a str,
    inline: Option<Arc<ParamType>>,
}

struct Builder<'a> {
    pattern: &'a str,
    config: &'a MatcherConfig,
    parent: Option<&'a UrlMatcher>,
    factory: &'a UrlMatcherFactory,
    params: ParamSet,
    own: Vec<Arc<Param>>,
}

impl<'a> Builder<'a> {
    fn placeholder(&self, caps: &Captures<'a>, last: usize, is_search: bool, source: &'a str) -> PatternResult<Placeholder<'a>> {
        let (start, id) = match (caps.get(0), caps.get(2).or_else(|| caps.get(3))) {
            (Some(whole), Some(id)) => (whole.start(), id.as_str()),
            _ => {
                return Err(PatternError::InvalidParamName {
                    name: String::new(),
                    pattern: self.pattern.to_string(),
                })
            }
        };
        let is_catch_all = !is_search && caps.get(1).map(|m| m.as_str()) == Some("*");

        let inline = match caps.get(4).map(|m| m.as_str()) {
            Some(regexp) => Some(self.inline_type(regexp)?),
            None if is_catch_all => self.factory.get_type("path"),
            None => None,
        };

        Ok(Placeholder {
            id,
            segment: &source[last..start],
            inline,
        })
    }

    /// A registered type name, or a string type restricted to the pattern.
    fn inline_type(&self, regexp: &str) -> PatternResult<Arc<ParamType>> {
        if let Some(registered) = self.factory.get_type(regexp) {
            return Ok(registered);
        }
        let pattern = Regex::new(regexp).map_err(|e| PatternError::InvalidRegex {
            pattern: regexp.to_string(),
            reason: e.to_string(),
        })?;
        let string = self
            .factory
            .get_type("string")
            .ok_or_else(|| PatternError::UnknownType("string".into()))?;
        Ok(Arc::new(string.with_pattern("string", pattern)?))
    }

    fn add_parameter(&mut self, placeholder: Placeholder<'_>, location: Location) -> PatternResult<Arc<Param>> {
        if let Some(inherited) = self.parent.and_then(|p| p.params.get(placeholder.id)) {
            let inherited = inherited.clone();
            self.params.insert(inherited.clone());
            return Ok(inherited);
        }
        if !PARAM_NAME.is_match(placeholder.id) {
            return Err(PatternError::InvalidParamName {
                name: placeholder.id.to_string(),
                pattern: self.pattern.to_string(),
            });
        }
        if self.own.iter().any(|p| p.id() == placeholder.id) {
            return Err(PatternError::DuplicateParam {
                name: placeholder.id.to_string(),
                pattern: self.pattern.to_string(),
            });
        }
        let param = Arc::new(Param::new(
            placeholder.id,
            placeholder.inline,
            self.config.params.get(placeholder.id),
            location,
            self.factory,
        )?);
        self.params.insert(param.clone());
        self.own.push(param.clone());
        Ok(param)
    }
}

/// Regex fragment for one path parameter, preceded by its literal segment.
fn quote_regex(segment: &str, param: &Param) -> String {
    let element = param.codec().pattern().as_str();
    let pattern = if param.array_mode() == ArrayMode::On {
        format!("(?:{element})(?:-(?:{element}))*")
    } else {
        format!("(?:{element})")
    };
    let literal = regex::escape(segment);

    match param.squash() {
        Squash::Keep => {
            let optional = if param.is_optional() { "?" } else { "" };
            format!("{literal}({pattern}){optional}")
        }
        Squash::Omit => {
            let literal = literal.strip_suffix('/').unwrap_or(literal.as_str());
            format!("{literal}(?:/({pattern})|/)?")
        }
        Squash::Replace(marker) => {
            format!("{literal}({}|{pattern})?", regex::escape(marker))
        }
    }
}

impl UrlMatcher {
    pub(crate) fn new(
        pattern: &str,
        config: &MatcherConfig,
        parent: Option<&UrlMatcher>,
        factory: &UrlMatcherFactory,
    ) -> PatternResult<Self> {
        let case_insensitive = config
            .case_insensitive
            .or(parent.map(|p| p.case_insensitive))
            .unwrap_or(factory.settings().case_insensitive);
        let strict = config
            .strict
            .or(parent.map(|p| p.strict))
            .unwrap_or(factory.settings().strict_mode);

        let mut builder = Builder {
            pattern,
            config,
            parent,
            factory,
            params: ParamSet::new(),
            own: Vec::new(),
        };
        let mut compiled = String::from("^");
        let mut segments = Vec::new();
        let mut path_params = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(pattern) {
            let placeholder = builder.placeholder(&caps, last, false, pattern)?;
            if placeholder.segment.contains('?') {
                break;
            }
            let end = caps.get(0).map_or(last, |m| m.end());
            let segment = placeholder.segment.to_string();
            let param = builder.add_parameter(placeholder, Location::Path)?;
            compiled.push_str(&quote_regex(&segment, &param));
            segments.push(segment);
            path_params.push(param);
            last = end;
        }

        let rest = &pattern[last..];
        let (tail, source_path, source_search) = match rest.find('?') {
            Some(i) => (&rest[..i], &pattern[..last + i], &rest[i..]),
            None => (rest, pattern, ""),
        };

        let mut search_params = Vec::new();
        let mut search_last = 0;
        for caps in SEARCH_PLACEHOLDER.captures_iter(source_search) {
            let placeholder = builder.placeholder(&caps, search_last, true, source_search)?;
            search_last = caps.get(0).map_or(search_last, |m| m.end());
            search_params.push(builder.add_parameter(placeholder, Location::Search)?);
        }

        compiled.push_str(&regex::escape(tail));
        if !strict {
            compiled.push_str("/?");
        }
        compiled.push('$');
        segments.push(tail.to_string());

        let regex = RegexBuilder::new(&compiled)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        let found = regex.captures_len() - 1;
        if found != path_params.len() {
            return Err(PatternError::UnbalancedCaptures {
                pattern: pattern.to_string(),
                expected: path_params.len(),
                found,
            });
        }

        Ok(Self {
            source: pattern.to_string(),
            source_path: source_path.to_string(),
            source_search: source_search.to_string(),
            segments,
            regex,
            params: builder.params,
            path_params,
            search_params,
            own: builder.own,
            case_insensitive,
            strict,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn source_search(&self) -> &str {
        &self.source_search
    }

    /// Literal text before the first placeholder.
    pub fn prefix(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Every parameter, path parameters first.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Parameters declared by this pattern rather than inherited through `concat`.
    pub fn own_params(&self) -> &[Arc<Param>] {
        &self.own
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.keys()
    }

    /// Compile `source_path + pattern + source_search` as a child of this matcher.
    pub fn concat(
        &self,
        factory: &UrlMatcherFactory,
        pattern: &str,
        config: &MatcherConfig,
    ) -> PatternResult<UrlMatcher> {
        let joined = format!("{}{}{}", self.source_path, pattern, self.source_search);
        UrlMatcher::new(&joined, config, Some(self), factory)
    }

    /// Match a decoded path plus parsed query values.
    pub fn exec(&self, path: &str, search: &Params) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let mut values = Params::new();

        for (i, param) in self.path_params.iter().enumerate() {
            let raw = caps.get(i + 1).map(|m| Value::String(m.as_str().to_string()));
            let decoded = param.apply_replace(raw).and_then(|value| {
                let value = match (&value, param.array_mode()) {
                    (Value::String(joined), ArrayMode::On) => {
                        Value::Array(split_dashes(joined).into_iter().map(Value::String).collect())
                    }
                    _ => value,
                };
                param.codec().decode(&value)
            });
            if let Some(value) = param.value(decoded.as_ref()) {
                values.insert(param.id().to_string(), value);
            }
        }

        for param in &self.search_params {
            let decoded = param
                .apply_replace(search.get(param.id()).cloned())
                .and_then(|value| param.codec().decode(&value));
            if let Some(value) = param.value(decoded.as_ref()) {
                values.insert(param.id().to_string(), value);
            }
        }

        Some(values)
    }

    /// Match a raw URL: percent-decodes the path and parses the query string.
    pub fn exec_url(&self, url: &str) -> Option<Params> {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        self.exec(&decode_uri_component(path), &parse_query(query))
    }

    pub fn validates(&self, values: &Params) -> bool {
        self.params.validates(values)
    }

    /// Format values into a URL; `None` when they do not validate.
    pub fn format(&self, values: &Params) -> Option<String> {
        if !self.validates(values) {
            return None;
        }

        let mut result = self.prefix().to_string();
        let path_count = self.path_params.len();

        for (i, param) in self.path_params.iter().enumerate() {
            let value = param.value(values.get(param.id()));
            let is_default = param.is_default(value.as_ref());
            let next = self.segments.get(i + 1).map(String::as_str).unwrap_or("");

            match (is_default, param.squash()) {
                (true, Squash::Omit) => {
                    let next = if result.ends_with('/') {
                        next.strip_prefix('/').unwrap_or(next)
                    } else {
                        next
                    };
                    result.push_str(next);
                }
                (true, Squash::Replace(marker)) => {
                    result.push_str(marker);
                    result.push_str(next);
                }
                _ => {
                    if let Some(encoded) = value.as_ref().and_then(|v| param.codec().encode(v)) {
                        result.push_str(&encode_path_value(&encoded, param));
                    }
                    result.push_str(next);
                }
            }

            let is_final = i + 1 == path_count;
            if is_final && *param.squash() == Squash::Omit && result.len() > 1 && result.ends_with('/') {
                result.pop();
            }
        }

        let mut separator = '?';
        for param in &self.search_params {
            let value = param.value(values.get(param.id()));
            let is_default = param.is_default(value.as_ref());
            if is_default && *param.squash() != Squash::Keep {
                continue;
            }
            let items = match value.as_ref().and_then(|v| param.codec().encode(v)) {
                Some(Value::Array(items)) => items,
                Some(single) => vec![single],
                None => continue,
            };
            for item in items {
                let text = item.as_str().unwrap_or_default();
                result.push(separator);
                result.push_str(param.id());
                result.push('=');
                result.push_str(&encode_uri_component(text));
                separator = '&';
            }
        }

        Some(result)
    }
}

fn encode_path_value(encoded: &Value, param: &Param) -> String {
    match encoded {
        Value::Array(items) => items
            .iter()
            .map(|item| escape_dashes(item.as_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("-"),
        Value::String(text) if param.codec().element().is_slash_safe() => text
            .split('/')
            .map(encode_uri_component)
            .collect::<Vec<_>>()
            .join("/"),
        Value::String(text) => encode_uri_component(text),
        other => encode_uri_component(&other.to_string()),
    }
}

impl fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlMatcher")
            .field("source", &self.source)
            .field("regex", &self.regex.as_str())
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::param::ParamConfig;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_round_trip_path_and_search() {
        let factory = UrlMatcherFactory::default();
        let matcher = factory.compile("/user/{id}?tab").unwrap();
        let values = params(&[("id", json!("bob")), ("tab", json!("posts"))]);

        let url = matcher.format(&values).unwrap();
        assert_eq!(url, "/user/bob?tab=posts");
        assert_eq!(matcher.exec_url(&url), Some(values));
    }

    #[test]
    fn test_segments_and_prefix() {
        let factory = UrlMatcherFactory::default();
        let matcher = factory.compile("/users/:id/details/{tab}?q").unwrap();
        assert_eq!(matcher.prefix(), "/users/");
        assert_eq!(matcher.segments(), &["/users/", "/details/", ""]);
        assert_eq!(matcher.param_names().collect::<Vec<_>>(), vec!["id", "tab", "q"]);
        assert_eq!(matcher.source_path(), "/users/:id/details/{tab}");
        assert_eq!(matcher.source_search(), "?q");
    }

    #[test]
    fn test_default_squash_round_trip() {
        let factory = UrlMatcherFactory::default();
        let config = MatcherConfig::default().with_param(
            "page",
            ParamConfig::default().with_default(json!(1)).with_squash(Squash::Omit),
        );
        let matcher = factory.compile_with("/items/{page:int}", &config).unwrap();

        assert_eq!(matcher.format(&params(&[("page", json!(1))])).as_deref(), Some("/items"));
        assert_eq!(matcher.format(&params(&[("page", json!(3))])).as_deref(), Some("/items/3"));
        assert_eq!(matcher.exec("/items", &Params::new()), Some(params(&[("page", json!(1))])));
        assert_eq!(matcher.exec("/items/", &Params::new()), Some(params(&[("page", json!(1))])));
        assert_eq!(matcher.exec("/items/7", &Params::new()), Some(params(&[("page", json!(7))])));
    }

    #[test]
    fn test_squash_literal() {
        let factory = UrlMatcherFactory::default();
        let config = MatcherConfig::default().with_param(
            "lang",
            ParamConfig::default()
                .with_default(json!("en"))
                .with_squash(Squash::Replace("~".into())),
        );
        let matcher = factory.compile_with("/{lang}/home", &config).unwrap();
        assert_eq!(matcher.format(&Params::new()).as_deref(), Some("/~/home"));
        assert_eq!(matcher.exec("/~/home", &Params::new()), Some(params(&[("lang", json!("en"))])));
        assert_eq!(matcher.exec("/fr/home", &Params::new()), Some(params(&[("lang", json!("fr"))])));
    }

    #[test]
    fn test_compile_errors() {
        let factory = UrlMatcherFactory::default();
        assert!(matches!(
            factory.compile("/a/:id/b/:id"),
            Err(PatternError::DuplicateParam { .. })
        ));
        assert!(matches!(
            factory.compile("/a/{id:(x|y)}"),
            Err(PatternError::UnbalancedCaptures { expected: 1, found: 2, .. })
        ));
        assert!(matches!(
            factory.compile("/a/{id:[}"),
            Err(PatternError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_catch_all_keeps_slashes() {
        let factory = UrlMatcherFactory::default();
        let matcher = factory.compile("/files/*rest").unwrap();
        assert_eq!(
            matcher.exec("/files/a/b/c.txt", &Params::new()),
            Some(params(&[("rest", json!("a/b/c.txt"))]))
        );
        assert_eq!(
            matcher.format(&params(&[("rest", json!("a/b c"))])).as_deref(),
            Some("/files/a/b%20c")
        );
    }

    #[test]
    fn test_string_slash_escaping() {
        let factory = UrlMatcherFactory::default();
        let matcher = factory.compile("/doc/{name}").unwrap();
        let url = matcher.format(&params(&[("name", json!("a/b"))])).unwrap();
        assert_eq!(url, "/doc/a~2Fb");
        assert_eq!(matcher.exec_url(&url), Some(params(&[("name", json!("a/b"))])));
    }

    #[test]
    fn test_path_array_dashes() {
        let factory = UrlMatcherFactory::default();
        let matcher = factory.compile("/tags/{tags[]}").unwrap();
        let values = params(&[("tags[]", json!(["a-b", "c"]))]);
        let url = matcher.format(&values).unwrap();
        assert_eq!(url, "/tags/a%5C%2Db-c");
        assert_eq!(matcher.exec_url(&url), Some(values));
    }

    #[test]
    fn test_search_arrays_repeat_key() {
        let factory = UrlMatcherFactory::default();
        let matcher = factory.compile("/list?{id:int}").unwrap();
        let url = matcher.format(&params(&[("id", json!([1, 2]))])).unwrap();
        assert_eq!(url, "/list?id=1&id=2");
        assert_eq!(matcher.exec_url(&url), Some(params(&[("id", json!([1, 2]))])));
        assert_eq!(matcher.exec_url("/list?id=5"), Some(params(&[("id", json!(5))])));
        assert_eq!(matcher.exec_url("/list"), Some(Params::new()));
    }

    #[test]
    fn test_format_rejects_invalid() {
        let factory = UrlMatcherFactory::default();
        let matcher = factory.compile("/n/{n:int}").unwrap();
        assert_eq!(matcher.format(&params(&[("n", json!("x"))])), None);
        assert_eq!(matcher.format(&Params::new()), None);
        assert!(matcher.exec("/n/abc", &Params::new()).is_none());
    }

    #[test]
    fn test_concat_reuses_parent_params() {
        let factory = UrlMatcherFactory::default();
        let parent = factory.compile("/user/{id}?tab").unwrap();
        let child = parent.concat(&factory, "/posts/{post:int}", &MatcherConfig::default()).unwrap();

        assert_eq!(child.source(), "/user/{id}/posts/{post:int}?tab");
        assert!(Arc::ptr_eq(child.params().get("id").unwrap(), parent.params().get("id").unwrap()));
        assert_eq!(child.own_params().len(), 1);
        assert_eq!(
            child.exec_url("/user/bob/posts/3?tab=x"),
            Some(params(&[("id", json!("bob")), ("post", json!(3)), ("tab", json!("x"))]))
        );
    }

    #[test]
    fn test_strict_and_case_settings() {
        let factory = UrlMatcherFactory::default();
        let config = MatcherConfig {
            strict: Some(false),
            case_insensitive: Some(true),
            ..MatcherConfig::default()
        };
        let matcher = factory.compile_with("/Home", &config).unwrap();
        assert!(matcher.exec("/home/", &Params::new()).is_some());

        let strict = factory.compile("/Home").unwrap();
        assert!(strict.exec("/Home/", &Params::new()).is_none());
        assert!(strict.exec("/home", &Params::new()).is_none());
    }
}

//! Parameters and parameter sets.
//!
//! # Responsibilities
//! - Build a `Param` from its declaration (type, default, array, squash, replace)
//! - Normalize raw values through replace → default → codec
//! - Bulk operations over a place's parameters (`ParamSet`)
//!
//! # Design Decisions
//! - Params are shared as `Arc<Param>` so a child's set reuses the parent's
//! - A `ParamSet` is an owned, ordered, flattened view computed once
//! - A parameter is optional iff a default is configured

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::url::error::{PatternError, PatternResult};
use crate::url::factory::UrlMatcherFactory;
use crate::url::types::{ArrayMode, Codec, ParamType};

/// Parameter values keyed by parameter id.
pub type Params = BTreeMap<String, Value>;

/// Where a parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Path,
    Search,
    /// Transition metadata that never appears in a URL.
    Config,
}

/// How a default-valued parameter is rendered in a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SquashRepr", into = "SquashRepr")]
pub enum Squash {
    /// Render the default like any other value (`false`).
    Keep,
    /// Omit the value and one adjacent slash (`true`).
    Omit,
    /// Render this literal instead of the value.
    Replace(String),
}

impl Default for Squash {
    fn default() -> Self {
        Squash::Keep
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SquashRepr {
    Flag(bool),
    Literal(String),
}

impl TryFrom<SquashRepr> for Squash {
    type Error = String;

    fn try_from(repr: SquashRepr) -> Result<Self, Self::Error> {
        match repr {
            SquashRepr::Flag(true) => Ok(Squash::Omit),
            SquashRepr::Flag(false) => Ok(Squash::Keep),
            SquashRepr::Literal(s) if s.contains('/') => {
                Err(format!("invalid squash policy '{s}': literal may not contain '/'"))
            }
            SquashRepr::Literal(s) => Ok(Squash::Replace(s)),
        }
    }
}

impl From<Squash> for SquashRepr {
    fn from(squash: Squash) -> Self {
        match squash {
            Squash::Keep => SquashRepr::Flag(false),
            Squash::Omit => SquashRepr::Flag(true),
            Squash::Replace(s) => SquashRepr::Literal(s),
        }
    }
}

/// A raw value substitution applied before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    pub from: Value,
    /// `None` means "no value".
    #[serde(default)]
    pub to: Option<Value>,
}

/// A parameter's default value.
#[derive(Clone)]
pub enum DefaultValue {
    Fixed(Value),
    /// Computed each time the default is needed.
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn computed(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        DefaultValue::Computed(Arc::new(f))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for DefaultValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(DefaultValue::Fixed)
    }
}

/// Full parameter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamConfig {
    /// Default value; its presence makes the parameter optional.
    #[serde(default)]
    pub value: Option<DefaultValue>,

    /// Registered type name.
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,

    /// Explicit type object; takes precedence over `type_name`.
    #[serde(skip)]
    pub param_type: Option<Arc<ParamType>>,

    #[serde(default)]
    pub array: Option<ArrayMode>,

    #[serde(default)]
    pub squash: Option<Squash>,

    #[serde(default)]
    pub replace: Option<Vec<Replacement>>,
}

impl ParamConfig {
    pub fn with_default(mut self, value: Value) -> Self {
        self.value = Some(DefaultValue::Fixed(value));
        self
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn with_array(mut self, mode: ArrayMode) -> Self {
        self.array = Some(mode);
        self
    }

    pub fn with_squash(mut self, squash: Squash) -> Self {
        self.squash = Some(squash);
        self
    }
}

/// A parameter declaration: a full config, or a bare default value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamDeclaration {
    Config(ParamConfig),
    Default(Value),
}

impl ParamDeclaration {
    fn to_config(&self) -> ParamConfig {
        match self {
            ParamDeclaration::Config(config) => config.clone(),
            ParamDeclaration::Default(value) => ParamConfig::default().with_default(value.clone()),
        }
    }
}

impl From<ParamConfig> for ParamDeclaration {
    fn from(config: ParamConfig) -> Self {
        ParamDeclaration::Config(config)
    }
}

impl From<Value> for ParamDeclaration {
    fn from(value: Value) -> Self {
        ParamDeclaration::Default(value)
    }
}

/// A typed URL or config parameter.
#[derive(Debug)]
pub struct Param {
    id: String,
    location: Location,
    codec: Codec,
    squash: Squash,
    replace: Vec<Replacement>,
    default: Option<DefaultValue>,
}

impl Param {
    /// Build a parameter.
    ///
    /// Type precedence: explicit config type, then the inline type from the
    /// pattern, then `string` (URL params) or `any` (config params).
    pub(crate) fn new(
        id: &str,
        inline: Option<Arc<ParamType>>,
        declaration: Option<&ParamDeclaration>,
        location: Location,
        factory: &UrlMatcherFactory,
    ) -> PatternResult<Self> {
        let config = declaration.map(ParamDeclaration::to_config).unwrap_or_default();
        let element = resolve_type(&config, inline, location, factory)?;

        let default_mode = if id.ends_with("[]") {
            ArrayMode::On
        } else if location == Location::Search {
            ArrayMode::Auto
        } else {
            ArrayMode::Off
        };
        let array = config.array.unwrap_or(default_mode);
        let codec = match array {
            ArrayMode::Off => Codec::scalar(element),
            mode => element
                .as_array(mode, location == Location::Search)
                .map_err(|_| PatternError::AutoArrayOutsideQuery(id.to_string()))?,
        };

        let default = config.value.clone();
        if let Some(DefaultValue::Fixed(value)) = &default {
            if !codec.is(value) {
                return Err(PatternError::InvalidDefault(id.to_string()));
            }
        }
        let is_optional = default.is_some();

        let squash = if is_optional {
            config
                .squash
                .clone()
                .unwrap_or_else(|| factory.settings().default_squash.clone())
        } else {
            Squash::Keep
        };
        let replace = replacements(&config, array != ArrayMode::Off, is_optional, &squash);

        Ok(Self {
            id: id.to_string(),
            location,
            codec,
            squash,
            replace,
            default,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn array_mode(&self) -> ArrayMode {
        self.codec.array_mode()
    }

    pub fn squash(&self) -> &Squash {
        &self.squash
    }

    pub fn replace(&self) -> &[Replacement] {
        &self.replace
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }

    /// The default value, computed if necessary.
    pub fn default_value(&self) -> Option<Value> {
        match self.default.as_ref()? {
            DefaultValue::Fixed(value) => Some(value.clone()),
            DefaultValue::Computed(compute) => {
                let value = compute();
                if self.codec.is(&value) {
                    Some(value)
                } else {
                    tracing::error!(param = %self.id, value = %value, "Computed default value is not valid for its type");
                    None
                }
            }
        }
    }

    /// Apply the first matching replacement to a raw value.
    pub(crate) fn apply_replace(&self, raw: Option<Value>) -> Option<Value> {
        if let Some(value) = &raw {
            if let Some(replacement) = self.replace.iter().find(|r| &r.from == value) {
                return replacement.to.clone();
            }
        }
        raw
    }

    /// Normalize a raw value: replace, fall back to the default, then decode.
    pub fn value(&self, raw: Option<&Value>) -> Option<Value> {
        match self.apply_replace(raw.cloned()) {
            None => self.default_value(),
            Some(value) => self.codec.normalize(&value),
        }
    }

    /// True when `value` (already normalized) equals this parameter's default.
    pub(crate) fn is_default(&self, value: Option<&Value>) -> bool {
        if !self.is_optional() {
            return false;
        }
        match (self.default_value(), value) {
            (Some(default), Some(value)) => self.codec.equals(&default, value),
            (None, None) => true,
            _ => false,
        }
    }

    /// Check one raw value against this parameter.
    fn validates(&self, raw: Option<&Value>) -> bool {
        let absent = raw.map_or(true, Value::is_null);
        if absent && (self.is_optional() || self.location == Location::Search) {
            return true;
        }
        let Some(normalized) = raw.and_then(|r| self.codec.normalize(r)) else {
            return false;
        };
        if !self.codec.is(&normalized) {
            return false;
        }
        let element = self.codec.element();
        match self.codec.encode(&normalized) {
            Some(Value::String(encoded)) => element.matches(&encoded),
            Some(Value::Array(items)) => items
                .iter()
                .all(|item| item.as_str().map_or(false, |s| element.matches(s))),
            _ => true,
        }
    }
}

fn resolve_type(
    config: &ParamConfig,
    inline: Option<Arc<ParamType>>,
    location: Location,
    factory: &UrlMatcherFactory,
) -> PatternResult<Arc<ParamType>> {
    if let Some(explicit) = &config.param_type {
        return Ok(explicit.clone());
    }
    if let Some(name) = &config.type_name {
        return factory
            .get_type(name)
            .ok_or_else(|| PatternError::UnknownType(name.clone()));
    }
    if let Some(inline) = inline {
        return Ok(inline);
    }
    let fallback = if location == Location::Config { "any" } else { "string" };
    factory
        .get_type(fallback)
        .ok_or_else(|| PatternError::UnknownType(fallback.to_string()))
}

fn replacements(
    config: &ParamConfig,
    is_array: bool,
    is_optional: bool,
    squash: &Squash,
) -> Vec<Replacement> {
    let to = if is_optional || is_array {
        None
    } else {
        Some(Value::String(String::new()))
    };
    let mut defaults = vec![
        Replacement {
            from: Value::String(String::new()),
            to: to.clone(),
        },
        Replacement {
            from: Value::Null,
            to,
        },
    ];
    if let Squash::Replace(literal) = squash {
        defaults.push(Replacement {
            from: Value::String(literal.clone()),
            to: None,
        });
    }

    let mut configured = config.replace.clone().unwrap_or_default();
    let extra: Vec<_> = defaults
        .into_iter()
        .filter(|d| !configured.iter().any(|c| c.from == d.from))
        .collect();
    configured.extend(extra);
    configured
}

/// An ordered set of parameters.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    params: Vec<Arc<Param>>,
    index: HashMap<String, usize>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; returns false if the id is already present.
    pub(crate) fn insert(&mut self, param: Arc<Param>) -> bool {
        if self.index.contains_key(param.id()) {
            return false;
        }
        self.index.insert(param.id().to_string(), self.params.len());
        self.params.push(param);
        true
    }

    /// A new set containing this set's parameters followed by `own`.
    pub fn extend_with(&self, own: impl IntoIterator<Item = Arc<Param>>) -> Self {
        let mut set = self.clone();
        for param in own {
            set.insert(param);
        }
        set
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Param>> {
        self.index.get(id).map(|&i| &self.params[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Param>> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Normalize every parameter's value; absent values are omitted.
    pub fn values(&self, raw: &Params) -> Params {
        self.params
            .iter()
            .filter_map(|p| p.value(raw.get(p.id())).map(|v| (p.id().to_string(), v)))
            .collect()
    }

    /// Compare two normalized value maps parameter by parameter.
    pub fn equals(&self, a: &Params, b: &Params) -> bool {
        self.params.iter().all(|p| match (a.get(p.id()), b.get(p.id())) {
            (None, None) => true,
            (Some(left), Some(right)) => p.codec().equals(left, right),
            _ => false,
        })
    }

    /// True when every parameter is satisfied by `raw`.
    pub fn validates(&self, raw: &Params) -> bool {
        self.params.iter().all(|p| p.validates(raw.get(p.id())))
    }

    /// Keep only the entries of `raw` that belong to this set.
    pub fn filter(&self, raw: &Params) -> Params {
        raw.iter()
            .filter(|(k, _)| self.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<Arc<Param>> for ParamSet {
    fn from_iter<I: IntoIterator<Item = Arc<Param>>>(iter: I) -> Self {
        ParamSet::new().extend_with(iter)
    }
}

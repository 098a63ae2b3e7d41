//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::place::{PlaceDefinition, ViewDeclaration};
use crate::resolve::{Invocable, Invocables};
use crate::transition::LocationMode;
use crate::url::{ParamDeclaration, Squash};

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// URL matcher factory settings.
    pub url: UrlConfig,

    /// Transition engine defaults.
    pub transitions: TransitionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Named values available to every resolution.
    pub services: BTreeMap<String, Value>,

    /// Statically declared places, registered in order.
    pub places: Vec<PlaceConfig>,
}

/// URL matcher factory settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UrlConfig {
    /// Compile patterns case-insensitively.
    pub case_insensitive: bool,

    /// When false, a trailing slash is tolerated when matching.
    pub strict_mode: bool,

    /// Squash policy for default-valued parameters that set none.
    pub default_squash: Squash,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            strict_mode: true,
            default_squash: Squash::Keep,
        }
    }
}

/// Transition engine defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// How successful transitions update the location by default.
    pub default_location: LocationMode,

    /// Whether observers are notified by default.
    pub notify: bool,

    /// Capacity of the router event broadcast channel.
    pub event_capacity: usize,

    /// Directory `template_url`s are read from. Inline templates only when unset.
    pub template_root: Option<PathBuf>,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            default_location: LocationMode::Push,
            notify: true,
            event_capacity: 64,
            template_root: None,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Record metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

/// A statically declared place.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceConfig {
    pub name: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,

    #[serde(default)]
    pub params: HashMap<String, ParamDeclaration>,

    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub template_url: Option<String>,

    #[serde(default)]
    pub views: BTreeMap<String, ViewConfig>,

    #[serde(default)]
    pub resolve: BTreeMap<String, ResolveConfig>,

    #[serde(default = "default_true")]
    pub reload_on_search: bool,
}

fn default_true() -> bool {
    true
}

/// A named view of a statically declared place.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub template: Option<String>,
    pub template_url: Option<String>,
    pub resolve: BTreeMap<String, ResolveConfig>,
}

/// A resolvable declared in configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResolveConfig {
    /// Looked up in the service registry.
    Service { service: String },
    /// A constant.
    Value { value: Value },
}

fn invocables(resolve: &BTreeMap<String, ResolveConfig>) -> Invocables {
    resolve
        .iter()
        .map(|(key, config)| {
            let invocable = match config {
                ResolveConfig::Service { service } => Invocable::by_name(service.clone()),
                ResolveConfig::Value { value } => Invocable::value(value.clone()),
            };
            (key.clone(), invocable)
        })
        .collect()
}

impl PlaceConfig {
    /// Convert into a definition ready for registration.
    pub fn to_definition(&self) -> PlaceDefinition {
        let mut definition = PlaceDefinition::new(self.name.clone()).reload_on_search(self.reload_on_search);
        definition.url = self.url.clone();
        definition.parent = self.parent.clone();
        definition.is_abstract = self.is_abstract;
        definition.params = self.params.clone();
        definition.data = self.data.clone();
        definition.template = self.template.clone();
        definition.template_url = self.template_url.clone();
        definition.resolve = invocables(&self.resolve);
        definition.views = self
            .views
            .iter()
            .map(|(name, view)| {
                let declaration = ViewDeclaration {
                    template: view.template.clone(),
                    template_url: view.template_url.clone(),
                    resolve: invocables(&view.resolve),
                };
                (name.clone(), declaration)
            })
            .collect();
        definition
    }
}

//! User-facing place declarations.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::resolve::{Invocable, Invocables, Values};
use crate::url::{ParamDeclaration, Params};

use super::place::Place;

/// Arguments handed to `on_enter` / `on_exit` hooks.
pub struct HookContext<'a> {
    pub place: &'a Place,
    pub params: &'a Params,
    /// The place's resolved values.
    pub values: &'a Values,
}

pub type Hook = Arc<dyn Fn(&HookContext<'_>) + Send + Sync>;

/// A named view of a place.
#[derive(Clone, Default)]
pub struct ViewDeclaration {
    pub template: Option<String>,
    pub template_url: Option<String>,
    pub resolve: Invocables,
}

impl ViewDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn template_url(mut self, url: impl Into<String>) -> Self {
        self.template_url = Some(url.into());
        self
    }

    pub fn resolve(mut self, key: impl Into<String>, invocable: Invocable) -> Self {
        self.resolve.insert(key.into(), invocable);
        self
    }
}

impl fmt::Debug for ViewDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewDeclaration")
            .field("template", &self.template)
            .field("template_url", &self.template_url)
            .field("resolve", &self.resolve.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Everything needed to register a place.
///
/// ```ignore
/// let def = PlaceDefinition::new("contacts.detail")
///     .url("/{id:int}")
///     .resolve("contact", Invocable::function(&["id"], load_contact));
/// ```
#[derive(Clone)]
pub struct PlaceDefinition {
    pub name: String,
    pub url: Option<String>,
    /// Defaults to the dotted prefix of `name`, or the root.
    pub parent: Option<String>,
    pub is_abstract: bool,
    pub params: HashMap<String, ParamDeclaration>,
    pub resolve: Invocables,
    pub views: BTreeMap<String, ViewDeclaration>,
    pub template: Option<String>,
    pub template_url: Option<String>,
    pub data: Option<Value>,
    pub on_enter: Option<Hook>,
    pub on_exit: Option<Hook>,
    /// When false, changes to search parameters alone do not reload the place.
    pub reload_on_search: bool,
}

impl PlaceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            parent: None,
            is_abstract: false,
            params: HashMap::new(),
            resolve: Invocables::new(),
            views: BTreeMap::new(),
            template: None,
            template_url: None,
            data: None,
            on_enter: None,
            on_exit: None,
            reload_on_search: true,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn abstract_place(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn param(mut self, id: impl Into<String>, declaration: impl Into<ParamDeclaration>) -> Self {
        self.params.insert(id.into(), declaration.into());
        self
    }

    pub fn resolve(mut self, key: impl Into<String>, invocable: Invocable) -> Self {
        self.resolve.insert(key.into(), invocable);
        self
    }

    pub fn view(mut self, name: impl Into<String>, view: ViewDeclaration) -> Self {
        self.views.insert(name.into(), view);
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn template_url(mut self, url: impl Into<String>) -> Self {
        self.template_url = Some(url.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn on_enter(mut self, hook: impl Fn(&HookContext<'_>) + Send + Sync + 'static) -> Self {
        self.on_enter = Some(Arc::new(hook));
        self
    }

    pub fn on_exit(mut self, hook: impl Fn(&HookContext<'_>) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    pub fn reload_on_search(mut self, reload: bool) -> Self {
        self.reload_on_search = reload;
        self
    }

    /// Name of the parent: explicit, else the dotted prefix, else the root.
    pub fn parent_name(&self) -> String {
        if let Some(parent) = &self.parent {
            return parent.clone();
        }
        self.name
            .rsplit_once('.')
            .map(|(prefix, _)| prefix.to_string())
            .unwrap_or_default()
    }
}

impl fmt::Debug for PlaceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceDefinition")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("parent", &self.parent)
            .field("is_abstract", &self.is_abstract)
            .field("resolve", &self.resolve.keys().collect::<Vec<_>>())
            .field("views", &self.views)
            .finish()
    }
}

//! A registered place and its derivation.
//!
//! # Responsibilities
//! - Derive a place from its definition and its registered parent
//! - Hold the place's studied plans and its committed locals
//!
//! # Design Decisions
//! - Derivation order is fixed: parent, data, url, navigable, own params,
//!   params, views, path, includes
//! - Every plan is studied here, so a cycle fails registration
//! - Locals are written only by the transition commit

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::resolve::{study, BoxError, Invocable, Invocables, Plan, Resolution, Values};
use crate::url::{
    Location, MatcherConfig, Param, ParamSet, Params, UrlMatcher, UrlMatcherFactory,
};

use super::definition::{Hook, HookContext, PlaceDefinition, ViewDeclaration};
use super::error::{RegistrationError, RegistrationResult};
use super::template::{TemplateLoader, TemplateRequest};

/// Local name under which a resolution receives its parameter values.
pub const PARAMS_KEY: &str = "$params";
/// Resolvable that publishes a view's template.
pub const TEMPLATE_KEY: &str = "$template";

/// A view with its studied resolve plan.
#[derive(Debug, Clone)]
pub struct View {
    name: String,
    template: Option<String>,
    template_url: Option<String>,
    plan: Plan,
}

impl View {
    /// Fully-qualified name, `name@place`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn template_url(&self) -> Option<&str> {
        self.template_url.as_deref()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }
}

/// A committed view: its template and resolved values.
#[derive(Debug, Clone)]
pub struct ViewLocals {
    pub template: Option<String>,
    pub values: Arc<Values>,
}

/// What an active place keeps between transitions.
#[derive(Debug, Clone)]
pub struct PlaceLocals {
    pub resolution: Resolution,
    pub values: Arc<Values>,
    pub views: BTreeMap<String, ViewLocals>,
}

pub struct Place {
    name: String,
    parent: Option<Arc<Place>>,
    data: Value,
    url: Option<Arc<UrlMatcher>>,
    is_abstract: bool,
    own_params: ParamSet,
    params: ParamSet,
    views: BTreeMap<String, View>,
    path: Vec<String>,
    includes: HashSet<String>,
    resolve: Invocables,
    plan: Plan,
    on_enter: Option<Hook>,
    on_exit: Option<Hook>,
    reload_on_search: bool,
    locals: RwLock<Option<Arc<PlaceLocals>>>,
}

impl Place {
    /// The implicit root: abstract, always active, matching the empty URL.
    pub(crate) fn root(factory: &UrlMatcherFactory) -> RegistrationResult<Self> {
        let url = factory.compile("").map_err(|source| RegistrationError::Pattern {
            place: String::new(),
            source,
        })?;
        Ok(Self {
            name: String::new(),
            parent: None,
            data: Value::Object(Default::default()),
            url: Some(Arc::new(url)),
            is_abstract: true,
            own_params: ParamSet::new(),
            params: ParamSet::new(),
            views: BTreeMap::new(),
            path: Vec::new(),
            includes: HashSet::from([String::new()]),
            resolve: Invocables::new(),
            plan: Plan::default(),
            on_enter: None,
            on_exit: None,
            reload_on_search: true,
            locals: RwLock::new(None),
        })
    }

    /// Derive a place from its definition.
    pub(crate) fn build(
        definition: PlaceDefinition,
        parent: Arc<Place>,
        factory: &UrlMatcherFactory,
        templates: &Arc<dyn TemplateLoader>,
    ) -> RegistrationResult<Self> {
        let name = definition.name.clone();
        let pattern_error = |source| RegistrationError::Pattern {
            place: name.clone(),
            source,
        };

        let data = merge_data(&parent.data, definition.data.as_ref());

        let matcher_config = MatcherConfig {
            params: definition.params.clone(),
            ..MatcherConfig::default()
        };
        let url = match definition.url.as_deref() {
            Some(absolute) if absolute.starts_with('^') => {
                Some(factory.compile_with(&absolute[1..], &matcher_config).map_err(pattern_error)?)
            }
            Some(relative) => {
                let compiled = match parent.navigable().and_then(|n| n.url.clone()) {
                    Some(base) => base.concat(factory, relative, &matcher_config),
                    None => factory.compile_with(relative, &matcher_config),
                };
                Some(compiled.map_err(pattern_error)?)
            }
            None => None,
        };

        let mut own: Vec<Arc<Param>> = Vec::new();
        if let Some(url) = &url {
            for param in url.own_params() {
                if parent.params.contains(param.id()) {
                    tracing::warn!(place = %name, param = %param.id(), "Url parameter shadows an inherited parameter, ignoring");
                    continue;
                }
                own.push(param.clone());
            }
        }
        let mut config_ids: Vec<_> = definition.params.keys().collect();
        config_ids.sort();
        for id in config_ids {
            let in_url = url.as_ref().map_or(false, |u| u.params().contains(id));
            if in_url {
                continue;
            }
            if parent.params.contains(id) {
                tracing::warn!(place = %name, param = %id, "Config parameter shadows an inherited parameter, ignoring");
                continue;
            }
            let param = Param::new(
                id,
                None,
                definition.params.get(id),
                Location::Config,
                factory,
            )
            .map_err(pattern_error)?;
            own.push(Arc::new(param));
        }
        let own_params: ParamSet = own.iter().cloned().collect();
        let params = parent.params.extend_with(own);

        let views = build_views(&definition, &parent.name, templates)?;

        let mut path = parent.path.clone();
        path.push(name.clone());
        let mut includes = parent.includes.clone();
        includes.insert(name.clone());

        let plan = study(&definition.resolve).map_err(|source| RegistrationError::Cycle {
            place: name.clone(),
            source,
        })?;

        Ok(Self {
            name,
            parent: Some(parent),
            data,
            url: url.map(Arc::new),
            is_abstract: definition.is_abstract,
            own_params,
            params,
            views,
            path,
            includes,
            resolve: definition.resolve,
            plan,
            on_enter: definition.on_enter,
            on_exit: definition.on_exit,
            reload_on_search: definition.reload_on_search,
            locals: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<&Arc<Place>> {
        self.parent.as_ref()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// This place's own compiled URL, if it declares one.
    pub fn url(&self) -> Option<&Arc<UrlMatcher>> {
        self.url.as_ref()
    }

    /// The nearest place (self included) that has a URL.
    pub fn navigable(&self) -> Option<&Place> {
        if self.url.is_some() {
            return Some(self);
        }
        self.parent.as_deref().and_then(Place::navigable)
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn own_params(&self) -> &ParamSet {
        &self.own_params
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn views(&self) -> &BTreeMap<String, View> {
        &self.views
    }

    /// Names from the first non-root ancestor down to this place.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// True when `name` is this place or one of its ancestors.
    pub fn includes(&self, name: &str) -> bool {
        self.includes.contains(name)
    }

    pub fn resolve(&self) -> &Invocables {
        &self.resolve
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn reload_on_search(&self) -> bool {
        self.reload_on_search
    }

    /// Ancestors and self, root excluded, outermost first.
    pub fn lineage(self: &Arc<Self>) -> Vec<Arc<Place>> {
        let mut chain = Vec::with_capacity(self.path.len());
        let mut current = Some(self.clone());
        while let Some(place) = current {
            if place.is_root() {
                break;
            }
            current = place.parent.clone();
            chain.push(place);
        }
        chain.reverse();
        chain
    }

    /// The last committed locals; `None` while the place is inactive.
    pub fn locals(&self) -> Option<Arc<PlaceLocals>> {
        self.locals.read().ok().and_then(|guard| guard.clone())
    }

    pub(crate) fn set_locals(&self, locals: Arc<PlaceLocals>) {
        if let Ok(mut guard) = self.locals.write() {
            *guard = Some(locals);
        }
    }

    pub(crate) fn clear_locals(&self) {
        if let Ok(mut guard) = self.locals.write() {
            *guard = None;
        }
    }

    pub(crate) fn run_enter(&self, params: &Params, values: &Values) {
        if let Some(hook) = &self.on_enter {
            hook(&HookContext { place: self, params, values });
        }
    }

    pub(crate) fn run_exit(&self, params: &Params, values: &Values) {
        if let Some(hook) = &self.on_exit {
            hook(&HookContext { place: self, params, values });
        }
    }
}

impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Place")
            .field("name", &self.name)
            .field("url", &self.url.as_ref().map(|u| u.source()))
            .field("abstract", &self.is_abstract)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str("(root)")
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Shallow merge: own keys override inherited ones.
fn merge_data(inherited: &Value, own: Option<&Value>) -> Value {
    match (inherited, own) {
        (Value::Object(base), Some(Value::Object(overrides))) => {
            let mut merged = base.clone();
            merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(merged)
        }
        (_, Some(own)) => own.clone(),
        (inherited, None) => inherited.clone(),
    }
}

fn build_views(
    definition: &PlaceDefinition,
    parent_name: &str,
    templates: &Arc<dyn TemplateLoader>,
) -> RegistrationResult<BTreeMap<String, View>> {
    let declared = if definition.views.is_empty() {
        BTreeMap::from([(
            String::new(),
            ViewDeclaration {
                template: definition.template.clone(),
                template_url: definition.template_url.clone(),
                resolve: Invocables::new(),
            },
        )])
    } else {
        definition.views.clone()
    };

    let mut views = BTreeMap::new();
    for (name, declaration) in declared {
        let full = if name.contains('@') {
            name
        } else {
            format!("{name}@{parent_name}")
        };

        let mut invocables = declaration.resolve.clone();
        invocables.entry(TEMPLATE_KEY.to_string()).or_insert_with(|| {
            template_invocable(
                templates.clone(),
                TemplateRequest {
                    place: definition.name.clone(),
                    view: full.clone(),
                    template: declaration.template.clone(),
                    template_url: declaration.template_url.clone(),
                    params: Value::Null,
                },
            )
        });
        let plan = study(&invocables).map_err(|source| RegistrationError::Cycle {
            place: definition.name.clone(),
            source,
        })?;

        views.insert(
            full.clone(),
            View {
                name: full,
                template: declaration.template,
                template_url: declaration.template_url,
                plan,
            },
        );
    }
    Ok(views)
}

fn template_invocable(loader: Arc<dyn TemplateLoader>, request: TemplateRequest) -> Invocable {
    Invocable::function(&[PARAMS_KEY], move |deps| {
        let request = TemplateRequest {
            params: deps.get(PARAMS_KEY).cloned().unwrap_or(Value::Null),
            ..request.clone()
        };
        let load = loader.load(request);
        async move {
            let template = load.await?;
            Ok::<_, BoxError>(template.map(Value::String).unwrap_or(Value::Null))
        }
    })
}

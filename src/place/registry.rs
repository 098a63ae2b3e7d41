//! Place registry: registration queue, lookup and URL rules.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;

use crate::observability::metrics;
use crate::url::{Params, UrlMatcherFactory};

use super::definition::PlaceDefinition;
use super::error::{RegistrationError, RegistrationResult};
use super::place::Place;
use super::template::TemplateLoader;

/// All registered places, rooted at the implicit root.
pub struct PlaceRegistry {
    factory: Arc<UrlMatcherFactory>,
    templates: Arc<dyn TemplateLoader>,
    root: Arc<Place>,
    places: DashMap<String, Arc<Place>>,
    /// Registration order; also the URL rule order.
    order: RwLock<Vec<Arc<Place>>>,
    /// Definitions waiting for their parent, keyed by parent name.
    queue: Mutex<BTreeMap<String, Vec<PlaceDefinition>>>,
}

impl PlaceRegistry {
    pub fn new(factory: Arc<UrlMatcherFactory>, templates: Arc<dyn TemplateLoader>) -> RegistrationResult<Self> {
        let root = Arc::new(Place::root(&factory)?);
        Ok(Self {
            factory,
            templates,
            root,
            places: DashMap::new(),
            order: RwLock::new(Vec::new()),
            queue: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn root(&self) -> &Arc<Place> {
        &self.root
    }

    pub fn factory(&self) -> &Arc<UrlMatcherFactory> {
        &self.factory
    }

    /// Register a place.
    ///
    /// Returns the places registered by this call: the place itself plus any
    /// queued descendants it unblocked. Empty when the parent is not yet
    /// registered and the definition was queued.
    pub fn register(&self, definition: PlaceDefinition) -> RegistrationResult<Vec<Arc<Place>>> {
        let name = definition.name.clone();
        if name.is_empty() || name.contains('@') {
            return Err(RegistrationError::InvalidName(name));
        }
        if self.places.contains_key(&name) || self.is_queued(&name) {
            return Err(RegistrationError::Duplicate(name));
        }

        let parent_name = definition.parent_name();
        let parent = if parent_name.is_empty() {
            Some(self.root.clone())
        } else {
            self.get(&parent_name)
        };
        let Some(parent) = parent else {
            tracing::debug!(place = %name, parent = %parent_name, "Parent not registered yet, queueing");
            if let Ok(mut queue) = self.queue.lock() {
                queue.entry(parent_name).or_default().push(definition);
            }
            return Ok(Vec::new());
        };

        let place = Arc::new(Place::build(definition, parent, &self.factory, &self.templates)?);
        self.places.insert(name.clone(), place.clone());
        let total = match self.order.write() {
            Ok(mut order) => {
                order.push(place.clone());
                order.len()
            }
            Err(_) => self.places.len(),
        };
        metrics::set_registered_places(total);
        tracing::info!(
            place = %name,
            url = place.url().map(|u| u.source()).unwrap_or(""),
            abstract_place = place.is_abstract(),
            "Registered place"
        );

        let waiting = self
            .queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.remove(&name))
            .unwrap_or_default();

        let mut registered = vec![place];
        let mut first_error = None;
        for child in waiting {
            let child_name = child.name.clone();
            match self.register(child) {
                Ok(mut more) => registered.append(&mut more),
                Err(e) => {
                    tracing::error!(place = %child_name, error = %e, "Queued place failed to register");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(registered),
        }
    }

    fn is_queued(&self, name: &str) -> bool {
        self.queue
            .lock()
            .map(|queue| queue.values().flatten().any(|d| d.name == name))
            .unwrap_or(false)
    }

    /// Look up by absolute name; the empty name is the root.
    pub fn get(&self, name: &str) -> Option<Arc<Place>> {
        if name.is_empty() {
            return Some(self.root.clone());
        }
        self.places.get(name).map(|p| p.value().clone())
    }

    /// Look up a possibly relative name (`.child`, `^`, `^.sibling`).
    pub fn find(&self, name: &str, base: Option<&Place>) -> Option<Arc<Place>> {
        if !(name.starts_with('.') || name.starts_with('^')) {
            return self.get(name);
        }
        let base = self.get(base?.name())?;
        let mut current = base.clone();
        let parts: Vec<&str> = name.split('.').collect();
        let mut consumed = 0;
        for (i, part) in parts.iter().enumerate() {
            match *part {
                "" if i == 0 => current = base.clone(),
                "^" => current = current.parent()?.clone(),
                _ => break,
            }
            consumed = i + 1;
        }
        let rest = parts[consumed..].join(".");
        let absolute = match (current.name().is_empty(), rest.is_empty()) {
            (_, true) => current.name().to_string(),
            (true, false) => rest,
            (false, false) => format!("{}.{}", current.name(), rest),
        };
        self.get(&absolute)
    }

    /// Registered places in registration order, root excluded.
    pub fn places(&self) -> Vec<Arc<Place>> {
        self.order.read().map(|order| order.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// First concrete place whose URL matches, with the matched values.
    pub fn match_url(&self, path: &str, search: &Params) -> Option<(Arc<Place>, Params)> {
        let order = self.order.read().ok()?;
        order
            .iter()
            .filter(|place| !place.is_abstract())
            .find_map(|place| {
                let values = place.url()?.exec(path, search)?;
                Some((place.clone(), values))
            })
    }

    /// Parents that queued definitions are still waiting for.
    pub fn unresolved(&self) -> BTreeMap<String, Vec<String>> {
        self.queue
            .lock()
            .map(|queue| {
                queue
                    .iter()
                    .map(|(parent, children)| {
                        (parent.clone(), children.iter().map(|d| d.name.clone()).collect())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for PlaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceRegistry")
            .field("places", &self.places.len())
            .field("unresolved", &self.unresolved())
            .finish()
    }
}

//! The router: owns the place tree, the active place and the transition
//! state machine.
//!
//! # Responsibilities
//! - Find targets (including the not-found redirect and retry flow)
//! - Compute the keep-point and skip no-op transitions
//! - Resolve entered places eagerly, then commit exits and entries atomically
//! - Detect supersession through a monotonically increasing sequence number

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::Instant;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::{RouterConfig, TransitionConfig, UrlConfig};
use crate::observability::metrics::{self, Outcome};
use crate::place::{
    glob, FileTemplates, InlineTemplates, Place, PlaceDefinition, PlaceLocals, PlaceRegistry,
    RegistrationError, RegistrationResult, TemplateLoader, ViewLocals, PARAMS_KEY, TEMPLATE_KEY,
};
use crate::resolve::{InvokeContext, Resolution, Services, Values};
use crate::url::encoding::{decode_uri_component, parse_query};
use crate::url::{Location, Params, UrlMatcherFactory};

use super::error::{TransitionError, TransitionResult};
use super::events::{
    NotFoundDecision, PlaceRef, Redirect, RouterEvent, StartDecision, TransitionInfo,
    TransitionObserver,
};
use super::handle::TransitionHandle;
use super::location::{LocationSync, MemoryLocation};
use super::options::{HrefOptions, LocationMode, Reload, TransitionOptions};

/// The committed place and parameters.
#[derive(Debug)]
struct ActiveState {
    place: Arc<Place>,
    params: Params,
    transition: Option<Uuid>,
}

/// Everything the asynchronous half of a transition needs.
struct Pending {
    seq: u64,
    place: Arc<Place>,
    to_path: Vec<Arc<Place>>,
    keep: usize,
    params: Params,
    info: TransitionInfo,
    started: Instant,
}

type Entered = (Arc<Place>, Arc<PlaceLocals>);

pub struct Router {
    registry: PlaceRegistry,
    services: Services,
    active: ArcSwap<ActiveState>,
    /// The lineage that currently holds locals. Differs from `active` only
    /// after a commit was superseded by one of its own hooks.
    mounted: ArcSwap<ActiveState>,
    /// Sequence number of the transition in flight; 0 when idle.
    current: AtomicU64,
    sequence: AtomicU64,
    commit: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn TransitionObserver>>>,
    events: broadcast::Sender<RouterEvent>,
    location: Arc<dyn LocationSync>,
    settings: TransitionConfig,
}

impl Router {
    /// A router with default settings, inline templates and in-memory history.
    pub fn new() -> RegistrationResult<Arc<Self>> {
        Self::with_collaborators(
            UrlConfig::default(),
            TransitionConfig::default(),
            Arc::new(InlineTemplates),
            Arc::new(MemoryLocation::new()),
        )
    }

    pub fn with_collaborators(
        url: UrlConfig,
        settings: TransitionConfig,
        templates: Arc<dyn TemplateLoader>,
        location: Arc<dyn LocationSync>,
    ) -> RegistrationResult<Arc<Self>> {
        let factory = Arc::new(UrlMatcherFactory::new(url));
        let registry = PlaceRegistry::new(factory, templates)?;
        let root = registry.root().clone();
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let idle = Arc::new(ActiveState {
            place: root,
            params: Params::new(),
            transition: None,
        });

        Ok(Arc::new(Self {
            registry,
            services: Services::new(),
            active: ArcSwap::new(idle.clone()),
            mounted: ArcSwap::new(idle),
            current: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            commit: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
            events,
            location,
            settings,
        }))
    }

    /// Build a router from configuration: services first, then places in order.
    pub fn from_config(config: &RouterConfig) -> RegistrationResult<Arc<Self>> {
        metrics::set_enabled(config.observability.metrics_enabled);

        let templates: Arc<dyn TemplateLoader> = match &config.transitions.template_root {
            Some(root) => Arc::new(FileTemplates::new(root.clone())),
            None => Arc::new(InlineTemplates),
        };
        let router = Self::with_collaborators(
            config.url.clone(),
            config.transitions.clone(),
            templates,
            Arc::new(MemoryLocation::new()),
        )?;

        for (name, value) in &config.services {
            router.services.register(name.clone(), value.clone());
        }
        for place in &config.places {
            router.register(place.to_definition())?;
        }
        router.verify()?;

        info!(
            places = router.registry.len(),
            services = config.services.len(),
            "Router configured"
        );
        Ok(router)
    }

    pub fn registry(&self) -> &PlaceRegistry {
        &self.registry
    }

    pub fn factory(&self) -> &Arc<UrlMatcherFactory> {
        self.registry.factory()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn location(&self) -> &Arc<dyn LocationSync> {
        &self.location
    }

    pub fn settings(&self) -> &TransitionConfig {
        &self.settings
    }

    /// Register a place. Returns the places that became registered, which is
    /// empty when the definition waits for its parent.
    pub fn register(&self, definition: PlaceDefinition) -> RegistrationResult<Vec<Arc<Place>>> {
        self.registry.register(definition)
    }

    /// Fail when definitions are still waiting for parents that never came.
    pub fn verify(&self) -> RegistrationResult<()> {
        let unresolved = self.registry.unresolved();
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(RegistrationError::UnresolvedParents(unresolved))
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn TransitionObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            observers.push(observer);
        }
    }

    /// The active place and its parameters.
    pub fn current(&self) -> PlaceRef {
        let active = self.active.load();
        PlaceRef {
            place: active.place.clone(),
            params: active.params.clone(),
        }
    }

    pub fn params(&self) -> Params {
        self.active.load().params.clone()
    }

    /// Id of the transition that produced the active place.
    pub fn active_transition(&self) -> Option<Uuid> {
        self.active.load().transition
    }

    /// True while a transition is resolving.
    pub fn is_transitioning(&self) -> bool {
        self.current.load(Ordering::Acquire) != 0
    }

    /// Options carrying the configured location mode and notification default.
    pub fn default_options(&self) -> TransitionOptions {
        TransitionOptions::default()
            .location(self.settings.default_location)
            .notify(self.settings.notify)
    }

    /// Navigate relative to the active place, inheriting its parameters.
    pub fn go(self: &Arc<Self>, target: &str, params: Params) -> TransitionHandle {
        let base = self.active.load().place.name().to_string();
        let options = self.default_options().inherit(true).relative(base);
        self.go_to(target, params, options)
    }

    /// Request a transition. Synchronous failures settle immediately; the rest
    /// runs on the ambient tokio runtime.
    pub fn go_to(self: &Arc<Self>, target: &str, params: Params, options: TransitionOptions) -> TransitionHandle {
        let started = Instant::now();
        let from = self.active.load_full();
        match self.find_target(target, &options) {
            Some(place) => self.begin(place, params, options, from, started),
            None => self.not_found(
                Redirect {
                    to: target.to_string(),
                    params,
                    options,
                },
                from,
                started,
            ),
        }
    }

    /// Navigate to the place matching `url`. Does nothing when that place is
    /// already active with equal parameters.
    pub fn go_to_url(self: &Arc<Self>, url: &str) -> TransitionHandle {
        let Some((place, params)) = self.match_url(url) else {
            debug!(url, "No place matches URL");
            metrics::record_transition(Outcome::NotFound, Instant::now());
            return TransitionHandle::ready(Err(TransitionError::NotFound {
                name: url.to_string(),
                relative: None,
            }));
        };

        let active = self.active.load_full();
        let already_there = active
            .place
            .navigable()
            .is_some_and(|nav| std::ptr::eq(nav, &*place))
            && equal_for_keys(&place, &params, &active.params);
        if already_there {
            return TransitionHandle::ready(Ok(self.current()));
        }

        let options = self
            .default_options()
            .inherit(true)
            .location(LocationMode::Skip);
        self.go_to(place.name(), params, options)
    }

    /// First concrete place whose URL matches, with the decoded values.
    pub fn match_url(&self, url: &str) -> Option<(Arc<Place>, Params)> {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        self.registry
            .match_url(&decode_uri_component(path), &parse_query(query))
    }

    /// True when `name` is exactly the active place and, if given, `params`
    /// (defaults applied) equal the active ones.
    pub fn is(&self, name: &str, params: Option<&Params>) -> bool {
        let active = self.active.load();
        let Some(place) = self.registry.find(name, Some(&*active.place)) else {
            return false;
        };
        if !Arc::ptr_eq(&place, &active.place) {
            return false;
        }
        params.map_or(true, |params| {
            equal_for_keys(&place, &place.params().values(params), &active.params)
        })
    }

    /// True when the active place is `name` or a descendant of it. Accepts
    /// globs (`*` one segment, `**` any number) matched against the active name.
    pub fn includes(&self, name: &str, params: Option<&Params>) -> bool {
        let active = self.active.load();
        let place = if glob::is_glob(name) {
            if !glob::matches(name, active.place.name()) {
                return false;
            }
            active.place.clone()
        } else {
            match self.registry.find(name, Some(&*active.place)) {
                Some(place) => place,
                None => return false,
            }
        };
        if !active.place.includes(place.name()) {
            return false;
        }
        params.map_or(true, |params| equal_for_keys(&place, params, &active.params))
    }

    /// Format the URL of a place. `None` for unknown places, places without a
    /// URL, or parameters that do not validate.
    pub fn href(&self, name: &str, params: &Params, options: &HrefOptions) -> Option<String> {
        let active = self.active.load_full();
        let base = match &options.relative {
            Some(relative) => self.registry.get(relative)?,
            None => active.place.clone(),
        };
        let place = self.registry.find(name, Some(&base))?;

        let mut raw = params.clone();
        if options.inherit {
            inherit_params(&mut raw, &active.place.lineage(), &active.params, &place.lineage());
        }

        let nav: &Place = if options.lossy { place.navigable()? } else { &*place };
        nav.url()?.format(&place.params().filter(&raw))
    }

    fn find_target(&self, target: &str, options: &TransitionOptions) -> Option<Arc<Place>> {
        let base = options
            .relative
            .as_deref()
            .and_then(|name| self.registry.get(name));
        self.registry.find(target, base.as_deref())
    }

    fn observers(&self) -> Vec<Arc<dyn TransitionObserver>> {
        self.observers.read().map(|o| o.clone()).unwrap_or_default()
    }

    fn emit(&self, event: RouterEvent) {
        let _ = self.events.send(event);
    }

    fn claim(&self) -> u64 {
        let seq = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.current.store(seq, Ordering::Release);
        seq
    }

    fn try_commit_lock(&self) -> Option<MutexGuard<'_, ()>> {
        match self.commit.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn is_current(&self, seq: u64) -> bool {
        self.current.load(Ordering::Acquire) == seq
    }

    fn release(&self, seq: u64) {
        let _ = self
            .current
            .compare_exchange(seq, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    fn not_found(
        self: &Arc<Self>,
        mut redirect: Redirect,
        from: Arc<ActiveState>,
        started: Instant,
    ) -> TransitionHandle {
        self.emit(RouterEvent::NotFound {
            to: redirect.to.clone(),
            from: from.place.name().to_string(),
        });

        let from_ref = PlaceRef {
            place: from.place.clone(),
            params: from.params.clone(),
        };
        let mut decision = NotFoundDecision::Continue;
        for observer in self.observers() {
            match observer.on_not_found(&mut redirect, &from_ref) {
                NotFoundDecision::Continue => continue,
                other => {
                    decision = other;
                    break;
                }
            }
        }

        match decision {
            NotFoundDecision::Continue => {}
            NotFoundDecision::Prevent => {
                debug!(to = %redirect.to, "Not-found transition aborted by observer");
                metrics::record_transition(Outcome::Prevented, started);
                return TransitionHandle::ready(Err(TransitionError::Aborted));
            }
            NotFoundDecision::Retry(wait) => {
                if redirect.options.retried {
                    metrics::record_transition(Outcome::NotFound, started);
                    return TransitionHandle::ready(Err(TransitionError::NotFound {
                        name: redirect.to,
                        relative: redirect.options.relative,
                    }));
                }
                let seq = self.claim();
                let router = self.clone();
                return TransitionHandle::start(None, async move {
                    if let Err(error) = wait.await {
                        warn!(to = %redirect.to, error = %error, "Not-found retry failed");
                        router.release(seq);
                        metrics::record_transition(Outcome::Failed, started);
                        return Err(TransitionError::Aborted);
                    }
                    if !router.is_current(seq) {
                        metrics::record_transition(Outcome::Superseded, started);
                        return Err(TransitionError::Superseded);
                    }
                    redirect.options.retried = true;
                    router
                        .go_to(&redirect.to, redirect.params, redirect.options)
                        .await
                });
            }
        }

        // One more lookup: the observer may have rewritten the target.
        match self.find_target(&redirect.to, &redirect.options) {
            Some(place) => self.begin(place, redirect.params, redirect.options, from, started),
            None => {
                debug!(to = %redirect.to, "No such place");
                metrics::record_transition(Outcome::NotFound, started);
                TransitionHandle::ready(Err(TransitionError::NotFound {
                    name: redirect.to,
                    relative: redirect.options.relative,
                }))
            }
        }
    }

    fn begin(
        self: &Arc<Self>,
        place: Arc<Place>,
        params: Params,
        options: TransitionOptions,
        from: Arc<ActiveState>,
        started: Instant,
    ) -> TransitionHandle {
        if place.is_abstract() {
            metrics::record_transition(Outcome::Invalid, started);
            return TransitionHandle::ready(Err(TransitionError::AbstractTarget(
                place.name().to_string(),
            )));
        }

        let to_path = place.lineage();
        let from_path = from.place.lineage();

        let mut raw = params;
        if options.inherit {
            inherit_params(&mut raw, &from_path, &from.params, &to_path);
        }

        if !place.params().validates(&raw) {
            debug!(place = %place.name(), "Rejected parameters");
            metrics::record_transition(Outcome::Invalid, started);
            return TransitionHandle::ready(Err(TransitionError::InvalidParams {
                place: place.name().to_string(),
            }));
        }
        let params = place.params().values(&raw);

        let keep = match &options.reload {
            Reload::None => kept_prefix(&to_path, &from_path, |p| {
                p.own_params().equals(&params, &from.params)
            }),
            Reload::All => 0,
            Reload::From(name) => {
                let Some(reload) = self.find_target(name, &options) else {
                    metrics::record_transition(Outcome::Invalid, started);
                    return TransitionHandle::ready(Err(TransitionError::UnknownReloadPlace(
                        name.clone(),
                    )));
                };
                kept_prefix(&to_path, &from_path, |p| {
                    !Arc::ptr_eq(p, &reload) && p.own_params().equals(&params, &from.params)
                })
            }
        };

        if options.reload == Reload::None && Arc::ptr_eq(&place, &from.place) {
            let unchanged = keep == to_path.len();
            if unchanged || (!place.reload_on_search() && only_search_changed(&place, &params, &from.params)) {
                // While another commit (or one of its hooks) runs, take the full path.
                if let Some(guard) = self.try_commit_lock() {
                    let settled = Arc::ptr_eq(&*self.active.load(), &from)
                        && Arc::ptr_eq(&*self.mounted.load(), &from);
                    if settled {
                        return self.commit_params(guard, place, params, options.location, started);
                    }
                }
            }
        }

        let id = Uuid::new_v4();
        let info = TransitionInfo {
            id,
            to: place.name().to_string(),
            to_params: params.clone(),
            from: from.place.name().to_string(),
            from_params: from.params.clone(),
            options,
        };

        if info.options.notify {
            self.emit(RouterEvent::Start(info.clone()));
            let observers = self.observers();
            let prevented = observers
                .iter()
                .any(|observer| observer.on_start(&info) == StartDecision::Prevent);
            if prevented {
                info!(transition_id = %id, to = %info.to, "Transition prevented");
                self.emit(RouterEvent::Cancel(info.clone()));
                for observer in &observers {
                    observer.on_cancel(&info);
                }
                metrics::record_transition(Outcome::Prevented, started);
                return TransitionHandle::ready(Err(TransitionError::Prevented));
            }
        }

        let seq = self.claim();
        info!(
            transition_id = %id,
            from = %info.from,
            to = %info.to,
            kept = keep,
            "Transition started"
        );

        let pending = Pending {
            seq,
            place,
            to_path,
            keep,
            params,
            info,
            started,
        };
        let router = self.clone();
        let span = tracing::info_span!("transition", transition_id = %id);
        TransitionHandle::start(Some(id), async move { router.run(pending).await }.instrument(span))
    }

    /// The target is already active: record the new parameters without
    /// re-resolving anything. Any transition in flight is superseded.
    fn commit_params(
        &self,
        _guard: MutexGuard<'_, ()>,
        place: Arc<Place>,
        params: Params,
        location: LocationMode,
        started: Instant,
    ) -> TransitionHandle {
        self.sequence.fetch_add(1, Ordering::AcqRel);
        self.current.store(0, Ordering::Release);

        let transition = self.active.load().transition;
        let state = Arc::new(ActiveState {
            place: place.clone(),
            params: params.clone(),
            transition,
        });
        self.mounted.store(state.clone());
        self.active.store(state);
        self.sync_location(&place, &params, location);

        debug!(place = %place.name(), "Parameter-only transition");
        metrics::record_transition(Outcome::Noop, started);
        TransitionHandle::ready(Ok(PlaceRef { place, params }))
    }

    async fn run(self: Arc<Self>, pending: Pending) -> TransitionResult<PlaceRef> {
        let Pending {
            seq,
            place,
            to_path,
            keep,
            params,
            info,
            started,
        } = pending;

        // A concurrent commit may have cleared a kept place since `begin`.
        let kept: Vec<Entered> = to_path[..keep]
            .iter()
            .map_while(|p| p.locals().map(|locals| (p.clone(), locals)))
            .collect();
        let keep = kept.len();

        // Start every resolution up front; each one chains onto its parent's.
        let mut parent: Option<Resolution> = kept.last().map(|(_, locals)| locals.resolution.clone());
        let mut resolving = Vec::with_capacity(to_path.len() - keep);
        for entered in &to_path[keep..] {
            let context = InvokeContext::new(entered.name(), Some(info.id));
            let mut locals = Values::new();
            locals.insert(
                PARAMS_KEY.to_string(),
                params_object(&entered.params().filter(&params)),
            );
            let resolution = entered
                .plan()
                .resolve(locals, parent.as_ref(), context.clone(), &self.services);
            let views: Vec<(String, Resolution)> = entered
                .views()
                .iter()
                .map(|(name, view)| {
                    let resolution = view.plan().resolve(
                        Values::new(),
                        Some(&resolution),
                        context.clone(),
                        &self.services,
                    );
                    (name.clone(), resolution)
                })
                .collect();
            parent = Some(resolution.clone());
            resolving.push((entered.clone(), resolution, views));
        }

        let mut entering: Vec<Entered> = Vec::with_capacity(resolving.len());
        for (entered, resolution, views) in resolving {
            let values = match resolution.clone().await {
                Ok(values) => values,
                Err(error) => return self.fail(seq, &info, error.into(), started),
            };
            let mut view_locals = BTreeMap::new();
            for (name, view) in views {
                let values = match view.await {
                    Ok(values) => values,
                    Err(error) => return self.fail(seq, &info, error.into(), started),
                };
                let template = values
                    .get(TEMPLATE_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                view_locals.insert(name, ViewLocals { template, values });
            }
            entering.push((
                entered,
                Arc::new(PlaceLocals {
                    resolution,
                    values,
                    views: view_locals,
                }),
            ));
        }

        self.commit(seq, place, kept, entering, params, &info, started)
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        seq: u64,
        place: Arc<Place>,
        kept: Vec<Entered>,
        entering: Vec<Entered>,
        params: Params,
        info: &TransitionInfo,
        started: Instant,
    ) -> TransitionResult<PlaceRef> {
        let guard = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(seq) {
            return self.superseded(info, started);
        }

        // Exits are computed against what is mounted now, not the snapshot
        // taken in `begin`: another commit may have landed in between.
        let mounted = self.mounted.load_full();
        let mounted_path = mounted.place.lineage();
        let shared = kept
            .iter()
            .zip(&mounted_path)
            .take_while(|((place, locals), live)| {
                Arc::ptr_eq(place, *live)
                    && place.locals().is_some_and(|current| Arc::ptr_eq(&current, locals))
            })
            .count();
        if shared < kept.len() {
            debug!(transition_id = %info.id, kept = kept.len(), shared, "Re-entering places replaced by another commit");
        }
        let exiting = &mounted_path[shared..];
        let entering: Vec<Entered> = kept.into_iter().skip(shared).chain(entering).collect();

        for exited in exiting.iter().rev() {
            let values = exited.locals().map(|l| l.values.clone()).unwrap_or_default();
            exited.run_exit(&mounted.params, &values);
            exited.clear_locals();
        }
        for (entered, locals) in &entering {
            entered.set_locals(locals.clone());
            entered.run_enter(&params, &locals.values);
        }

        let state = Arc::new(ActiveState {
            place: place.clone(),
            params: params.clone(),
            transition: Some(info.id),
        });
        self.mounted.store(state.clone());

        // Hooks may have started another transition.
        if !self.is_current(seq) {
            return self.superseded(info, started);
        }

        self.active.store(state);
        self.release(seq);
        drop(guard);

        self.sync_location(&place, &params, info.options.location);

        info!(
            transition_id = %info.id,
            to = %info.to,
            entered = entering.len(),
            exited = exiting.len(),
            "Transition committed"
        );
        if info.options.notify {
            self.emit(RouterEvent::Success(info.clone()));
            for observer in self.observers() {
                observer.on_success(info);
            }
        }
        metrics::record_transition(Outcome::Success, started);
        Ok(PlaceRef { place, params })
    }

    fn superseded(&self, info: &TransitionInfo, started: Instant) -> TransitionResult<PlaceRef> {
        debug!(transition_id = %info.id, to = %info.to, "Transition superseded");
        metrics::record_transition(Outcome::Superseded, started);
        Err(TransitionError::Superseded)
    }

    fn fail(
        &self,
        seq: u64,
        info: &TransitionInfo,
        error: TransitionError,
        started: Instant,
    ) -> TransitionResult<PlaceRef> {
        if !self.is_current(seq) {
            return self.superseded(info, started);
        }
        self.release(seq);

        warn!(transition_id = %info.id, to = %info.to, error = %error, "Transition failed");
        if info.options.notify {
            self.emit(RouterEvent::Error {
                info: info.clone(),
                error: error.clone(),
            });
            for observer in self.observers() {
                observer.on_error(info, &error);
            }
        }
        metrics::record_transition(Outcome::Failed, started);
        Err(error)
    }

    fn sync_location(&self, place: &Place, params: &Params, mode: LocationMode) {
        if mode == LocationMode::Skip {
            return;
        }
        let url = place
            .navigable()
            .and_then(Place::url)
            .and_then(|url| url.format(params));
        if let Some(url) = url {
            self.location.push(&url, mode == LocationMode::Replace);
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.active.load();
        f.debug_struct("Router")
            .field("active", &active.place.name())
            .field("params", &active.params)
            .field("places", &self.registry.len())
            .field("transitioning", &self.is_transitioning())
            .finish()
    }
}

/// Length of the shared prefix of both paths that may keep its locals.
fn kept_prefix(to: &[Arc<Place>], from: &[Arc<Place>], keep: impl Fn(&Arc<Place>) -> bool) -> usize {
    to.iter()
        .zip(from)
        .take_while(|(a, b)| Arc::ptr_eq(a, b) && a.locals().is_some() && keep(a))
        .count()
}

/// Fill `raw` from the active values of every parameter owned by an ancestor
/// both paths share. Explicit values win.
fn inherit_params(raw: &mut Params, from_path: &[Arc<Place>], from_params: &Params, to_path: &[Arc<Place>]) {
    let shared = from_path
        .iter()
        .zip(to_path)
        .take_while(|(a, b)| Arc::ptr_eq(a, b))
        .last();
    let Some((ancestor, _)) = shared else {
        return;
    };
    for id in ancestor.params().keys() {
        if raw.contains_key(id) {
            continue;
        }
        if let Some(value) = from_params.get(id) {
            raw.insert(id.to_string(), value.clone());
        }
    }
}

/// Every non-search parameter is unchanged.
fn only_search_changed(place: &Place, to: &Params, from: &Params) -> bool {
    place
        .params()
        .iter()
        .filter(|p| p.location() != Location::Search)
        .all(|p| match (to.get(p.id()), from.get(p.id())) {
            (None, None) => true,
            (Some(a), Some(b)) => p.codec().equals(a, b),
            _ => false,
        })
}

/// Compare only the keys present in `expected`.
fn equal_for_keys(place: &Place, expected: &Params, actual: &Params) -> bool {
    expected.iter().all(|(key, value)| match place.params().get(key) {
        Some(param) => match (param.value(Some(value)), actual.get(key)) {
            (Some(a), Some(b)) => param.codec().equals(&a, b),
            (None, None) => true,
            _ => false,
        },
        None => actual.get(key) == Some(value),
    })
}

fn params_object(params: &Params) -> Value {
    Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{BoxError, Invocable};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn contacts_router() -> Arc<Router> {
        let router = Router::new().unwrap();
        router
            .register(PlaceDefinition::new("contacts").url("/contacts").abstract_place())
            .unwrap();
        router
            .register(PlaceDefinition::new("contacts.list").url("/list?page"))
            .unwrap();
        router
            .register(PlaceDefinition::new("contacts.detail").url("/{id:int}"))
            .unwrap();
        router
    }

    #[tokio::test]
    async fn test_transition_commits_and_syncs_location() {
        let location = Arc::new(MemoryLocation::new());
        let router = Router::with_collaborators(
            UrlConfig::default(),
            TransitionConfig::default(),
            Arc::new(InlineTemplates),
            location.clone(),
        )
        .unwrap();
        router
            .register(PlaceDefinition::new("home").url("/home"))
            .unwrap();

        let active = router
            .go_to("home", Params::new(), TransitionOptions::default())
            .await
            .unwrap();
        assert_eq!(active.name(), "home");
        assert!(router.is("home", None));
        assert_eq!(location.history(), vec!["/home"]);
        assert!(!router.is_transitioning());
    }

    #[tokio::test]
    async fn test_abstract_and_unknown_targets() {
        let router = contacts_router();
        let err = router
            .go_to("contacts", Params::new(), TransitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::AbstractTarget(name) if name == "contacts"));

        let err = router
            .go_to("nowhere", Params::new(), TransitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_without_state_change() {
        let router = contacts_router();
        let err = router
            .go_to("contacts.detail", params(&[("id", json!("abc"))]), TransitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidParams { .. }));
        assert!(router.current().place.is_root());
    }

    #[tokio::test]
    async fn test_relative_go_inherits_shared_params() {
        let router = Router::new().unwrap();
        router
            .register(PlaceDefinition::new("user").url("/user/{user}"))
            .unwrap();
        router
            .register(PlaceDefinition::new("user.posts").url("/posts"))
            .unwrap();
        router
            .register(PlaceDefinition::new("user.likes").url("/likes"))
            .unwrap();

        router
            .go_to("user.posts", params(&[("user", json!("ann"))]), TransitionOptions::default())
            .await
            .unwrap();
        let active = router.go("^.likes", Params::new()).await.unwrap();
        assert_eq!(active.name(), "user.likes");
        assert_eq!(active.params.get("user"), Some(&json!("ann")));
    }

    #[tokio::test]
    async fn test_same_params_is_noop() {
        let router = contacts_router();
        let entered = Arc::new(AtomicUsize::new(0));
        let counter = entered.clone();
        router
            .register(
                PlaceDefinition::new("contacts.about")
                    .url("/about")
                    .on_enter(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();

        router.go_to("contacts.about", Params::new(), TransitionOptions::default()).await.unwrap();
        router.go_to("contacts.about", Params::new(), TransitionOptions::default()).await.unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_noop_during_commit_takes_full_path() {
        let router = contacts_router();
        router.go_to("contacts.list", Params::new(), TransitionOptions::default()).await.unwrap();
        let before = router.registry().get("contacts.list").unwrap().locals().unwrap();

        let guard = router.commit.lock().unwrap();
        let handle = router.go_to("contacts.list", Params::new(), TransitionOptions::default());
        assert!(handle.id().is_some());
        drop(guard);

        let active = handle.await.unwrap();
        assert_eq!(active.name(), "contacts.list");
        let after = active.locals().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(!router.is_transitioning());
    }

    #[tokio::test]
    async fn test_reload_on_search_false_skips_resolution() {
        let router = Router::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        router
            .register(
                PlaceDefinition::new("search")
                    .url("/search?q")
                    .reload_on_search(false)
                    .resolve(
                        "hits",
                        Invocable::function(&[], move |_| {
                            let counter = counter.clone();
                            async move {
                                counter.fetch_add(1, Ordering::SeqCst);
                                Ok::<_, BoxError>(json!([]))
                            }
                        }),
                    ),
            )
            .unwrap();

        router.go_to("search", params(&[("q", json!("a"))]), TransitionOptions::default()).await.unwrap();
        let active = router
            .go_to("search", params(&[("q", json!("b"))]), TransitionOptions::default())
            .await
            .unwrap();
        assert_eq!(active.params.get("q"), Some(&json!("b")));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_newer_transition_supersedes() {
        let router = Router::new().unwrap();
        router
            .register(PlaceDefinition::new("slow").url("/slow").resolve(
                "data",
                Invocable::function(&[], |_| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, BoxError>(json!(1))
                }),
            ))
            .unwrap();
        router
            .register(PlaceDefinition::new("fast").url("/fast"))
            .unwrap();

        let slow = router.go_to("slow", Params::new(), TransitionOptions::default());
        let fast = router.go_to("fast", Params::new(), TransitionOptions::default());
        assert_eq!(fast.await.unwrap().name(), "fast");
        assert!(matches!(slow.await, Err(TransitionError::Superseded)));
        assert_eq!(router.current().name(), "fast");
    }

    #[tokio::test]
    async fn test_unknown_reload_place() {
        let router = contacts_router();
        let err = router
            .go_to(
                "contacts.list",
                Params::new(),
                TransitionOptions::default().reload(Reload::From("missing".into())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::UnknownReloadPlace(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_href_and_includes() {
        let router = contacts_router();
        router
            .go_to("contacts.detail", params(&[("id", json!(7))]), TransitionOptions::default())
            .await
            .unwrap();

        assert_eq!(
            router.href("contacts.detail", &Params::new(), &HrefOptions::default()),
            Some("/contacts/7".to_string())
        );
        assert_eq!(
            router.href("contacts.detail", &params(&[("id", json!(9))]), &HrefOptions::default()),
            Some("/contacts/9".to_string())
        );
        assert_eq!(router.href("missing", &Params::new(), &HrefOptions::default()), None);

        assert!(router.includes("contacts", None));
        assert!(router.includes("contacts.*", None));
        assert!(router.includes("**.detail", None));
        assert!(!router.includes("contacts.list", None));
        assert!(router.includes("contacts.detail", Some(&params(&[("id", json!(7))]))));
        assert!(!router.is("contacts.detail", Some(&params(&[("id", json!(8))]))));
    }

    #[tokio::test]
    async fn test_go_to_url_skips_location_and_active_url() {
        let location = Arc::new(MemoryLocation::new());
        let router = Router::with_collaborators(
            UrlConfig::default(),
            TransitionConfig::default(),
            Arc::new(InlineTemplates),
            location.clone(),
        )
        .unwrap();
        router
            .register(PlaceDefinition::new("item").url("/items/{id:int}"))
            .unwrap();

        let active = router.go_to_url("/items/3").await.unwrap();
        assert_eq!(active.params.get("id"), Some(&json!(3)));
        assert!(location.history().is_empty());

        let first = router.active_transition();
        router.go_to_url("/items/3").await.unwrap();
        assert_eq!(router.active_transition(), first);

        assert!(matches!(
            router.go_to_url("/nothing").await,
            Err(TransitionError::NotFound { .. })
        ));
    }
}

//! Studying invocables into a plan, and running a plan.
//!
//! # Responsibilities
//! - Reject dependency cycles once, at registration
//! - Start every producer as soon as its dependencies are available
//! - Inherit values and in-flight producers from a parent resolution
//!
//! # Design Decisions
//! - Plans are immutable and reused by every transition into a place
//! - Producers are `Shared` futures so siblings and children await one run
//! - A recorded failure stops any producer body that has not started yet

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;

use crate::observability::metrics;
use crate::resolve::error::{CycleError, ResolveError};
use crate::resolve::invocable::{Deps, Invocable, Invocables, InvokeContext, Services, Values};
use crate::resolve::resolution::{FailureCell, Resolution, ResolutionRecord, SharedValue};

#[derive(Debug, Clone)]
struct Step {
    key: String,
    invocable: Invocable,
}

/// A studied invocable map, in dependency order.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Order `invocables` so every producer follows its dependencies.
///
/// A producer that depends on its own key binds to the parent resolution's
/// value of that name and does not count as a cycle.
pub fn study(invocables: &Invocables) -> Result<Plan, CycleError> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut steps = Vec::with_capacity(invocables.len());

    fn visit<'a>(
        key: &'a str,
        invocables: &'a Invocables,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        steps: &mut Vec<Step>,
    ) -> Result<(), CycleError> {
        match marks.get(key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|k| *k == key).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|k| k.to_string()).collect();
                path.push(key.to_string());
                return Err(CycleError { path });
            }
            None => {}
        }
        let Some((key, invocable)) = invocables.get_key_value(key) else {
            return Ok(());
        };

        marks.insert(key, Mark::Visiting);
        stack.push(key);
        for dep in invocable.dependencies() {
            if dep != key {
                visit(dep, invocables, marks, stack, steps)?;
            }
        }
        stack.pop();
        marks.insert(key, Mark::Done);
        steps.push(Step {
            key: key.clone(),
            invocable: invocable.clone(),
        });
        Ok(())
    }

    for key in invocables.keys() {
        visit(key, invocables, &mut marks, &mut stack, &mut steps)?;
    }
    Ok(Plan { steps })
}

/// Where a dependency comes from, captured when a resolution starts.
#[derive(Clone)]
struct Sources {
    locals: Arc<Values>,
    own: HashMap<String, SharedValue>,
    inherited: Arc<HashMap<String, SharedValue>>,
    known: Arc<Values>,
    services: Services,
}

impl Sources {
    /// Local > sibling > inherited > services.
    async fn lookup(&self, consumer: &str, dep: &str) -> Result<Value, ResolveError> {
        if dep != consumer {
            if let Some(value) = self.locals.get(dep) {
                return Ok(value.clone());
            }
            if let Some(handle) = self.own.get(dep) {
                return handle.clone().await;
            }
        }
        if let Some(handle) = self.inherited.get(dep) {
            return handle.clone().await;
        }
        if let Some(value) = self.known.get(dep) {
            return Ok(value.clone());
        }
        if let Some(value) = self.services.get(dep) {
            return Ok(value);
        }
        Err(ResolveError::UnknownDependency {
            name: consumer.to_string(),
            dependency: dep.to_string(),
        })
    }
}

impl Plan {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the plan.
    ///
    /// The returned resolution settles to the flat map of inherited, produced
    /// and local values (later sources win).
    pub fn resolve(
        &self,
        locals: Values,
        parent: Option<&Resolution>,
        context: InvokeContext,
        services: &Services,
    ) -> Resolution {
        if let Some(error) = parent.and_then(Resolution::failure) {
            tracing::debug!(place = %context.place, "Parent resolution failed, short-circuiting");
            return Resolution::failed(context, parent, error);
        }

        let failure = Arc::new(FailureCell::child_of(parent.map(|p| p.record.failure.clone())));
        let inherited = Arc::new(parent.map(|p| p.record.handles.clone()).unwrap_or_default());
        let mut known = parent.map(|p| (*p.known()).clone()).unwrap_or_default();
        known.extend(locals.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut sources = Sources {
            locals: Arc::new(locals),
            own: HashMap::new(),
            inherited,
            known: Arc::new(known),
            services: services.clone(),
        };

        let mut produced: Vec<(String, SharedValue)> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let handle = invoke(step, sources.clone(), context.clone(), failure.clone());
            sources.own.insert(step.key.clone(), handle.clone());
            produced.push((step.key.clone(), handle));
        }

        let mut handles = (*sources.inherited).clone();
        handles.extend(produced.iter().cloned());

        let record = Arc::new(ResolutionRecord {
            context: context.clone(),
            handles,
            known: sources.known.clone(),
            failure: failure.clone(),
        });

        let parent_settled = parent.cloned();
        let locals = sources.locals.clone();
        let settled = async move {
            let inherited = async {
                match parent_settled {
                    Some(parent) => parent.await,
                    None => Ok(Arc::new(Values::new())),
                }
            };
            let own = future::try_join_all(produced.into_iter().map(|(key, handle)| {
                handle.map(move |result| result.map(|value| (key, value)))
            }));

            match future::try_join(inherited, own).await {
                Ok((inherited, own)) => {
                    let mut values = (*inherited).clone();
                    values.extend(own);
                    values.extend(locals.iter().map(|(k, v)| (k.clone(), v.clone())));
                    Ok(Arc::new(values))
                }
                Err(error) => {
                    failure.record(error.clone());
                    Err(failure.first().unwrap_or(error))
                }
            }
        }
        .boxed()
        .shared();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(settled.clone().map(|_| ()));
        }

        Resolution { record, settled }
    }
}

fn invoke(step: &Step, sources: Sources, context: InvokeContext, failure: Arc<FailureCell>) -> SharedValue {
    let key = step.key.clone();
    let invocable = step.invocable.clone();

    let run = async move {
        if let Some(error) = failure.first() {
            return Err(error);
        }

        let result = match invocable {
            Invocable::ByName(service) => sources.services.get(&service).ok_or_else(|| {
                ResolveError::UnknownDependency {
                    name: key.clone(),
                    dependency: service.clone(),
                }
            }),
            Invocable::Function { deps, body } => {
                let mut values = Values::with_capacity(deps.len());
                let mut seen = HashSet::new();
                let mut outcome = Ok(());
                for dep in deps.iter().filter(|d| seen.insert(d.as_str())) {
                    match sources.lookup(&key, dep).await {
                        Ok(value) => {
                            values.insert(dep.clone(), value);
                        }
                        Err(error) => {
                            outcome = Err(error);
                            break;
                        }
                    }
                }
                match outcome {
                    Err(error) => Err(error),
                    Ok(()) => match failure.first() {
                        Some(error) => Err(error),
                        None => {
                            tracing::trace!(place = %context.place, resolvable = %key, "Invoking producer");
                            body(Deps::new(values, context.clone()))
                                .await
                                .map_err(|cause| ResolveError::producer(&key, cause))
                        }
                    },
                }
            }
        };

        if let Err(error) = &result {
            if failure.first().is_none() {
                tracing::warn!(
                    place = %context.place,
                    resolvable = %key,
                    error = %error,
                    "Resolution failed"
                );
                metrics::record_resolve_failure(&context.place);
            }
            failure.record(error.clone());
            if let Some(first) = failure.first() {
                return Err(first);
            }
        }
        result
    };

    let boxed: BoxFuture<'static, Result<Value, ResolveError>> = run.boxed();
    boxed.shared()
}

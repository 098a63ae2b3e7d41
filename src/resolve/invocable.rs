//! Producers, their inputs and the service registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use uuid::Uuid;

use crate::resolve::error::BoxError;

/// Resolved values by name.
pub type Values = HashMap<String, Value>;

/// Named producers, as declared by a place or view.
pub type Invocables = BTreeMap<String, Invocable>;

pub type ProducerFn = Arc<dyn Fn(Deps) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// Something that produces a value.
#[derive(Clone)]
pub enum Invocable {
    /// Look the value up in the service registry.
    ByName(String),
    /// Run `body` once every dependency is available.
    Function { deps: Vec<String>, body: ProducerFn },
}

impl Invocable {
    pub fn function<F, Fut>(deps: &[&str], body: F) -> Self
    where
        F: Fn(Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Invocable::Function {
            deps: deps.iter().map(|d| d.to_string()).collect(),
            body: Arc::new(move |deps| body(deps).boxed()),
        }
    }

    /// A producer that always yields `value`.
    pub fn value(value: Value) -> Self {
        Invocable::Function {
            deps: Vec::new(),
            body: Arc::new(move |_| {
                let value = value.clone();
                async move { Ok(value) }.boxed()
            }),
        }
    }

    pub fn by_name(service: impl Into<String>) -> Self {
        Invocable::ByName(service.into())
    }

    pub fn dependencies(&self) -> &[String] {
        match self {
            Invocable::ByName(_) => &[],
            Invocable::Function { deps, .. } => deps,
        }
    }
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocable::ByName(name) => f.debug_tuple("ByName").field(name).finish(),
            Invocable::Function { deps, .. } => f.debug_struct("Function").field("deps", deps).finish(),
        }
    }
}

/// Who is asking for a value.
#[derive(Debug, Clone, Default)]
pub struct InvokeContext {
    /// Name of the place being resolved.
    pub place: String,
    pub transition: Option<Uuid>,
}

impl InvokeContext {
    pub fn new(place: impl Into<String>, transition: Option<Uuid>) -> Self {
        Self {
            place: place.into(),
            transition,
        }
    }
}

/// Inputs handed to a producer body.
#[derive(Debug, Clone)]
pub struct Deps {
    values: Values,
    context: InvokeContext,
}

impl Deps {
    pub(crate) fn new(values: Values, context: InvokeContext) -> Self {
        Self { values, context }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Like `get`, as an error a producer can propagate with `?`.
    pub fn require(&self, name: &str) -> Result<&Value, BoxError> {
        self.values
            .get(name)
            .ok_or_else(|| format!("missing dependency '{name}'").into())
    }

    pub fn context(&self) -> &InvokeContext {
        &self.context
    }

    pub fn values(&self) -> &Values {
        &self.values
    }
}

/// Named values available to every resolution as a last resort.
#[derive(Debug, Clone, Default)]
pub struct Services(Arc<DashMap<String, Value>>);

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).map(|v| v.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.remove(name).map(|(_, v)| v)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.0.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

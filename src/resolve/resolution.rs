//! The awaitable result of running a plan.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde_json::Value;

use crate::resolve::error::ResolveError;
use crate::resolve::invocable::{InvokeContext, Values};

pub(crate) type Settled = Result<Arc<Values>, ResolveError>;
pub(crate) type SharedValue = Shared<BoxFuture<'static, Result<Value, ResolveError>>>;

/// First-failure-wins slot, linked to the parent resolution's slot.
#[derive(Debug, Default)]
pub(crate) struct FailureCell {
    failure: Mutex<Option<ResolveError>>,
    parent: Option<Arc<FailureCell>>,
}

impl FailureCell {
    pub(crate) fn child_of(parent: Option<Arc<FailureCell>>) -> Self {
        Self {
            failure: Mutex::new(None),
            parent,
        }
    }

    /// Record a failure unless one is already recorded here.
    pub(crate) fn record(&self, error: ResolveError) {
        if let Ok(mut slot) = self.failure.lock() {
            if slot.is_none() {
                *slot = Some(error);
            }
        }
    }

    fn own(&self) -> Option<ResolveError> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }

    /// The first failure recorded in this cell or any ancestor.
    pub(crate) fn first(&self) -> Option<ResolveError> {
        let mut cell = Some(self);
        while let Some(current) = cell {
            if let Some(error) = current.own() {
                return Some(error);
            }
            cell = current.parent.as_deref();
        }
        None
    }
}

/// In-flight and settled state of one resolution.
pub struct ResolutionRecord {
    pub(crate) context: InvokeContext,
    /// In-flight producers, own and inherited.
    pub(crate) handles: HashMap<String, SharedValue>,
    /// Values known without awaiting: inherited settled values and locals.
    pub(crate) known: Arc<Values>,
    pub(crate) failure: Arc<FailureCell>,
}

impl std::fmt::Debug for ResolutionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionRecord")
            .field("context", &self.context)
            .field("handles", &self.handles.keys().collect::<Vec<_>>())
            .field("known", &self.known.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A resolution in progress. Await it (or a clone) for the flat value map.
#[derive(Clone)]
pub struct Resolution {
    pub(crate) record: Arc<ResolutionRecord>,
    pub(crate) settled: Shared<BoxFuture<'static, Settled>>,
}

impl Resolution {
    /// A resolution that has already failed.
    pub(crate) fn failed(context: InvokeContext, parent: Option<&Resolution>, error: ResolveError) -> Self {
        let failure = Arc::new(FailureCell::child_of(parent.map(|p| p.record.failure.clone())));
        failure.record(error.clone());
        let record = Arc::new(ResolutionRecord {
            context,
            handles: HashMap::new(),
            known: Arc::new(Values::new()),
            failure,
        });
        let settled = futures_util::future::ready(Err(error)).boxed().shared();
        // Drive the ready future once so `peek` sees the failure immediately.
        let _ = settled.clone().now_or_never();
        Self { record, settled }
    }

    /// The settled values, if resolution finished successfully.
    pub fn values(&self) -> Option<Arc<Values>> {
        match self.settled.peek() {
            Some(Ok(values)) => Some(values.clone()),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values().and_then(|values| values.get(name).cloned())
    }

    /// The first failure seen by this resolution or its ancestors.
    pub fn failure(&self) -> Option<ResolveError> {
        match self.settled.peek() {
            Some(Err(error)) => Some(error.clone()),
            _ => self.record.failure.first(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled.peek().is_some()
    }

    pub fn context(&self) -> &InvokeContext {
        &self.record.context
    }

    /// True when both handles refer to the same resolution.
    pub fn ptr_eq(&self, other: &Resolution) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }

    /// What a child may use without awaiting this resolution.
    pub(crate) fn known(&self) -> Arc<Values> {
        self.values().unwrap_or_else(|| self.record.known.clone())
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("record", &self.record)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Future for Resolution {
    type Output = Settled;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.settled.poll_unpin(cx)
    }
}

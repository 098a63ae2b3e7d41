//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Notify;

use waypoint::config::{TransitionConfig, UrlConfig};
use waypoint::place::InlineTemplates;
use waypoint::resolve::BoxError;
use waypoint::transition::{
    MemoryLocation, NotFoundDecision, PlaceRef, Redirect, StartDecision, TransitionInfo,
    TransitionObserver,
};
use waypoint::{Invocable, Params, Router, TransitionError};

/// Build a params map from pairs.
pub fn params(pairs: &[(&str, Value)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A router with in-memory history the test can inspect.
pub fn router_with_history() -> (Arc<Router>, Arc<MemoryLocation>) {
    let location = Arc::new(MemoryLocation::new());
    let router = Router::with_collaborators(
        UrlConfig::default(),
        TransitionConfig::default(),
        Arc::new(InlineTemplates),
        location.clone(),
    )
    .unwrap();
    (router, location)
}

/// A producer that counts its invocations and returns `value`.
pub fn counting(counter: &Arc<AtomicUsize>, value: Value) -> Invocable {
    let counter = counter.clone();
    Invocable::function(&[], move |_| {
        let counter = counter.clone();
        let value = value.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(value)
        }
    })
}

/// A producer that waits until `gate` is notified.
pub fn gated(gate: &Arc<Notify>, value: Value) -> Invocable {
    let gate = gate.clone();
    Invocable::function(&[], move |_| {
        let gate = gate.clone();
        let value = value.clone();
        async move {
            gate.notified().await;
            Ok::<_, BoxError>(value)
        }
    })
}

/// A producer that always fails with `message`.
pub fn failing(message: &'static str) -> Invocable {
    Invocable::function(&[], move |_| async move {
        Err::<Value, BoxError>(message.into())
    })
}

/// Records every notification it receives; optionally prevents starts.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
    pub prevent_to: Option<String>,
}

impl Recorder {
    pub fn preventing(place: &str) -> Self {
        Self {
            events: Mutex::default(),
            prevent_to: Some(place.to_string()),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl TransitionObserver for Recorder {
    fn on_start(&self, info: &TransitionInfo) -> StartDecision {
        self.push(format!("start:{}", info.to));
        if self.prevent_to.as_deref() == Some(info.to.as_str()) {
            StartDecision::Prevent
        } else {
            StartDecision::Continue
        }
    }

    fn on_success(&self, info: &TransitionInfo) {
        self.push(format!("success:{}", info.to));
    }

    fn on_cancel(&self, info: &TransitionInfo) {
        self.push(format!("cancel:{}", info.to));
    }

    fn on_error(&self, info: &TransitionInfo, error: &TransitionError) {
        self.push(format!("error:{}:{error}", info.to));
    }

    fn on_not_found(&self, redirect: &mut Redirect, _from: &PlaceRef) -> NotFoundDecision {
        self.push(format!("not_found:{}", redirect.to));
        NotFoundDecision::Continue
    }
}

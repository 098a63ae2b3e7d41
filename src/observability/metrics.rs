//! Metrics collection.
//!
//! # Metrics
//! - `waypoint_transitions_total` (counter): transitions by `outcome`
//! - `waypoint_transition_duration_seconds` (histogram): start to settle
//! - `waypoint_resolve_failures_total` (counter): failed resolutions by `place`
//! - `waypoint_registered_places` (gauge): registered places, root excluded
//!
//! # Design Decisions
//! - Outcome labels are a closed set (see `Outcome`)
//! - Recording can be switched off globally from configuration

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// How a transition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Noop,
    NotFound,
    Invalid,
    Prevented,
    Superseded,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Noop => "noop",
            Outcome::NotFound => "not_found",
            Outcome::Invalid => "invalid",
            Outcome::Prevented => "prevented",
            Outcome::Superseded => "superseded",
            Outcome::Failed => "failed",
        }
    }
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn record_transition(outcome: Outcome, started: Instant) {
    if !enabled() {
        return;
    }
    metrics::counter!("waypoint_transitions_total", "outcome" => outcome.as_str()).increment(1);
    metrics::histogram!("waypoint_transition_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}

pub fn record_resolve_failure(place: &str) {
    if !enabled() {
        return;
    }
    metrics::counter!("waypoint_resolve_failures_total", "place" => place.to_string()).increment(1);
}

pub fn set_registered_places(count: usize) {
    if !enabled() {
        return;
    }
    metrics::gauge!("waypoint_registered_places").set(count as f64);
}

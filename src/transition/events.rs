//! Transition notifications: observer hooks and broadcast events.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::place::{Place, PlaceLocals};
use crate::resolve::BoxError;
use crate::url::Params;

use super::error::TransitionError;
use super::options::TransitionOptions;

/// A place together with the parameters it is (or would be) active with.
#[derive(Debug, Clone)]
pub struct PlaceRef {
    pub place: Arc<Place>,
    pub params: Params,
}

impl PlaceRef {
    pub fn name(&self) -> &str {
        self.place.name()
    }

    pub fn locals(&self) -> Option<Arc<PlaceLocals>> {
        self.place.locals()
    }
}

/// What observers and subscribers learn about a transition.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    pub id: Uuid,
    pub to: String,
    pub to_params: Params,
    pub from: String,
    pub from_params: Params,
    pub options: TransitionOptions,
}

/// Passive notification sent on the router's broadcast channel.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    Start(TransitionInfo),
    Success(TransitionInfo),
    Cancel(TransitionInfo),
    Error {
        info: TransitionInfo,
        error: TransitionError,
    },
    NotFound {
        to: String,
        from: String,
    },
}

/// An observer's answer to a start notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    Continue,
    Prevent,
}

/// The target of a not-found notification; observers may rewrite it.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub to: String,
    pub params: Params,
    pub options: TransitionOptions,
}

/// An observer's answer to a not-found notification.
pub enum NotFoundDecision {
    /// Look the (possibly rewritten) target up once more.
    Continue,
    /// Abort the transition.
    Prevent,
    /// Retry once the future completes, e.g. after registering places lazily.
    Retry(BoxFuture<'static, Result<(), BoxError>>),
}

/// Active transition observer. Every hook has a no-op default.
pub trait TransitionObserver: Send + Sync {
    fn on_start(&self, _info: &TransitionInfo) -> StartDecision {
        StartDecision::Continue
    }

    fn on_success(&self, _info: &TransitionInfo) {}

    fn on_cancel(&self, _info: &TransitionInfo) {}

    fn on_error(&self, _info: &TransitionInfo, _error: &TransitionError) {}

    fn on_not_found(&self, _redirect: &mut Redirect, _from: &PlaceRef) -> NotFoundDecision {
        NotFoundDecision::Continue
    }
}

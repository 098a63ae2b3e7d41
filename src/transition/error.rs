//! Transition errors.

use thiserror::Error;

use crate::resolve::ResolveError;

/// Why a transition did not commit.
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("no such place '{name}'{}", .relative.as_ref().map(|r| format!(" relative to '{r}'")).unwrap_or_default())]
    NotFound {
        name: String,
        relative: Option<String>,
    },

    #[error("invalid parameters for place '{place}'")]
    InvalidParams { place: String },

    #[error("cannot transition to abstract place '{0}'")]
    AbstractTarget(String),

    #[error("transition superseded by a newer one")]
    Superseded,

    #[error("transition prevented by an observer")]
    Prevented,

    #[error("transition aborted")]
    Aborted,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("reload place '{0}' is not registered")]
    UnknownReloadPlace(String),
}

pub type TransitionResult<T> = Result<T, TransitionError>;

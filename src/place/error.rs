//! Registration errors.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::resolve::CycleError;
use crate::url::PatternError;

/// Why a place could not be registered. These are programmer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("invalid place name '{0}': names must be non-empty and must not contain '@'")]
    InvalidName(String),

    #[error("place '{0}' is already registered")]
    Duplicate(String),

    #[error("place '{place}' has an invalid url: {source}")]
    Pattern {
        place: String,
        #[source]
        source: PatternError,
    },

    #[error("place '{place}' has an invalid resolve: {source}")]
    Cycle {
        place: String,
        #[source]
        source: CycleError,
    },

    #[error("places are waiting for unregistered parents: {}", describe_unresolved(.0))]
    UnresolvedParents(BTreeMap<String, Vec<String>>),
}

fn describe_unresolved(waiting: &BTreeMap<String, Vec<String>>) -> String {
    waiting
        .iter()
        .map(|(parent, children)| format!("'{parent}' ← [{}]", children.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_display() {
        let mut waiting = BTreeMap::new();
        waiting.insert("app".to_string(), vec!["app.home".to_string(), "app.about".to_string()]);
        let err = RegistrationError::UnresolvedParents(waiting);
        assert_eq!(
            err.to_string(),
            "places are waiting for unregistered parents: 'app' ← [app.home, app.about]"
        );
    }
}

//! Resolver errors.

use std::sync::Arc;

use thiserror::Error;

/// Error type returned by producer bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A dependency cycle found while studying an invocable map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cyclic dependency: {}", .path.join(" -> "))]
pub struct CycleError {
    /// The cycle, first key repeated at the end.
    pub path: Vec<String>,
}

/// Why a resolution failed.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("resolvable '{name}' failed: {cause}")]
    Producer {
        name: String,
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("resolvable '{name}' depends on unknown '{dependency}'")]
    UnknownDependency { name: String, dependency: String },
}

impl ResolveError {
    pub(crate) fn producer(name: &str, cause: BoxError) -> Self {
        ResolveError::Producer {
            name: name.to_string(),
            cause: Arc::from(cause),
        }
    }

    /// The resolvable whose failure this is.
    pub fn name(&self) -> &str {
        match self {
            ResolveError::Producer { name, .. } | ResolveError::UnknownDependency { name, .. } => name,
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = CycleError {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_producer_display() {
        let err = ResolveError::producer("user", "backend down".into());
        assert_eq!(err.to_string(), "resolvable 'user' failed: backend down");
        assert_eq!(err.name(), "user");
    }
}

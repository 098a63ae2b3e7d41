//! Transition and href options.

use serde::{Deserialize, Serialize};

/// How a successful transition updates the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    /// Add a history entry.
    #[default]
    Push,
    /// Replace the current history entry.
    Replace,
    /// Leave the location alone.
    Skip,
}

/// Which places are re-resolved even when unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reload {
    #[default]
    None,
    /// Reload every place on the path.
    All,
    /// Reload from the named place down.
    From(String),
}

#[derive(Debug, Clone)]
pub struct TransitionOptions {
    pub location: LocationMode,
    /// Fill missing parameters from the active ones, for shared ancestors.
    pub inherit: bool,
    /// Base place for relative target names.
    pub relative: Option<String>,
    /// Notify observers and event subscribers.
    pub notify: bool,
    pub reload: Reload,
    pub(crate) retried: bool,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            location: LocationMode::Push,
            inherit: false,
            relative: None,
            notify: true,
            reload: Reload::None,
            retried: false,
        }
    }
}

impl TransitionOptions {
    pub fn location(mut self, location: LocationMode) -> Self {
        self.location = location;
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn relative(mut self, base: impl Into<String>) -> Self {
        self.relative = Some(base.into());
        self
    }

    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn reload(mut self, reload: Reload) -> Self {
        self.reload = reload;
        self
    }

    /// True once a deferred not-found retry has been attempted.
    pub fn is_retry(&self) -> bool {
        self.retried
    }
}

/// Options for `Router::href`.
#[derive(Debug, Clone)]
pub struct HrefOptions {
    /// Fill missing parameters from the active ones.
    pub inherit: bool,
    /// Base place for relative names; defaults to the active place.
    pub relative: Option<String>,
    /// Use the nearest navigable ancestor when the place has no URL.
    pub lossy: bool,
}

impl Default for HrefOptions {
    fn default() -> Self {
        Self {
            inherit: true,
            relative: None,
            lossy: true,
        }
    }
}

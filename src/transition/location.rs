//! Address bar synchronization.

use std::fmt;
use std::sync::Mutex;

/// Receives the URL of each committed place.
pub trait LocationSync: Send + Sync + fmt::Debug {
    /// Record `url`, replacing the current entry when `replace` is set.
    fn push(&self, url: &str, replace: bool);

    /// The URL currently shown, if any.
    fn current(&self) -> Option<String>;
}

/// Keeps the history in memory.
#[derive(Debug, Default)]
pub struct MemoryLocation {
    history: Mutex<Vec<String>>,
}

impl MemoryLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl LocationSync for MemoryLocation {
    fn push(&self, url: &str, replace: bool) {
        if let Ok(mut history) = self.history.lock() {
            if replace {
                history.pop();
            }
            history.push(url.to_string());
        }
    }

    fn current(&self) -> Option<String> {
        self.history.lock().ok().and_then(|h| h.last().cloned())
    }
}

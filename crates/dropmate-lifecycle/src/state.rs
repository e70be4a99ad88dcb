//! App states and transition classification.

use dropmate_config_and_utils::{Listeners, Subscription};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Unknown app state: {0}")]
    UnknownState(String),
}

/// OS-level app state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Active => "active",
            AppState::Inactive => "inactive",
            AppState::Background => "background",
        }
    }

    pub fn is_foreground(&self) -> bool {
        matches!(self, AppState::Active)
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "foreground" => Ok(AppState::Active),
            "inactive" => Ok(AppState::Inactive),
            "background" => Ok(AppState::Background),
            other => Err(LifecycleError::UnknownState(other.to_string())),
        }
    }
}

/// The two edges the sync core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Inactive | Background -> Active`.
    ToForeground,
    /// `Active -> Inactive | Background`.
    ToBackground,
}

/// Classify a state change. Anything other than the two foreground edges,
/// including `Inactive <-> Background` and no-op changes, yields `None`.
pub fn classify(previous: AppState, next: AppState) -> Option<Transition> {
    match (previous.is_foreground(), next.is_foreground()) {
        (false, true) => Some(Transition::ToForeground),
        (true, false) => Some(Transition::ToBackground),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppStateChange {
    pub previous: AppState,
    pub current: AppState,
}

struct SourceInner {
    current: Mutex<AppState>,
    listeners: Listeners<AppStateChange>,
}

/// Where the host reports app state changes. Clones share state.
#[derive(Clone)]
pub struct AppStateSource {
    inner: Arc<SourceInner>,
}

impl AppStateSource {
    pub fn new(initial: AppState) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                current: Mutex::new(initial),
                listeners: Listeners::new(),
            }),
        }
    }

    pub fn current(&self) -> AppState {
        *self.inner.current.lock()
    }

    /// Record a new state. Subscribers hear about it only when it differs
    /// from the current one.
    pub fn set(&self, state: AppState) {
        let change = {
            let mut current = self.inner.current.lock();
            if *current == state {
                return;
            }
            let change = AppStateChange {
                previous: *current,
                current: state,
            };
            *current = state;
            change
        };
        debug!(previous = %change.previous, current = %change.current, "App state changed");
        self.inner.listeners.emit(&change);
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AppStateChange) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(handler)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl Default for AppStateSource {
    fn default() -> Self {
        Self::new(AppState::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_edges() {
        use AppState::*;
        assert_eq!(classify(Background, Active), Some(Transition::ToForeground));
        assert_eq!(classify(Inactive, Active), Some(Transition::ToForeground));
        assert_eq!(classify(Active, Background), Some(Transition::ToBackground));
        assert_eq!(classify(Active, Inactive), Some(Transition::ToBackground));
        assert_eq!(classify(Inactive, Background), None);
        assert_eq!(classify(Background, Inactive), None);
        assert_eq!(classify(Active, Active), None);
    }

    #[test]
    fn test_parse_app_state() {
        assert_eq!("Active".parse::<AppState>().unwrap(), AppState::Active);
        assert_eq!(" foreground ".parse::<AppState>().unwrap(), AppState::Active);
        assert_eq!("background".parse::<AppState>().unwrap(), AppState::Background);
        assert_eq!(
            "asleep".parse::<AppState>(),
            Err(LifecycleError::UnknownState("asleep".into()))
        );
    }

    #[test]
    fn test_source_emits_only_changes() {
        let source = AppStateSource::new(AppState::Active);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = source.subscribe(move |change| sink.lock().push(*change));

        source.set(AppState::Active);
        source.set(AppState::Background);
        source.set(AppState::Background);
        source.set(AppState::Active);

        assert_eq!(
            *seen.lock(),
            vec![
                AppStateChange {
                    previous: AppState::Active,
                    current: AppState::Background
                },
                AppStateChange {
                    previous: AppState::Background,
                    current: AppState::Active
                },
            ]
        );
        assert_eq!(source.current(), AppState::Active);
    }
}

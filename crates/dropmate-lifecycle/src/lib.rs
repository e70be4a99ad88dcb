//! App lifecycle for the sync core.
//!
//! The host platform reports app states through an [`AppStateSource`]; a
//! [`LifecycleObserver`] turns the two edges that matter (back to the
//! foreground, off to the background) into [`LifecycleEvent`]s.

mod observer;
mod state;

pub use observer::{LifecycleEvent, LifecycleObserver};
pub use state::{classify, AppState, AppStateChange, AppStateSource, LifecycleError, Transition};

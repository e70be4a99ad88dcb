//! Session management for the Dropmate sync core.
//!
//! This crate provides:
//! - An explicit FSM for session status (`Idle`, `Loading`, `Authenticated`)
//! - The [`IdentityProvider`] seam, with a REST implementation and an
//!   in-memory one for offline runs and tests
//! - [`SessionManager`]: sign-in/up/out, hydration, and a token accessor
//!   with single-flight forced refresh

mod error;
mod memory_provider;
mod provider;
mod rest_provider;
mod session;
mod session_fsm;

pub use error::{AuthError, AuthResult, ProviderError, ProviderErrorKind, ProviderResult};
pub use memory_provider::MemoryIdentityProvider;
pub use provider::IdentityProvider;
pub use rest_provider::{RefreshConfig, RestIdentityProvider, RestProviderConfig};
pub use session::{ProviderWatch, Session, SessionManager};
pub use session_fsm::session_machine;
pub use session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionStatus};

//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!            ProviderRestored
//!   ┌──────────────────────────────────────────┐
//!   │                                          ▼
//! ┌─┴──────┐  SignInAttempt  ┌─────────┐  SignInSucceeded  ┌───────────────┐
//! │  Idle  │ ──────────────► │ Loading │ ────────────────► │ Authenticated │
//! └────────┘ ◄────────────── └─────────┘                   └───────┬───────┘
//!      ▲      SignInFailed /       ▲          SignInAttempt        │
//!      │      SignOut              └───────────────────────────────┤
//!      │                                                           │
//!      └───────────────────────── SignOut ─────────────────────────┘
//! ```
//!
//! `Authenticated` also accepts `TokenRefreshed`, `ProfileUpdated` and
//! `ProviderRestored` as self-transitions.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Idle)

    Idle => {
        SignInAttempt => Loading,
        ProviderRestored => Authenticated
    },
    Loading => {
        SignInSucceeded => Authenticated,
        SignInFailed => Idle,
        SignOut => Idle
    },
    Authenticated => {
        SignInAttempt => Loading,
        TokenRefreshed => Authenticated,
        ProfileUpdated => Authenticated,
        ProviderRestored => Authenticated,
        SignOut => Idle
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Loading,
    Authenticated,
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }
}

impl From<&SessionMachineState> for SessionStatus {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Idle => SessionStatus::Idle,
            SessionMachineState::Loading => SessionStatus::Loading,
            SessionMachineState::Authenticated => SessionStatus::Authenticated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated() -> SessionMachine {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::SignInAttempt).unwrap();
        machine.consume(&SessionMachineInput::SignInSucceeded).unwrap();
        machine
    }

    #[test]
    fn test_initial_state_is_idle() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Idle);
    }

    #[test]
    fn test_sign_in_flow() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::SignInAttempt).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Loading);

        machine.consume(&SessionMachineInput::SignInSucceeded).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_sign_in_failure_returns_to_idle() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::SignInAttempt).unwrap();

        machine.consume(&SessionMachineInput::SignInFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Idle);
    }

    #[test]
    fn test_cannot_succeed_without_attempt() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::SignInSucceeded).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Idle);
    }

    #[test]
    fn test_token_refresh_keeps_authenticated() {
        let mut machine = authenticated();
        machine.consume(&SessionMachineInput::TokenRefreshed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_token_refresh_rejected_when_idle() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::TokenRefreshed).is_err());
    }

    #[test]
    fn test_provider_restore_from_idle() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::ProviderRestored).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_provider_restore_rejected_while_loading() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::SignInAttempt).unwrap();
        assert!(machine.consume(&SessionMachineInput::ProviderRestored).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Loading);
    }

    #[test]
    fn test_sign_out_from_authenticated_and_loading() {
        let mut machine = authenticated();
        machine.consume(&SessionMachineInput::SignOut).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Idle);

        machine.consume(&SessionMachineInput::SignInAttempt).unwrap();
        machine.consume(&SessionMachineInput::SignOut).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Idle);
    }

    #[test]
    fn test_sign_out_rejected_when_idle() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::SignOut).is_err());
    }

    #[test]
    fn test_session_status_conversion() {
        assert_eq!(
            SessionStatus::from(&SessionMachineState::Idle),
            SessionStatus::Idle
        );
        assert_eq!(
            SessionStatus::from(&SessionMachineState::Loading),
            SessionStatus::Loading
        );
        assert_eq!(
            SessionStatus::from(&SessionMachineState::Authenticated),
            SessionStatus::Authenticated
        );
        assert!(SessionStatus::Authenticated.is_authenticated());
        assert!(!SessionStatus::Loading.is_authenticated());
    }
}

//! Session state machine using rust-fsm.
//!
//! ```text
//!            ┌───────────┐
//!            │  Loading  │ (initial)
//!            └─────┬─────┘
//!   NothingStored  │  Rehydrated / Login
//!        ┌─────────┴──────────┐
//!        ▼                    ▼
//! ┌─────────────┐  Login  ┌─────────────┐
//! │  SignedOut  │ ──────► │  SignedIn   │ ◄──┐
//! └─────────────┘ ◄────── └──────┬──────┘    │
//!        ▲          Logout       │           │ RefreshSucceeded
//!        │                       │ RefreshStarted
//!        │  RefreshFailed        ▼           │
//!        │                ┌─────────────┐    │
//!        └─────────────── │ Refreshing  │ ───┘
//!                         └─────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Loading)

    Loading => {
        Rehydrated => SignedIn,
        NothingStored => SignedOut,
        Login => SignedIn,
        Logout => SignedOut
    },
    SignedOut => {
        Login => SignedIn,
        Logout => SignedOut
    },
    SignedIn => {
        Login => SignedIn,
        Logout => SignedOut,
        RefreshStarted => Refreshing
    },
    Refreshing => {
        RefreshSucceeded => SignedIn,
        RefreshFailed => SignedOut,
        Login => SignedIn,
        Logout => SignedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Persisted session not yet read.
    Loading,
    SignedOut,
    SignedIn,
    /// A refresh is in flight; the previous token is still in use.
    Refreshing,
}

impl AuthState {
    /// Returns true while an operation is pending.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthState::Loading | AuthState::Refreshing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Loading => "loading",
            AuthState::SignedOut => "signed_out",
            AuthState::SignedIn => "signed_in",
            AuthState::Refreshing => "refreshing",
        }
    }
}

impl From<&SessionMachineState> for AuthState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Loading => AuthState::Loading,
            SessionMachineState::SignedOut => AuthState::SignedOut,
            SessionMachineState::SignedIn => AuthState::SignedIn,
            SessionMachineState::Refreshing => AuthState::Refreshing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_loading() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Loading);
    }

    #[test]
    fn test_rehydrate_flow() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::Rehydrated).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedIn);
    }

    #[test]
    fn test_nothing_stored_then_login() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::NothingStored).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);

        machine.consume(&SessionMachineInput::Login).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedIn);
    }

    #[test]
    fn test_refresh_success_and_failure() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::Rehydrated).unwrap();

        machine.consume(&SessionMachineInput::RefreshStarted).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Refreshing);
        machine.consume(&SessionMachineInput::RefreshSucceeded).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedIn);

        machine.consume(&SessionMachineInput::RefreshStarted).unwrap();
        machine.consume(&SessionMachineInput::RefreshFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut machine = SessionMachine::new();

        // Refresh cannot start before the persisted session was read
        assert!(machine.consume(&SessionMachineInput::RefreshStarted).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Loading);

        machine.consume(&SessionMachineInput::NothingStored).unwrap();
        assert!(machine.consume(&SessionMachineInput::Rehydrated).is_err());
        assert!(machine.consume(&SessionMachineInput::RefreshSucceeded).is_err());

        // Nothing to refresh without a session
        assert!(machine.consume(&SessionMachineInput::RefreshStarted).is_err());
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_auth_state_mapping() {
        assert_eq!(AuthState::from(&SessionMachineState::Loading), AuthState::Loading);
        assert_eq!(AuthState::from(&SessionMachineState::Refreshing), AuthState::Refreshing);
        assert!(AuthState::Loading.is_transient());
        assert!(!AuthState::SignedIn.is_transient());
        assert_eq!(AuthState::SignedOut.as_str(), "signed_out");
    }
}

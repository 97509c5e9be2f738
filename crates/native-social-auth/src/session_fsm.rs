//! Per-attempt session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌──────────┐ Begin  ┌────────────┐ SdkOpened ┌──────────────────────────┐
//! │   Idle   │ ─────► │ Requesting │ ────────► │ AwaitingExternalCallback │
//! └──────────┘        └─────┬──────┘           └────────────┬─────────────┘
//!                           │ SdkOpenFailed                 │ NativeSucceeded
//!                           ▼                               ▼
//!                      ┌────────┐  ExchangeFailed    ┌────────────┐
//!                      │ Failed │ ◄───────────────── │ Exchanging │
//!                      └────────┘                    └─────┬──────┘
//!                           ▲ NativeFailed /               │ ExchangeSucceeded
//!                           │ CallbackTimedOut /           ▼
//!                           │ GrantRejected          ┌───────────┐
//!                                                    │ Completed │
//!                                                    └───────────┘
//!
//!  Cancel: any non-terminal state ──► Cancelled
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Idle)

    Idle => {
        Begin => Requesting,
        Cancel => Cancelled
    },
    Requesting => {
        SdkOpened => AwaitingExternalCallback,
        SdkOpenFailed => Failed,
        Cancel => Cancelled
    },
    AwaitingExternalCallback => {
        NativeSucceeded => Exchanging,
        NativeCancelled => Cancelled,
        NativeFailed => Failed,
        GrantRejected => Failed,
        CallbackTimedOut => Failed,
        Cancel => Cancelled
    },
    Exchanging => {
        ExchangeSucceeded => Completed,
        ExchangeFailed => Failed,
        Cancel => Cancelled
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session state of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Requesting,
    AwaitingExternalCallback,
    Exchanging,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    /// Completed, Cancelled, and Failed end an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// True while an attempt is running.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SessionState::Requesting
                | SessionState::AwaitingExternalCallback
                | SessionState::Exchanging
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Idle => SessionState::Idle,
            SessionMachineState::Requesting => SessionState::Requesting,
            SessionMachineState::AwaitingExternalCallback => SessionState::AwaitingExternalCallback,
            SessionMachineState::Exchanging => SessionState::Exchanging,
            SessionMachineState::Completed => SessionState::Completed,
            SessionMachineState::Cancelled => SessionState::Cancelled,
            SessionMachineState::Failed => SessionState::Failed,
        }
    }
}

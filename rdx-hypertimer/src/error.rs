//! Error types reported by timers and the engine.

use crate::common::TimerId;
use crate::components::timer::TimerState;

/// Errors returned synchronously by timer and engine operations.
///
/// Every variant is a caller precondition violation. A failed call never
/// changes the state of the timer it was made on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// The operation is not permitted from the timer's current state.
    #[error("cannot {operation} a timer that is {state}")]
    InvalidState {
        operation: &'static str,
        state: TimerState,
    },
    /// The timer's duration/interval combination was rejected at construction.
    #[error("invalid timer configuration: {0}")]
    InvalidConfiguration(String),
    /// No timer is registered under this id.
    #[error("unknown timer {0:?}")]
    UnknownTimer(TimerId),
}

pub type Result<T, E = TimerError> = std::result::Result<T, E>;

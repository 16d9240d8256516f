//! Defines all public event types broadcast by the Hypertimer engine.
//!
//! A standalone `Timer` reports to its `TimerObserver` directly. Timers
//! registered with a `TimerEngine` have their notifications translated into
//! these strongly-typed events and broadcast to every subscriber.

use crate::common::{Millis, TimerId};

/// A single notification emitted by a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEventKind {
    /// The timer transitioned from Idle to Running.
    Started,
    /// A periodic tick. `remaining_millis` is `None` for unbounded timers.
    Tick {
        elapsed_millis: Millis,
        remaining_millis: Option<Millis>,
    },
    /// The timer was paused with this much time elapsed.
    Paused { elapsed_millis: Millis },
    /// The timer resumed from a pause with this much time elapsed.
    Resumed { elapsed_millis: Millis },
    /// A bounded timer reached its total duration.
    Finished,
    /// The timer was cancelled before finishing.
    Cancelled,
}

/// A timer notification tagged with the id of the engine timer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub timer_id: TimerId,
    pub kind: TimerEventKind,
}

/// Events related to the engine's registry of timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// Fired when a new timer is registered with the engine.
    TimerCreated { id: TimerId },
    /// Fired when a timer is removed from the engine.
    TimerRemoved { id: TimerId },
}

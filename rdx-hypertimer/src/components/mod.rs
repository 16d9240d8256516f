//! Contains the building blocks the engine is made of.
//!
//! `timer` holds the per-timer state machine; `observer` defines how a timer
//! reports its progress. `tick` is a standalone one-shot delayed tick on the
//! same time source. The `TimerEngine` manages a collection of timers built
//! from these components.

pub mod observer;
pub mod tick;
pub mod timer;

//! Contains common, primitive types shared across the crate.
//!
//! This module defines the key types used to identify timers registered with
//! the engine and callbacks queued on a time source. Using distinct key types
//! keeps a `ScheduleHandle` from ever being mistaken for a `TimerId`.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a timer registered with a `TimerEngine`.
    ///
    /// Keys are generational: once a timer is removed, its id is never
    /// resolved to a different timer, preventing stale ID bugs.
    pub struct TimerId;

    /// Identifies a callback queued on a `TimeSource`.
    ///
    /// Passing the handle back to `TimeSource::cancel` guarantees the callback
    /// will not run, even if its deadline has already passed.
    pub struct ScheduleHandle;
}

/// A point or span on a time source's monotonic timeline, in milliseconds.
pub type Millis = u64;

//! The time source abstraction every timer is driven by.
//!
//! A `TimeSource` provides two capabilities: reading a monotonic clock and
//! scheduling a cancellable callback after a delay. All callbacks scheduled on
//! one source are delivered on a single delivery context, one at a time, so
//! ticks of timers sharing a source never run concurrently.
//!
//! Two implementations are provided:
//!
//! - [`ManualTimeSource`]: a virtual clock advanced explicitly by the caller.
//!   Tick sequences become fully deterministic, which is what the test suite
//!   relies on.
//! - [`TokioTimeSource`]: backed by `tokio::time`, with a dedicated delivery
//!   task that sleeps until the earliest pending deadline.

mod manual;
pub(crate) mod queue;
mod realtime;

pub use manual::ManualTimeSource;
pub use realtime::TokioTimeSource;

use crate::common::{Millis, ScheduleHandle};

/// A callback queued on a time source. It runs at most once.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// A provider of monotonic time and delayed, cancellable callbacks.
pub trait TimeSource: Send + Sync {
    /// Current monotonic time, in milliseconds since an arbitrary origin.
    fn now(&self) -> Millis;

    /// Queues `callback` to run on the delivery context once `delay_millis`
    /// have passed.
    fn schedule_after(&self, delay_millis: Millis, callback: Callback) -> ScheduleHandle;

    /// Cancels a queued callback.
    ///
    /// Returns `true` if the callback was still pending. Once this returns,
    /// the callback is guaranteed never to run.
    fn cancel(&self, handle: ScheduleHandle) -> bool;
}

use super::queue::DelayQueue;
use super::{Callback, TimeSource};
use crate::common::{Millis, ScheduleHandle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

struct ManualState {
    now: Millis,
    queue: DelayQueue,
}

/// A virtual clock that only moves when told to.
///
/// Callbacks are delivered on the thread calling [`advance`](Self::advance)
/// or [`advance_to`](Self::advance_to), in deadline order. Before each
/// callback runs, the virtual `now` is set to that callback's deadline, so a
/// timer observes exactly the instant its tick was due.
pub struct ManualTimeSource {
    state: Mutex<ManualState>,
}

impl ManualTimeSource {
    /// Creates a virtual clock starting at time zero.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a virtual clock starting at `now`.
    pub fn starting_at(now: Millis) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now,
                queue: DelayQueue::new(),
            }),
        }
    }

    /// Moves the clock forward by `delta_millis`, delivering every callback
    /// that falls due on the way, including ones scheduled by earlier callbacks.
    pub fn advance(&self, delta_millis: Millis) {
        let target = self.now().saturating_add(delta_millis);
        self.advance_to(target);
    }

    /// Moves the clock forward to `target`. Does nothing if `target` is in the past.
    pub fn advance_to(&self, target: Millis) {
        loop {
            let due = {
                let mut state = self.lock();
                if target < state.now {
                    return;
                }
                match state.queue.pop_due(target) {
                    Some((deadline, callback)) => {
                        state.now = state.now.max(deadline);
                        Some((state.now, callback))
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            // Callbacks run with the lock released; they usually reschedule.
            match due {
                Some((at, callback)) => {
                    trace!("Delivering virtual callback at {}ms.", at);
                    callback();
                }
                None => return,
            }
        }
    }

    /// Number of callbacks still waiting to be delivered.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Deadline of the earliest pending callback, if any.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.lock().queue.next_deadline()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Millis {
        self.lock().now
    }

    fn schedule_after(&self, delay_millis: Millis, callback: Callback) -> ScheduleHandle {
        let mut state = self.lock();
        let deadline = state.now.saturating_add(delay_millis);
        state.queue.insert(deadline, callback)
    }

    fn cancel(&self, handle: ScheduleHandle) -> bool {
        self.lock().queue.remove(handle)
    }
}

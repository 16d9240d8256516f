use super::queue::DelayQueue;
use super::{Callback, TimeSource};
use crate::common::{Millis, ScheduleHandle};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// A time source backed by the tokio timer.
///
/// Time is measured from the moment the source was created, using
/// `tokio::time::Instant`, so it also follows a paused test clock.
/// Callbacks are only delivered while [`run`](Self::run) is being polled;
/// that single task is the delivery context for every timer sharing the
/// source.
pub struct TokioTimeSource {
    origin: Instant,
    queue: Mutex<DelayQueue>,
    wakeup: Notify,
}

impl TokioTimeSource {
    /// Creates a new source. Spawn [`run`](Self::run) to start delivery.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            queue: Mutex::new(DelayQueue::new()),
            wakeup: Notify::new(),
        }
    }

    /// Runs the delivery loop until a shutdown signal is received.
    ///
    /// The loop sleeps until the earliest pending deadline and is woken early
    /// whenever the queue changes.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("TokioTimeSource delivery loop started.");
        loop {
            let next_deadline = self.lock().next_deadline();
            let sleep_until = self.instant_at(next_deadline.unwrap_or_default());
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = self.wakeup.notified() => continue,
                _ = tokio::time::sleep_until(sleep_until), if next_deadline.is_some() => {
                    self.deliver_due();
                }
            }
        }
        let abandoned = self.lock().len();
        if abandoned > 0 {
            debug!("Delivery loop stopping with {} callbacks still pending.", abandoned);
        }
        info!("TokioTimeSource delivery loop has shut down.");
    }

    /// Number of callbacks still waiting to be delivered.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn deliver_due(&self) {
        let now = self.now();
        loop {
            // Pop under the lock, run outside it: callbacks reschedule.
            let due = self.lock().pop_due(now);
            match due {
                Some((deadline, callback)) => {
                    trace!("Delivering callback due at {}ms (now {}ms).", deadline, now);
                    callback();
                }
                None => break,
            }
        }
    }

    fn instant_at(&self, millis: Millis) -> Instant {
        self.origin + Duration::from_millis(millis)
    }

    fn lock(&self) -> MutexGuard<'_, DelayQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TokioTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioTimeSource {
    fn now(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }

    fn schedule_after(&self, delay_millis: Millis, callback: Callback) -> ScheduleHandle {
        let deadline = self.now().saturating_add(delay_millis);
        let handle = self.lock().insert(deadline, callback);
        self.wakeup.notify_one();
        handle
    }

    fn cancel(&self, handle: ScheduleHandle) -> bool {
        let removed = self.lock().remove(handle);
        if removed {
            self.wakeup.notify_one();
        }
        removed
    }
}

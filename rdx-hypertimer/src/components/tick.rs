//! A one-shot, retriggerable delayed tick.
//!
//! `DelayedTick` fires its listener once, `delay_millis` after it is armed.
//! While a tick is pending, arming it again is ignored unless the caller asks
//! to restart the delay. Every delivered tick increments a counter that is
//! passed to the listener, and the counter survives `cancel`.

use crate::common::{Millis, ScheduleHandle};
use crate::time::TimeSource;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Called with the running fire count each time a `DelayedTick` fires.
pub type TickListener = Arc<dyn Fn(u64) + Send + Sync>;

pub struct DelayedTick {
    shared: Arc<TickShared>,
}

struct TickShared {
    source: Arc<dyn TimeSource>,
    delay_millis: Millis,
    core: Mutex<TickCore>,
}

struct TickCore {
    pending: Option<ScheduleHandle>,
    generation: u64,
    count: u64,
    listener: Option<TickListener>,
}

impl DelayedTick {
    pub fn new(delay_millis: Millis, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            shared: Arc::new(TickShared {
                source: time_source,
                delay_millis,
                core: Mutex::new(TickCore {
                    pending: None,
                    generation: 0,
                    count: 0,
                    listener: None,
                }),
            }),
        }
    }

    /// Registers the listener, replacing any previous one.
    pub fn set_listener(&self, listener: impl Fn(u64) + Send + Sync + 'static) {
        self.shared.lock().listener = Some(Arc::new(listener));
    }

    pub fn clear_listener(&self) {
        self.shared.lock().listener = None;
    }

    /// Arms the tick. Returns `false` and does nothing if one is already pending.
    pub fn tick(&self) -> bool {
        let mut core = self.shared.lock();
        if core.pending.is_some() {
            trace!("Tick already pending; ignoring.");
            return false;
        }
        self.shared.arm(&mut core);
        true
    }

    /// Arms the tick, cancelling a pending one so the full delay starts over.
    pub fn restart(&self) {
        let mut core = self.shared.lock();
        self.shared.cancel_pending(&mut core);
        self.shared.arm(&mut core);
    }

    /// Cancels the pending tick. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        let mut core = self.shared.lock();
        self.shared.cancel_pending(&mut core)
    }

    /// How many times the tick has fired so far.
    pub fn count(&self) -> u64 {
        self.shared.lock().count
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    pub fn delay_millis(&self) -> Millis {
        self.shared.delay_millis
    }
}

impl Drop for DelayedTick {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for DelayedTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.lock();
        f.debug_struct("DelayedTick")
            .field("delay_millis", &self.shared.delay_millis)
            .field("count", &core.count)
            .field("pending", &core.pending.is_some())
            .finish()
    }
}

impl TickShared {
    fn lock(&self) -> MutexGuard<'_, TickCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(self: &Arc<Self>, core: &mut TickCore) {
        core.generation = core.generation.wrapping_add(1);
        let generation = core.generation;
        let weak = Arc::downgrade(self);
        let handle = self.source.schedule_after(
            self.delay_millis,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_fired(generation);
                }
            }),
        );
        core.pending = Some(handle);
        debug!("Delayed tick armed for {}ms.", self.delay_millis);
    }

    fn cancel_pending(&self, core: &mut TickCore) -> bool {
        match core.pending.take() {
            Some(handle) => {
                self.source.cancel(handle);
                true
            }
            None => false,
        }
    }

    fn on_fired(&self, generation: u64) {
        let (listener, count) = {
            let mut core = self.lock();
            if core.pending.is_none() || core.generation != generation {
                trace!("Ignoring stale delayed tick (generation {}).", generation);
                return;
            }
            core.pending = None;
            core.count += 1;
            (core.listener.clone(), core.count)
        };
        trace!("Delayed tick fired (count {}).", count);
        if let Some(listener) = listener {
            listener(count);
        }
    }
}

//! The observer contract through which a timer reports its progress.

use crate::common::{Millis, TimerId};
use crate::events::{TimerEvent, TimerEventKind};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Receives notifications from a single timer.
///
/// Methods are called synchronously on the time source's delivery context
/// (or on the caller's thread for `start`/`pause`/`resume`/`cancel`). They
/// must not block for long: every other timer sharing the source waits
/// behind them. Observers may call back into the timer that notified them.
pub trait TimerObserver: Send + Sync {
    /// A periodic tick. `remaining_millis` is `None` for unbounded timers.
    fn on_tick(&self, elapsed_millis: Millis, remaining_millis: Option<Millis>);

    /// A bounded timer reached its total duration. Called exactly once per run.
    fn on_finish(&self);

    /// The timer was cancelled.
    fn on_cancel(&self);

    fn on_start(&self) {}

    fn on_pause(&self, _elapsed_millis: Millis) {}

    fn on_resume(&self, _elapsed_millis: Millis) {}
}

/// Routes one notification to the matching observer method.
pub(crate) fn dispatch(observer: &dyn TimerObserver, kind: TimerEventKind) {
    match kind {
        TimerEventKind::Started => observer.on_start(),
        TimerEventKind::Tick {
            elapsed_millis,
            remaining_millis,
        } => observer.on_tick(elapsed_millis, remaining_millis),
        TimerEventKind::Paused { elapsed_millis } => observer.on_pause(elapsed_millis),
        TimerEventKind::Resumed { elapsed_millis } => observer.on_resume(elapsed_millis),
        TimerEventKind::Finished => observer.on_finish(),
        TimerEventKind::Cancelled => observer.on_cancel(),
    }
}

/// Forwards a timer's notifications onto a broadcast channel as `TimerEvent`s.
///
/// This is how the engine exposes every registered timer through a single
/// `subscribe_timer_events` stream. Send errors (no subscribers) are ignored.
pub struct BroadcastObserver {
    timer_id: TimerId,
    sender: broadcast::Sender<TimerEvent>,
}

impl BroadcastObserver {
    pub fn new(timer_id: TimerId, sender: broadcast::Sender<TimerEvent>) -> Arc<Self> {
        Arc::new(Self { timer_id, sender })
    }

    fn publish(&self, kind: TimerEventKind) {
        self.sender
            .send(TimerEvent {
                timer_id: self.timer_id,
                kind,
            })
            .ok();
    }
}

impl TimerObserver for BroadcastObserver {
    fn on_tick(&self, elapsed_millis: Millis, remaining_millis: Option<Millis>) {
        self.publish(TimerEventKind::Tick {
            elapsed_millis,
            remaining_millis,
        });
    }

    fn on_finish(&self) {
        self.publish(TimerEventKind::Finished);
    }

    fn on_cancel(&self) {
        self.publish(TimerEventKind::Cancelled);
    }

    fn on_start(&self) {
        self.publish(TimerEventKind::Started);
    }

    fn on_pause(&self, elapsed_millis: Millis) {
        self.publish(TimerEventKind::Paused { elapsed_millis });
    }

    fn on_resume(&self, elapsed_millis: Millis) {
        self.publish(TimerEventKind::Resumed { elapsed_millis });
    }
}

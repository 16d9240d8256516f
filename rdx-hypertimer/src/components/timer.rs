//! The countdown / count-up timer state machine.
//!
//! A `Timer` moves through `Idle -> Running -> {Paused, Finished, Cancelled}`
//! and `Paused -> {Running, Cancelled}`. `Finished` and `Cancelled` are
//! terminal until `reset` returns the timer to `Idle`.
//!
//! Elapsed time is always derived from the time source's clock, never from
//! counting ticks. Scheduler latency therefore only affects *when* a tick is
//! delivered, never the elapsed value it reports.

use crate::common::{Millis, ScheduleHandle};
use crate::components::observer::{dispatch, TimerObserver};
use crate::error::{Result, TimerError};
use crate::events::TimerEventKind;
use crate::time::TimeSource;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// The lifecycle state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Finished,
    Cancelled,
}

impl TimerState {
    /// `Finished` and `Cancelled` accept no further progress without a reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, TimerState::Finished | TimerState::Cancelled)
    }

    /// `Running` and `Paused` timers have started and not yet ended.
    pub fn is_active(self) -> bool {
        matches!(self, TimerState::Running | TimerState::Paused)
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimerState::Idle => "idle",
            TimerState::Running => "running",
            TimerState::Paused => "paused",
            TimerState::Finished => "finished",
            TimerState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Optional behavior toggles for a timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TimerOptions {
    /// Emit a tick reporting zero elapsed time immediately on `start`.
    #[serde(default)]
    pub tick_on_start: bool,
}

/// A point-in-time view of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub elapsed_millis: Millis,
    /// `None` for unbounded timers.
    pub remaining_millis: Option<Millis>,
    pub total_duration_millis: Millis,
    pub tick_interval_millis: Millis,
}

/// Creates an `Idle` timer with default options.
///
/// `total_duration_millis == 0` creates an unbounded count-up timer.
pub fn create_timer(
    total_duration_millis: Millis,
    tick_interval_millis: Millis,
    time_source: Arc<dyn TimeSource>,
) -> Result<Timer> {
    Timer::new(total_duration_millis, tick_interval_millis, time_source)
}

/// A single countdown (bounded) or count-up (unbounded) timer.
///
/// All operations are non-blocking: they update state, (re)schedule or
/// cancel the pending tick on the time source, and return. Dropping a timer
/// that is still running or paused cancels it first.
pub struct Timer {
    shared: Arc<Shared>,
}

struct Shared {
    source: Arc<dyn TimeSource>,
    total_duration_millis: Millis,
    tick_interval_millis: Millis,
    options: TimerOptions,
    core: Mutex<Core>,
}

struct Core {
    state: TimerState,
    /// Frozen elapsed time; only authoritative while not running.
    elapsed_millis: Millis,
    /// While running, `elapsed = now - start_reference`.
    start_reference: Millis,
    /// Absolute time the pending tick is due.
    next_tick_at: Millis,
    /// Portion of the current interval left when the timer was paused.
    resume_delay: Millis,
    pending: Option<ScheduleHandle>,
    /// Bumped on every schedule so a stale callback can recognize itself.
    generation: u64,
    observer: Option<Arc<dyn TimerObserver>>,
}

type Notifications = Vec<TimerEventKind>;

impl Timer {
    /// Creates an `Idle` timer, validating the duration/interval pair.
    pub fn new(
        total_duration_millis: Millis,
        tick_interval_millis: Millis,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        Self::with_options(
            total_duration_millis,
            tick_interval_millis,
            TimerOptions::default(),
            time_source,
        )
    }

    pub fn with_options(
        total_duration_millis: Millis,
        tick_interval_millis: Millis,
        options: TimerOptions,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        validate(total_duration_millis, tick_interval_millis)?;
        Ok(Self {
            shared: Arc::new(Shared {
                source: time_source,
                total_duration_millis,
                tick_interval_millis,
                options,
                core: Mutex::new(Core {
                    state: TimerState::Idle,
                    elapsed_millis: 0,
                    start_reference: 0,
                    next_tick_at: 0,
                    resume_delay: 0,
                    pending: None,
                    generation: 0,
                    observer: None,
                }),
            }),
        })
    }

    /// Registers the observer, replacing any previous one (last write wins).
    pub fn set_observer(&self, observer: Arc<dyn TimerObserver>) {
        self.shared.lock().observer = Some(observer);
    }

    pub fn clear_observer(&self) {
        self.shared.lock().observer = None;
    }

    /// Starts an `Idle` timer and schedules its first tick one interval from now.
    pub fn start(&self) -> Result<()> {
        self.shared.transition(|shared, core| {
            if core.state != TimerState::Idle {
                return Err(invalid_state("start", core.state));
            }
            let now = shared.source.now();
            let interval = shared.tick_interval_millis;
            core.start_reference = now;
            core.elapsed_millis = 0;
            core.next_tick_at = now.saturating_add(interval);
            shared.schedule_tick(core, interval);
            core.state = TimerState::Running;
            debug!(
                "Timer started at {}ms (total {}ms, interval {}ms).",
                now, shared.total_duration_millis, interval
            );

            let mut notes = vec![TimerEventKind::Started];
            if shared.options.tick_on_start {
                notes.push(TimerEventKind::Tick {
                    elapsed_millis: 0,
                    remaining_millis: shared.remaining_after(0),
                });
            }
            Ok(notes)
        })
    }

    /// Freezes elapsed time and cancels the pending tick.
    pub fn pause(&self) -> Result<()> {
        self.shared.transition(|shared, core| {
            if core.state != TimerState::Running {
                return Err(invalid_state("pause", core.state));
            }
            let now = shared.source.now();
            let elapsed = shared.clamp(now.saturating_sub(core.start_reference));
            core.elapsed_millis = elapsed;
            core.resume_delay = core.next_tick_at.saturating_sub(now);
            shared.cancel_pending(core);
            core.state = TimerState::Paused;
            debug!(
                "Timer paused at {}ms elapsed, {}ms left in the interval.",
                elapsed, core.resume_delay
            );
            Ok(vec![TimerEventKind::Paused {
                elapsed_millis: elapsed,
            }])
        })
    }

    /// Continues a paused timer; the next tick fires after whatever was left
    /// of the interval that was interrupted.
    pub fn resume(&self) -> Result<()> {
        self.shared.transition(|shared, core| {
            if core.state != TimerState::Paused {
                return Err(invalid_state("resume", core.state));
            }
            let now = shared.source.now();
            let delay = core.resume_delay;
            core.start_reference = now.saturating_sub(core.elapsed_millis);
            core.next_tick_at = now.saturating_add(delay);
            shared.schedule_tick(core, delay);
            core.state = TimerState::Running;
            debug!(
                "Timer resumed at {}ms elapsed, next tick in {}ms.",
                core.elapsed_millis, delay
            );
            Ok(vec![TimerEventKind::Resumed {
                elapsed_millis: core.elapsed_millis,
            }])
        })
    }

    /// Cancels the timer from any non-terminal state.
    ///
    /// Calling this on a `Finished` or `Cancelled` timer is a no-op, so the
    /// observer sees at most one cancellation per run.
    pub fn cancel(&self) -> Result<()> {
        self.shared.transition(|shared, core| {
            if core.state.is_terminal() {
                return Ok(Vec::new());
            }
            if core.state == TimerState::Running {
                let now = shared.source.now();
                core.elapsed_millis = shared.clamp(now.saturating_sub(core.start_reference));
            }
            shared.cancel_pending(core);
            core.state = TimerState::Cancelled;
            debug!("Timer cancelled at {}ms elapsed.", core.elapsed_millis);
            Ok(vec![TimerEventKind::Cancelled])
        })
    }

    /// Returns a `Finished` or `Cancelled` timer to `Idle` with zero elapsed time.
    pub fn reset(&self) -> Result<()> {
        self.shared.transition(|_, core| {
            if !core.state.is_terminal() {
                return Err(invalid_state("reset", core.state));
            }
            core.elapsed_millis = 0;
            core.resume_delay = 0;
            core.state = TimerState::Idle;
            Ok(Vec::new())
        })
    }

    pub fn state(&self) -> TimerState {
        self.shared.lock().state
    }

    /// Elapsed time, read live from the clock while running.
    pub fn elapsed_millis(&self) -> Millis {
        let core = self.shared.lock();
        self.shared.elapsed_of(&core)
    }

    /// Remaining time, or `None` for unbounded timers.
    pub fn remaining_millis(&self) -> Option<Millis> {
        self.shared.remaining_after(self.elapsed_millis())
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let core = self.shared.lock();
        let elapsed_millis = self.shared.elapsed_of(&core);
        TimerSnapshot {
            state: core.state,
            elapsed_millis,
            remaining_millis: self.shared.remaining_after(elapsed_millis),
            total_duration_millis: self.shared.total_duration_millis,
            tick_interval_millis: self.shared.tick_interval_millis,
        }
    }

    pub fn total_duration_millis(&self) -> Millis {
        self.shared.total_duration_millis
    }

    pub fn tick_interval_millis(&self) -> Millis {
        self.shared.tick_interval_millis
    }

    /// `false` for count-up timers created with a zero total duration.
    pub fn is_bounded(&self) -> bool {
        self.shared.is_bounded()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.state().is_active() {
            debug!("Active timer dropped; cancelling its pending tick.");
            self.cancel().ok();
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Timer").field(&self.snapshot()).finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `step` under the lock, then notifies the observer with the lock
    /// released so it may call back into the timer.
    fn transition<F>(self: &Arc<Self>, step: F) -> Result<()>
    where
        F: FnOnce(&Arc<Self>, &mut Core) -> Result<Notifications>,
    {
        let (observer, notes) = {
            let mut core = self.lock();
            let notes = step(self, &mut *core)?;
            (core.observer.clone(), notes)
        };
        if let Some(observer) = observer {
            for kind in notes {
                dispatch(observer.as_ref(), kind);
            }
        }
        Ok(())
    }

    fn schedule_tick(self: &Arc<Self>, core: &mut Core, delay_millis: Millis) {
        core.generation = core.generation.wrapping_add(1);
        let generation = core.generation;
        let weak = Arc::downgrade(self);
        let handle = self.source.schedule_after(
            delay_millis,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_tick_fired(generation);
                }
            }),
        );
        core.pending = Some(handle);
    }

    fn cancel_pending(&self, core: &mut Core) {
        if let Some(handle) = core.pending.take() {
            self.source.cancel(handle);
        }
    }

    fn on_tick_fired(self: &Arc<Self>, generation: u64) {
        let outcome = self.transition(|shared, core| {
            if core.state != TimerState::Running || core.generation != generation {
                trace!("Ignoring stale tick (generation {}).", generation);
                return Ok(Vec::new());
            }
            core.pending = None;

            let now = shared.source.now();
            let elapsed = shared.clamp(now.saturating_sub(core.start_reference));
            core.elapsed_millis = elapsed;
            trace!("Tick at {}ms: {}ms elapsed.", now, elapsed);

            let mut notes = vec![TimerEventKind::Tick {
                elapsed_millis: elapsed,
                remaining_millis: shared.remaining_after(elapsed),
            }];
            if shared.is_bounded() && elapsed >= shared.total_duration_millis {
                core.state = TimerState::Finished;
                debug!("Timer finished after {}ms.", elapsed);
                notes.push(TimerEventKind::Finished);
            } else {
                let finish_at = shared
                    .is_bounded()
                    .then(|| core.start_reference.saturating_add(shared.total_duration_millis));
                let next = next_tick_deadline(
                    core.next_tick_at,
                    now,
                    shared.tick_interval_millis,
                    finish_at,
                );
                core.next_tick_at = next;
                shared.schedule_tick(core, next.saturating_sub(now));
            }
            Ok(notes)
        });
        // Ticks never fail; only caller-facing operations reject states.
        debug_assert!(outcome.is_ok());
    }

    fn is_bounded(&self) -> bool {
        self.total_duration_millis > 0
    }

    fn clamp(&self, elapsed: Millis) -> Millis {
        if self.is_bounded() {
            elapsed.min(self.total_duration_millis)
        } else {
            elapsed
        }
    }

    fn remaining_after(&self, elapsed: Millis) -> Option<Millis> {
        self.is_bounded()
            .then(|| self.total_duration_millis.saturating_sub(elapsed))
    }

    fn elapsed_of(&self, core: &Core) -> Millis {
        match core.state {
            TimerState::Running => {
                self.clamp(self.source.now().saturating_sub(core.start_reference))
            }
            _ => core.elapsed_millis,
        }
    }
}

/// Picks the deadline for the tick after the one due at `scheduled`.
///
/// Deadlines stay on multiples of `interval` from the last schedule point;
/// multiples already behind `now` are skipped. A bounded timer never
/// schedules past `finish_at`, so its last tick lands exactly on the total.
fn next_tick_deadline(
    scheduled: Millis,
    now: Millis,
    interval: Millis,
    finish_at: Option<Millis>,
) -> Millis {
    let mut next = scheduled.saturating_add(interval);
    if next < now {
        let missed = (now - next).div_ceil(interval);
        next = next.saturating_add(missed.saturating_mul(interval));
    }
    match finish_at {
        Some(finish) => next.min(finish),
        None => next,
    }
}

fn validate(total_duration_millis: Millis, tick_interval_millis: Millis) -> Result<()> {
    if tick_interval_millis == 0 {
        return Err(TimerError::InvalidConfiguration(
            "tick interval must be greater than zero".to_string(),
        ));
    }
    if total_duration_millis > 0 && tick_interval_millis > total_duration_millis {
        return Err(TimerError::InvalidConfiguration(format!(
            "tick interval {}ms exceeds total duration {}ms",
            tick_interval_millis, total_duration_millis
        )));
    }
    Ok(())
}

fn invalid_state(operation: &'static str, state: TimerState) -> TimerError {
    TimerError::InvalidState { operation, state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TimerEventKind>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<TimerEventKind> {
            self.events.lock().unwrap().clone()
        }

        fn ticks(&self) -> Vec<(Millis, Option<Millis>)> {
            self.events()
                .into_iter()
                .filter_map(|kind| match kind {
                    TimerEventKind::Tick {
                        elapsed_millis,
                        remaining_millis,
                    } => Some((elapsed_millis, remaining_millis)),
                    _ => None,
                })
                .collect()
        }

        fn count(&self, wanted: TimerEventKind) -> usize {
            self.events().into_iter().filter(|k| *k == wanted).count()
        }

        fn push(&self, kind: TimerEventKind) {
            self.events.lock().unwrap().push(kind);
        }
    }

    impl TimerObserver for Recorder {
        fn on_tick(&self, elapsed_millis: Millis, remaining_millis: Option<Millis>) {
            self.push(TimerEventKind::Tick {
                elapsed_millis,
                remaining_millis,
            });
        }
        fn on_finish(&self) {
            self.push(TimerEventKind::Finished);
        }
        fn on_cancel(&self) {
            self.push(TimerEventKind::Cancelled);
        }
        fn on_start(&self) {
            self.push(TimerEventKind::Started);
        }
        fn on_pause(&self, elapsed_millis: Millis) {
            self.push(TimerEventKind::Paused { elapsed_millis });
        }
        fn on_resume(&self, elapsed_millis: Millis) {
            self.push(TimerEventKind::Resumed { elapsed_millis });
        }
    }

    fn observed(total: Millis, interval: Millis) -> (Arc<ManualTimeSource>, Timer, Arc<Recorder>) {
        let source = Arc::new(ManualTimeSource::new());
        let timer = create_timer(total, interval, source.clone()).expect("valid timer");
        let recorder = Arc::new(Recorder::default());
        timer.set_observer(recorder.clone());
        (source, timer, recorder)
    }

    #[test]
    fn countdown_ticks_every_interval_then_finishes() {
        let (source, timer, recorder) = observed(5_000, 1_000);
        timer.start().unwrap();
        for _ in 0..5 {
            source.advance(1_000);
        }

        let elapsed: Vec<_> = recorder.ticks().iter().map(|(e, _)| *e).collect();
        assert_eq!(elapsed, vec![1_000, 2_000, 3_000, 4_000, 5_000]);
        for (elapsed, remaining) in recorder.ticks() {
            assert_eq!(elapsed + remaining.unwrap(), 5_000);
        }
        assert_eq!(recorder.events().first(), Some(&TimerEventKind::Started));
        assert_eq!(recorder.events().last(), Some(&TimerEventKind::Finished));
        assert_eq!(recorder.count(TimerEventKind::Finished), 1);
        assert_eq!(timer.state(), TimerState::Finished);
    }

    #[test]
    fn nothing_fires_after_finish() {
        let (source, timer, recorder) = observed(3_000, 1_000);
        timer.start().unwrap();
        source.advance(3_000);
        let settled = recorder.events().len();

        source.advance(10_000);
        assert_eq!(recorder.events().len(), settled);
        assert_eq!(source.pending(), 0);
        assert_eq!(timer.elapsed_millis(), 3_000);
        assert_eq!(timer.remaining_millis(), Some(0));
    }

    #[test]
    fn uneven_interval_still_ends_on_the_total() {
        let (source, timer, recorder) = observed(5_000, 1_500);
        timer.start().unwrap();
        source.advance(6_000);

        let elapsed: Vec<_> = recorder.ticks().iter().map(|(e, _)| *e).collect();
        assert_eq!(elapsed, vec![1_500, 3_000, 4_500, 5_000]);
        assert_eq!(recorder.count(TimerEventKind::Finished), 1);
    }

    #[test]
    fn unbounded_timer_counts_up_until_cancelled() {
        let (source, timer, recorder) = observed(0, 100);
        timer.start().unwrap();
        for _ in 0..10 {
            source.advance(100);
        }

        let ticks = recorder.ticks();
        assert_eq!(ticks.len(), 10);
        assert_eq!(ticks.last(), Some(&(1_000, None)));
        assert_eq!(recorder.count(TimerEventKind::Finished), 0);
        assert_eq!(timer.state(), TimerState::Running);

        timer.cancel().unwrap();
        source.advance(1_000);
        assert_eq!(recorder.ticks().len(), 10);
        assert_eq!(timer.state(), TimerState::Cancelled);
        assert_eq!(timer.remaining_millis(), None);
    }

    #[test]
    fn pause_then_resume_without_advancing_keeps_elapsed() {
        let (source, timer, _recorder) = observed(5_000, 1_000);
        timer.start().unwrap();
        source.advance(1_300);
        let before = timer.elapsed_millis();

        timer.pause().unwrap();
        timer.resume().unwrap();
        assert_eq!(timer.elapsed_millis(), before);
        assert_eq!(before, 1_300);
    }

    #[test]
    fn paused_time_is_excluded_and_interval_fraction_is_kept() {
        let (source, timer, recorder) = observed(5_000, 1_000);
        timer.start().unwrap();
        source.advance(1_500);
        timer.pause().unwrap();
        assert_eq!(timer.elapsed_millis(), 1_500);

        source.advance(10_000);
        assert_eq!(recorder.ticks().len(), 1);
        assert_eq!(timer.elapsed_millis(), 1_500);

        timer.resume().unwrap();
        source.advance(499);
        assert_eq!(recorder.ticks().len(), 1);
        source.advance(1);
        assert_eq!(recorder.ticks().last(), Some(&(2_000, Some(3_000))));

        source.advance(3_000);
        assert_eq!(recorder.ticks().last(), Some(&(5_000, Some(0))));
        assert!(recorder.events().contains(&TimerEventKind::Paused {
            elapsed_millis: 1_500
        }));
        assert!(recorder.events().contains(&TimerEventKind::Resumed {
            elapsed_millis: 1_500
        }));
        assert_eq!(timer.state(), TimerState::Finished);
    }

    #[test]
    fn cancel_is_idempotent() {
        let (source, timer, recorder) = observed(5_000, 1_000);
        timer.start().unwrap();
        source.advance(2_000);

        timer.cancel().unwrap();
        timer.cancel().unwrap();
        assert_eq!(recorder.count(TimerEventKind::Cancelled), 1);
        assert_eq!(source.pending(), 0);
    }

    #[test]
    fn idle_timers_can_be_cancelled() {
        let (_source, timer, recorder) = observed(5_000, 1_000);
        timer.cancel().unwrap();
        assert_eq!(timer.state(), TimerState::Cancelled);
        assert_eq!(recorder.count(TimerEventKind::Cancelled), 1);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let source: Arc<dyn TimeSource> = Arc::new(ManualTimeSource::new());
        assert!(matches!(
            create_timer(5_000, 0, source.clone()),
            Err(TimerError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            create_timer(500, 1_000, source.clone()),
            Err(TimerError::InvalidConfiguration(_))
        ));
        assert!(create_timer(1_000, 1_000, source.clone()).is_ok());
        assert!(create_timer(0, 1_000, source).is_ok());
    }

    #[test]
    fn pause_on_idle_fails_and_leaves_state_alone() {
        let (_source, timer, recorder) = observed(5_000, 1_000);
        let err = timer.pause().unwrap_err();
        assert_eq!(
            err,
            TimerError::InvalidState {
                operation: "pause",
                state: TimerState::Idle
            }
        );
        assert_eq!(timer.state(), TimerState::Idle);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn state_rules_for_start_resume_and_reset() {
        let (source, timer, _recorder) = observed(2_000, 1_000);
        assert!(timer.resume().is_err());
        assert!(timer.reset().is_err());

        timer.start().unwrap();
        assert!(timer.start().is_err());
        timer.pause().unwrap();
        assert!(timer.start().is_err());
        assert!(timer.pause().is_err());
        timer.resume().unwrap();

        source.advance(2_000);
        assert_eq!(timer.state(), TimerState::Finished);
        assert!(timer.start().is_err());

        timer.reset().unwrap();
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.elapsed_millis(), 0);
        timer.start().unwrap();
        source.advance(1_000);
        assert_eq!(timer.elapsed_millis(), 1_000);
    }

    #[test]
    fn tick_on_start_reports_zero_elapsed() {
        let source = Arc::new(ManualTimeSource::new());
        let options = TimerOptions {
            tick_on_start: true,
        };
        let timer = Timer::with_options(3_000, 1_000, options, source.clone()).unwrap();
        let recorder = Arc::new(Recorder::default());
        timer.set_observer(recorder.clone());

        timer.start().unwrap();
        assert_eq!(recorder.ticks(), vec![(0, Some(3_000))]);
        source.advance(3_000);
        assert_eq!(recorder.ticks().len(), 4);
    }

    #[test]
    fn last_registered_observer_wins() {
        let (source, timer, first) = observed(2_000, 1_000);
        let second = Arc::new(Recorder::default());
        timer.set_observer(second.clone());

        timer.start().unwrap();
        source.advance(2_000);
        assert!(first.events().is_empty());
        assert_eq!(second.ticks().len(), 2);

        timer.clear_observer();
        timer.reset().unwrap();
        timer.start().unwrap();
        source.advance(2_000);
        assert_eq!(second.ticks().len(), 2);
    }

    #[test]
    fn dropping_a_running_timer_cancels_it() {
        let (source, timer, recorder) = observed(5_000, 1_000);
        timer.start().unwrap();
        source.advance(1_000);

        drop(timer);
        assert_eq!(recorder.count(TimerEventKind::Cancelled), 1);
        assert_eq!(source.pending(), 0);
        source.advance(5_000);
        assert_eq!(recorder.ticks().len(), 1);
    }

    struct CancelOnSecondTick {
        timer: OnceLock<Weak<Timer>>,
        ticks: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl TimerObserver for CancelOnSecondTick {
        fn on_tick(&self, _elapsed: Millis, _remaining: Option<Millis>) {
            if self.ticks.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                if let Some(timer) = self.timer.get().and_then(Weak::upgrade) {
                    timer.cancel().unwrap();
                }
            }
        }
        fn on_finish(&self) {}
        fn on_cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observer_may_cancel_from_inside_a_tick() {
        let source = Arc::new(ManualTimeSource::new());
        let timer = Arc::new(create_timer(0, 100, source.clone()).unwrap());
        let observer = Arc::new(CancelOnSecondTick {
            timer: OnceLock::new(),
            ticks: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        });
        observer.timer.set(Arc::downgrade(&timer)).ok();
        timer.set_observer(observer.clone());

        timer.start().unwrap();
        source.advance(1_000);
        assert_eq!(observer.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(observer.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(timer.state(), TimerState::Cancelled);
        assert_eq!(timer.elapsed_millis(), 200);
    }

    #[test]
    fn late_ticks_skip_missed_multiples() {
        assert_eq!(next_tick_deadline(1_000, 1_000, 1_000, None), 2_000);
        // Delivered 2.5 intervals late: realign to the next multiple.
        assert_eq!(next_tick_deadline(1_000, 3_500, 1_000, None), 4_000);
        // Exactly on a multiple: fire immediately rather than skip it.
        assert_eq!(next_tick_deadline(1_000, 2_000, 1_000, None), 2_000);
        assert_eq!(next_tick_deadline(4_000, 4_000, 1_500, Some(5_000)), 5_000);
    }

    /// Holds callbacks until told to deliver the earliest one at a chosen time.
    #[derive(Default)]
    struct LateSource {
        now: Mutex<Millis>,
        queue: Mutex<crate::time::queue::DelayQueue>,
    }

    impl LateSource {
        fn deliver_next_at(&self, now: Millis) {
            *self.now.lock().unwrap() = now;
            let due = self.queue.lock().unwrap().pop_due(Millis::MAX);
            let (_deadline, callback) = due.expect("a pending callback");
            callback();
        }

        fn next_deadline(&self) -> Option<Millis> {
            self.queue.lock().unwrap().next_deadline()
        }
    }

    impl TimeSource for LateSource {
        fn now(&self) -> Millis {
            *self.now.lock().unwrap()
        }

        fn schedule_after(
            &self,
            delay_millis: Millis,
            callback: crate::time::Callback,
        ) -> ScheduleHandle {
            let deadline = self.now().saturating_add(delay_millis);
            self.queue.lock().unwrap().insert(deadline, callback)
        }

        fn cancel(&self, handle: ScheduleHandle) -> bool {
            self.queue.lock().unwrap().remove(handle)
        }
    }

    #[test]
    fn late_tick_reports_clock_elapsed_and_realigns() {
        let source = Arc::new(LateSource::default());
        let timer = create_timer(10_000, 1_000, source.clone()).unwrap();
        let recorder = Arc::new(Recorder::default());
        timer.set_observer(recorder.clone());

        timer.start().unwrap();
        assert_eq!(source.next_deadline(), Some(1_000));

        source.deliver_next_at(2_730);
        assert_eq!(recorder.ticks(), vec![(2_730, Some(7_270))]);
        assert_eq!(source.next_deadline(), Some(3_000));

        source.deliver_next_at(3_000);
        assert_eq!(recorder.ticks().last(), Some(&(3_000, Some(7_000))));
        assert_eq!(source.next_deadline(), Some(4_000));
        assert_eq!(timer.state(), TimerState::Running);
    }
}

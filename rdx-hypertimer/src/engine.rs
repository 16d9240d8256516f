//! The engine that manages a registry of timers sharing one time source.

use crate::common::{Millis, TimerId};
use crate::components::observer::BroadcastObserver;
use crate::components::timer::{Timer, TimerOptions, TimerSnapshot, TimerState};
use crate::config::HypertimerConfig;
use crate::error::{Result, TimerError};
use crate::events::{SystemEvent, TimerEvent};
use crate::time::TimeSource;
use slotmap::SlotMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// The main Hypertimer engine.
///
/// The engine owns every timer registered with it and shares a single
/// `TimeSource` between them, so all of their ticks are delivered on one
/// delivery context. It is designed to be cloned and shared across tasks;
/// every clone is a handle to the same registry.
///
/// Each registered timer reports through a `BroadcastObserver`: subscribe to
/// `subscribe_timer_events` to receive the notifications of all timers.
#[derive(Clone)]
pub struct TimerEngine {
    config: Arc<HypertimerConfig>,
    source: Arc<dyn TimeSource>,
    timers: Arc<RwLock<SlotMap<TimerId, RegisteredTimer>>>,
    timer_event_sender: broadcast::Sender<TimerEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
}

struct RegisteredTimer {
    label: String,
    timer: Timer,
}

/// A labelled snapshot of one registered timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSummary {
    pub id: TimerId,
    pub label: String,
    pub snapshot: TimerSnapshot,
}

// Core implementation block for internal logic.
impl TimerEngine {
    /// Creates a new, empty `TimerEngine` driven by `source`.
    pub fn new(config: HypertimerConfig, source: Arc<dyn TimeSource>) -> Self {
        const CHANNEL_CAPACITY: usize = 256;
        let (timer_event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (system_event_sender, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            source,
            timers: Arc::new(RwLock::new(SlotMap::with_key())),
            timer_event_sender,
            system_event_sender,
        }
    }

    #[doc(hidden)]
    async fn with_timer<T>(
        &self,
        id: TimerId,
        operation: impl FnOnce(&Timer) -> Result<T>,
    ) -> Result<T> {
        let timers = self.timers.read().await;
        let entry = timers.get(id).ok_or(TimerError::UnknownTimer(id))?;
        operation(&entry.timer)
    }
}

// Public API implementation block.
impl TimerEngine {
    /// Registers a new `Idle` timer.
    ///
    /// A `tick_interval_millis` of `None` falls back to the configured
    /// `default_tick_interval_millis`.
    pub async fn create_timer(
        &self,
        label: impl Into<String>,
        total_duration_millis: Millis,
        tick_interval_millis: Option<Millis>,
    ) -> Result<TimerId> {
        self.create_timer_with_options(
            label,
            total_duration_millis,
            tick_interval_millis,
            TimerOptions::default(),
        )
        .await
    }

    pub async fn create_timer_with_options(
        &self,
        label: impl Into<String>,
        total_duration_millis: Millis,
        tick_interval_millis: Option<Millis>,
        options: TimerOptions,
    ) -> Result<TimerId> {
        let interval =
            tick_interval_millis.unwrap_or(self.config.default_tick_interval_millis);
        let timer = Timer::with_options(
            total_duration_millis,
            interval,
            options,
            self.source.clone(),
        )?;
        let label = label.into();
        info!(
            "Registering timer '{}' (total {}ms, interval {}ms).",
            label, total_duration_millis, interval
        );

        let mut timers = self.timers.write().await;
        let id = timers.insert_with_key(|key| {
            timer.set_observer(BroadcastObserver::new(
                key,
                self.timer_event_sender.clone(),
            ));
            RegisteredTimer { label, timer }
        });
        self.system_event_sender
            .send(SystemEvent::TimerCreated { id })
            .ok();
        Ok(id)
    }

    /// Registers one timer for every preset in the configuration.
    ///
    /// Stops at the first invalid preset; timers registered before it remain.
    pub async fn load_presets(&self) -> Result<Vec<TimerId>> {
        let mut ids = Vec::with_capacity(self.config.timers.len());
        for preset in self.config.timers.iter() {
            let id = self
                .create_timer_with_options(
                    preset.label.clone(),
                    preset.total_duration_millis,
                    preset.tick_interval_millis,
                    preset.options(),
                )
                .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub async fn start(&self, id: TimerId) -> Result<()> {
        self.with_timer(id, Timer::start).await
    }

    pub async fn pause(&self, id: TimerId) -> Result<()> {
        self.with_timer(id, Timer::pause).await
    }

    pub async fn resume(&self, id: TimerId) -> Result<()> {
        self.with_timer(id, Timer::resume).await
    }

    /// Cancels a timer but keeps it registered so it can be `reset`.
    pub async fn cancel(&self, id: TimerId) -> Result<()> {
        self.with_timer(id, Timer::cancel).await
    }

    pub async fn reset(&self, id: TimerId) -> Result<()> {
        self.with_timer(id, Timer::reset).await
    }

    /// Cancels and unregisters a timer.
    ///
    /// Returns `true` if the timer was found and removed.
    pub async fn remove_timer(&self, id: TimerId) -> bool {
        let removed = self.timers.write().await.remove(id);
        match removed {
            Some(entry) => {
                entry.timer.cancel().ok();
                debug!("Timer '{}' removed.", entry.label);
                self.system_event_sender
                    .send(SystemEvent::TimerRemoved { id })
                    .ok();
                true
            }
            None => false,
        }
    }

    /// Starts every `Idle` timer. Returns how many were started.
    pub async fn start_all(&self) -> usize {
        let timers = self.timers.read().await;
        let mut started = 0;
        for (_id, entry) in timers.iter() {
            if entry.timer.state() == TimerState::Idle && entry.timer.start().is_ok() {
                started += 1;
            }
        }
        info!("Started {} timers.", started);
        started
    }

    /// Cancels and unregisters every timer.
    pub async fn cancel_all(&self) {
        let mut timers = self.timers.write().await;
        for (id, entry) in timers.drain() {
            entry.timer.cancel().ok();
            self.system_event_sender
                .send(SystemEvent::TimerRemoved { id })
                .ok();
        }
        info!("All timers cancelled.");
    }

    pub async fn snapshot(&self, id: TimerId) -> Result<TimerSnapshot> {
        self.with_timer(id, |timer| Ok(timer.snapshot())).await
    }

    /// Snapshots of every registered timer.
    pub async fn summaries(&self) -> Vec<TimerSummary> {
        self.timers
            .read()
            .await
            .iter()
            .map(|(id, entry)| TimerSummary {
                id,
                label: entry.label.clone(),
                snapshot: entry.timer.snapshot(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.timers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.timers.read().await.is_empty()
    }

    /// The time source shared by every timer of this engine.
    pub fn time_source(&self) -> Arc<dyn TimeSource> {
        self.source.clone()
    }

    pub fn config(&self) -> &HypertimerConfig {
        &self.config
    }

    /// Subscribes to the `TimerEvent` stream of all registered timers.
    pub fn subscribe_timer_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.timer_event_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }
}

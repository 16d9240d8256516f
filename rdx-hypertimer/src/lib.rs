//! # Hypertimer
//!
//! Drift-free countdown and count-up timers for Rust.
//!
//! Hypertimer manages independently configurable timers, each moving through
//! a well-defined lifecycle (`Idle`, `Running`, `Paused`, `Finished`,
//! `Cancelled`) and reporting ticks, completion and cancellation to an
//! observer.
//!
//! ## Core Concepts
//!
//! - **TimeSource**: the single provider of monotonic time and cancellable,
//!   delayed callbacks. Production code uses `TokioTimeSource`; tests use the
//!   virtual `ManualTimeSource` to drive tick sequences deterministically.
//! - **Timer**: a state machine whose elapsed time is always derived from the
//!   clock, never from counting ticks, so scheduling jitter never shows up in
//!   the values it reports.
//! - **Observer**: a single, replaceable sink for a timer's notifications.
//! - **DelayedTick**: a one-shot, retriggerable tick that fires once after a
//!   fixed delay and counts how often it has fired.
//! - **TimerEngine**: a registry of timers sharing one time source, which
//!   broadcasts every timer's notifications as strongly-typed `TimerEvent`s.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hypertimer::prelude::*;
//! use std::sync::Arc;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Start the real-time source's delivery loop.
//!     let source = Arc::new(TokioTimeSource::new());
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!     tokio::spawn(source.clone().run(shutdown_rx));
//!
//!     // 2. Create the engine and subscribe before registering timers.
//!     let engine = TimerEngine::new(HypertimerConfig::default(), source);
//!     let mut events = engine.subscribe_timer_events();
//!
//!     // 3. A five second countdown ticking every second.
//!     let id = engine.create_timer("countdown", 5_000, Some(1_000)).await?;
//!     engine.start(id).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?}", event.kind);
//!         if event.kind == TimerEventKind::Finished {
//!             break;
//!         }
//!     }
//!     shutdown_tx.send(()).ok();
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Hypertimer";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod time;

pub use components::timer::create_timer;

/// A prelude module for easy importing of the most common Hypertimer types.
pub mod prelude {
    pub use crate::common::{Millis, ScheduleHandle, TimerId};
    pub use crate::components::observer::TimerObserver;
    pub use crate::components::tick::DelayedTick;
    pub use crate::components::timer::{
        create_timer, Timer, TimerOptions, TimerSnapshot, TimerState,
    };
    pub use crate::config::{HypertimerConfig, TimerPreset};
    pub use crate::engine::{TimerEngine, TimerSummary};
    pub use crate::error::TimerError;
    pub use crate::events::{SystemEvent, TimerEvent, TimerEventKind};
    pub use crate::time::{ManualTimeSource, TimeSource, TokioTimeSource};
}

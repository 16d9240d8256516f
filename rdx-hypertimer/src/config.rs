//! Defines all configuration structures for the Hypertimer engine.
//!
//! These structs are deserialized with `serde` through the `config` crate,
//! so the engine's defaults and a set of preset timers can be defined in a
//! TOML file and overridden from `HYPERTIMER__*` environment variables.

use crate::common::Millis;
use crate::components::timer::TimerOptions;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Interval used when a timer is registered without one.
pub const DEFAULT_TICK_INTERVAL_MILLIS: Millis = 1_000;

/// The top-level configuration for the `TimerEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct HypertimerConfig {
    /// Tick interval for timers registered without an explicit one.
    #[serde(default = "default_tick_interval")]
    pub default_tick_interval_millis: Millis,

    /// Timers created by `TimerEngine::load_presets`.
    #[serde(default)]
    pub timers: Vec<TimerPreset>,
}

/// A timer to register at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct TimerPreset {
    /// A human-readable label for listings and logs.
    pub label: String,
    /// Zero (the default) makes an unbounded count-up timer.
    #[serde(default)]
    pub total_duration_millis: Millis,
    /// Falls back to `default_tick_interval_millis` when absent.
    #[serde(default)]
    pub tick_interval_millis: Option<Millis>,
    #[serde(default)]
    pub tick_on_start: bool,
}

impl TimerPreset {
    pub fn options(&self) -> TimerOptions {
        TimerOptions {
            tick_on_start: self.tick_on_start,
        }
    }
}

impl HypertimerConfig {
    /// Loads configuration from an optional TOML file, then applies
    /// `HYPERTIMER__*` environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("HYPERTIMER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl Default for HypertimerConfig {
    fn default() -> Self {
        Self {
            default_tick_interval_millis: default_tick_interval(),
            timers: Vec::new(),
        }
    }
}

// --- Default value functions for serde ---

fn default_tick_interval() -> Millis {
    DEFAULT_TICK_INTERVAL_MILLIS
}

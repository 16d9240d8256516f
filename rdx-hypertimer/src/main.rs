use anyhow::Result;
use colored::Colorize;
use hypertimer::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load configuration; the first argument may name a TOML file.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = HypertimerConfig::load(config_path.as_deref())?;

    // 3. Start the real-time source's delivery loop.
    let source = Arc::new(TokioTimeSource::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(source.clone().run(shutdown_tx.subscribe()));

    // 4. Create the engine and listen to its event streams.
    let engine = TimerEngine::new(config, source);
    spawn_event_listeners(&engine);

    // 5. Register timers: the configured presets, or a small demo set.
    register_timers(&engine).await?;
    engine.start_all().await;

    info!(
        "{} v{} running. Press Ctrl+C to shut down.",
        hypertimer::ENGINE_NAME.cyan(),
        hypertimer::VERSION
    );
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received.");
    engine.cancel_all().await;
    shutdown_tx.send(()).ok();
    Ok(())
}

/// Spawns one task per engine event stream, logging every event.
fn spawn_event_listeners(engine: &TimerEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut timer_rx = engine.subscribe_timer_events();
    let listener_engine = engine.clone();
    tokio::spawn(async move {
        while let Ok(event) = timer_rx.recv().await {
            let stamp = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
            match event.kind {
                TimerEventKind::Tick {
                    elapsed_millis,
                    remaining_millis: Some(remaining),
                } => info!(
                    "[{}] {:?} tick: {}ms elapsed, {}ms left",
                    stamp, event.timer_id, elapsed_millis, remaining
                ),
                TimerEventKind::Tick { elapsed_millis, .. } => {
                    info!("[{}] {:?} tick: {}ms elapsed", stamp, event.timer_id, elapsed_millis)
                }
                TimerEventKind::Finished => {
                    info!("[{}] {:?} {}", stamp, event.timer_id, "finished".green().bold());
                    if let Ok(snapshot) = listener_engine.snapshot(event.timer_id).await {
                        info!("    final state: {:?}", snapshot);
                    }
                }
                other => info!("[{}] {:?} => {:?}", stamp, event.timer_id, other),
            }
        }
    });
}

/// Registers the configured presets, falling back to a countdown and a stopwatch.
async fn register_timers(engine: &TimerEngine) -> Result<()> {
    let presets = engine.load_presets().await?;
    if !presets.is_empty() {
        info!("Loaded {} timer presets from configuration.", presets.len());
        return Ok(());
    }
    engine
        .create_timer_with_options(
            "countdown",
            5_000,
            Some(1_000),
            TimerOptions {
                tick_on_start: true,
            },
        )
        .await?;
    engine.create_timer("stopwatch", 0, Some(2_500)).await?;
    Ok(())
}

use anyhow::Result;
use colored::Colorize;
use hypertimer::prelude::*;
use hypertimer::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use slotmap::Key;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    let rule = "-".repeat(72);
    println!("{}", rule.dimmed());
    println!("{}", format!("  {} shell", ENGINE_NAME).cyan().bold());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!(
        "{}",
        "  Distributed under the MIT OR Apache-2.0 license. Use at your own risk.".dimmed()
    );
    println!("{}", rule.dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  add countdown <MS> [TICK_MS] - Adds a countdown of MS milliseconds.");
    println!("  add stopwatch [TICK_MS]      - Adds an unbounded count-up timer.");
    println!("  start <H>|all                - Starts a timer (or every idle timer).");
    println!("  pause <H>                    - Pauses a running timer.");
    println!("  resume <H>                   - Resumes a paused timer.");
    println!("  cancel <H>|all               - Cancels a timer (all: also removes them).");
    println!("  reset <H>                    - Returns a finished/cancelled timer to idle.");
    println!("  remove <H>                   - Cancels and removes a timer.");
    println!("  list                         - Shows timers and their handles.");
    println!("  watch on|off                 - Toggles printing of tick events.");
    println!("  exit                         - Quits the shell.");
}

/// Spawns the tasks that print engine events into the shell.
fn spawn_event_listeners(engine: &TimerEngine, show_ticks: Arc<AtomicBool>) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            println!("\n<-- [SYSTEM EVENT] {:?}", event);
        }
    });

    let mut timer_rx = engine.subscribe_timer_events();
    tokio::spawn(async move {
        while let Ok(event) = timer_rx.recv().await {
            let stamp = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
            let id = short_id(event.timer_id);
            match event.kind {
                TimerEventKind::Tick {
                    elapsed_millis,
                    remaining_millis,
                } => {
                    if show_ticks.load(Ordering::Relaxed) {
                        let remaining = remaining_millis
                            .map(|ms| format!(", {}ms left", ms))
                            .unwrap_or_default();
                        println!(
                            "<-- [{}] timer {} tick: {}ms{}",
                            stamp, id, elapsed_millis, remaining
                        );
                    }
                }
                TimerEventKind::Finished => {
                    println!("<-- [{}] timer {} {}", stamp, id, "finished".green().bold())
                }
                TimerEventKind::Cancelled => {
                    println!("<-- [{}] timer {} {}", stamp, id, "cancelled".red())
                }
                other => println!("<-- [{}] timer {} {:?}", stamp, id, other),
            }
        }
    });
}

fn short_id(id: TimerId) -> u64 {
    id.data().as_ffi() & 0xffff_ffff
}

/// Shell-side bookkeeping: small numeric handles for engine timer ids.
#[derive(Default)]
struct Handles {
    by_handle: BTreeMap<usize, TimerId>,
    next: usize,
}

impl Handles {
    fn register(&mut self, id: TimerId) -> usize {
        let handle = self.next;
        self.by_handle.insert(handle, id);
        self.next += 1;
        handle
    }

    fn resolve(&self, arg: Option<&&str>) -> Option<TimerId> {
        let handle = arg?.parse::<usize>().ok()?;
        self.by_handle.get(&handle).copied()
    }

    fn forget(&mut self, id: TimerId) {
        self.by_handle.retain(|_, known| *known != id);
    }
}

fn parse_millis(arg: Option<&&str>) -> Option<Millis> {
    arg.and_then(|s| s.parse::<Millis>().ok())
}

fn report(result: Result<(), TimerError>, done: &str) {
    match result {
        Ok(()) => println!("--> {}", done),
        Err(e) => println!("--> {} {}", "Error:".red(), e),
    }
}

async fn list_timers(engine: &TimerEngine, handles: &Handles) {
    let summaries = engine.summaries().await;
    println!("Timers:");
    for (handle, id) in &handles.by_handle {
        if let Some(summary) = summaries.iter().find(|s| s.id == *id) {
            let snapshot = &summary.snapshot;
            let remaining = snapshot
                .remaining_millis
                .map(|ms| format!("{}ms left", ms))
                .unwrap_or_else(|| "unbounded".to_string());
            println!(
                "  Handle #{}: {:<12} {:<9} {}ms elapsed, {} (tick {}ms)",
                handle,
                summary.label,
                snapshot.state.to_string(),
                snapshot.elapsed_millis,
                remaining,
                snapshot.tick_interval_millis
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config_path = env::var_os("HYPERTIMER_CONFIG").map(PathBuf::from);
    let config = HypertimerConfig::load(config_path.as_deref())?;

    let source = Arc::new(TokioTimeSource::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(source.clone().run(shutdown_tx.subscribe()));

    let engine = TimerEngine::new(config, source);
    let show_ticks = Arc::new(AtomicBool::new(true));
    spawn_event_listeners(&engine, show_ticks.clone());

    let mut handles = Handles::default();
    for id in engine.load_presets().await? {
        handles.register(id);
    }
    info!(
        "{} shell ready with {} preset timers.",
        ENGINE_NAME,
        handles.by_handle.len()
    );

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting timershell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "add" => {
                let created = match args.get(1) {
                    Some(&"countdown") => match parse_millis(args.get(2)) {
                        Some(total) if total > 0 => Some(
                            engine
                                .create_timer("countdown", total, parse_millis(args.get(3)))
                                .await,
                        ),
                        _ => {
                            println!("Usage: add countdown <MS> [TICK_MS]");
                            None
                        }
                    },
                    Some(&"stopwatch") => Some(
                        engine
                            .create_timer("stopwatch", 0, parse_millis(args.get(2)))
                            .await,
                    ),
                    _ => {
                        println!("Unknown 'add' command. Try 'add countdown' or 'add stopwatch'.");
                        None
                    }
                };
                match created {
                    Some(Ok(id)) => {
                        let handle = handles.register(id);
                        println!("--> Added timer with handle: #{}", handle);
                    }
                    Some(Err(e)) => println!("--> {} {}", "Error:".red(), e),
                    None => {}
                }
            }
            "start" if args.get(1) == Some(&"all") => {
                let started = engine.start_all().await;
                println!("--> Started {} timers.", started);
            }
            "cancel" if args.get(1) == Some(&"all") => {
                engine.cancel_all().await;
                handles.by_handle.clear();
                println!("--> All timers cancelled and removed.");
            }
            "start" | "pause" | "resume" | "cancel" | "reset" | "remove" => {
                let Some(id) = handles.resolve(args.get(1)) else {
                    println!("Error: Invalid handle. Use 'list' to see timers.");
                    continue;
                };
                match *command {
                    "start" => report(engine.start(id).await, "Timer started."),
                    "pause" => report(engine.pause(id).await, "Timer paused."),
                    "resume" => report(engine.resume(id).await, "Timer resumed."),
                    "cancel" => report(engine.cancel(id).await, "Timer cancelled."),
                    "reset" => report(engine.reset(id).await, "Timer reset."),
                    _ => {
                        if engine.remove_timer(id).await {
                            println!("--> Timer successfully removed.");
                        } else {
                            println!("--> Error: Timer not found in engine.");
                        }
                        handles.forget(id);
                    }
                }
            }
            "list" => list_timers(&engine, &handles).await,
            "watch" => match args.get(1) {
                Some(&"on") => {
                    show_ticks.store(true, Ordering::Relaxed);
                    println!("--> Printing tick events.");
                }
                Some(&"off") => {
                    show_ticks.store(false, Ordering::Relaxed);
                    println!("--> Tick events hidden.");
                }
                _ => println!("Usage: watch on|off"),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    engine.cancel_all().await;
    shutdown_tx.send(()).ok();
    Ok(())
}

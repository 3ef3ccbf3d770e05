//! A demonstration binary for the `procpool` library: runs `count` copies of a target command
//! concurrently, feeding each line read from this process's stdin to every running child's own
//! stdin, and shuts the pool down in order on EOF or on `SIGHUP`/`SIGINT`/`SIGTERM`.
//!
//! # Features
//!
//! - Runs N concurrent children from one target command.
//! - Fans each line of this process's stdin out to every child's stdin.
//! - Supports configuration via CLI, environment variables, or a configuration file.
//! - Handles termination gracefully: a signal triggers an orderly drain-then-close instead of
//!   abandoning running children.

use anyhow::{Context, Result};
use nix::unistd::pipe;
use procpool::error::{AllWorkersFailed, BadConfiguration, ChannelCollision, InvalidTemplate};
use procpool::{Args, Coordinator, Mode, TaskTemplate, Tuning, WriterSpec, settings, signals, threads};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Main entry point for the `procpool` demonstration program.
///
/// This function:
/// 1. Registers signal handlers for graceful shutdown.
/// 2. Loads program settings from CLI, environment variables, or a configuration file.
/// 3. Builds and starts a Coordinator running `count` copies of the target command.
/// 4. Feeds lines read from stdin into the pool until EOF or a shutdown signal.
/// 5. Closes the Coordinator in order and exits with a code reflecting the outcome.
///
/// # Exit Codes
///
/// - `0` on an orderly run to completion,
/// - `2` if every child failed to start ([`AllWorkersFailed`]), or
/// - `1` for any other fatal error (bad settings, bad template, bad writer configuration).
fn main() -> Result<()> {
    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM])
        .context("Failed to register signal handlers")?;

    let settings = settings::get_settings()?;

    let (signal_rx, signal_tx) = pipe().context("Error creating pipe")?;
    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let shutdown_requested_clone = shutdown_requested.clone();
    let signal_thread = threads::spawn_named("process_signals", move || {
        if let Err(e) = signals::process_signals(signals, shutdown_requested_clone, signal_tx) {
            eprintln!("Error processing signals: {e:#}");
        }
    })
    .context("Failed to create thread to process signals")?;
    drop(signal_rx);

    let args = nonempty::NonEmpty::from_vec(settings.target.args.clone())
        .map_or_else(|| Args::Shell(String::new()), Args::Argv);
    let template = TaskTemplate {
        executable: settings.target.executable.as_str().to_string(),
        args,
        side_channels: HashMap::new(),
    };

    let mut writer_specs: HashMap<String, WriterSpec<String>> = HashMap::new();
    writer_specs.insert(
        "stdin".to_string(),
        WriterSpec::new(
            Arc::new(|item: &String| {
                let mut bytes = item.clone().into_bytes();
                bytes.push(b'\n');
                bytes
            }),
            Mode::stdin_default(),
            true,
        ),
    );

    let tuning = Tuning {
        common_queue_multiplier: settings.common_queue_multiplier,
        writer_queue_maxsize: settings.writer_queue_maxsize,
        ..Tuning::default()
    };

    let mut coordinator: Coordinator<String> =
        Coordinator::new(template, settings.count, writer_specs, tuning);

    let exit_code = match coordinator.start() {
        Ok(()) => {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if shutdown_requested.load(Ordering::SeqCst) {
                    break;
                }
                match line {
                    Ok(line) => coordinator.feed(line),
                    Err(e) => {
                        eprintln!("Error reading stdin: {e:#}");
                        break;
                    }
                }
            }
            if let Err(e) = coordinator.close() {
                eprintln!("Error closing pool: {e:#}");
                1
            } else {
                0
            }
        }
        Err(e) => {
            report_startup_error(&e);
            if e.downcast_ref::<AllWorkersFailed>().is_some() { 2 } else { 1 }
        }
    };

    if let Ok(handle) = signal_thread.join() {
        drop(handle);
    }

    std::process::exit(exit_code);
}

fn report_startup_error(e: &anyhow::Error) {
    if let Some(e) = e.downcast_ref::<AllWorkersFailed>() {
        eprintln!("Error starting pool: {e}");
    } else if let Some(e) = e.downcast_ref::<InvalidTemplate>() {
        eprintln!("Error binding target template: {e}");
    } else if let Some(e) = e.downcast_ref::<ChannelCollision>() {
        eprintln!("Error configuring channels: {e}");
    } else if let Some(e) = e.downcast_ref::<BadConfiguration>() {
        eprintln!("Error configuring writers: {e}");
    } else {
        eprintln!("Error starting pool: {e:#}");
    }
}

//! Signal handling functionality for triggering an orderly pool shutdown.
//!
//! This module provides functionality for handling Unix signals (`SIGHUP`, `SIGINT`, `SIGTERM`)
//! and requesting that the demonstration binary stop feeding the pool and call `close()`, rather
//! than abandoning the running children.

use anyhow::Result;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::SignalsInfo;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Waits for the next `SIGHUP`/`SIGINT`/`SIGTERM`, sets `shutdown_requested`, then notifies the
/// main thread through `signal_tx`.
///
/// # Errors
///
/// Returns an error if writing to `signal_tx` fails for a reason other than the receiving end
/// having already closed.
pub fn process_signals(
    mut signals: SignalsInfo,
    shutdown_requested: Arc<AtomicBool>,
    signal_tx: OwnedFd,
) -> Result<()> {
    // unwrap: Safe because `signals.forever()` is never empty.
    if let SIGHUP | SIGINT | SIGTERM = signals.forever().next().unwrap() {
        shutdown_requested.store(true, Ordering::SeqCst);
    }
    // We don't care about an error here, because either the receiving end is still waiting to get
    // a message, or it has been already closed because the thread that owns it already died, and
    // then we don't care.
    let _ = nix::unistd::write(signal_tx, &[1]);
    Ok(())
}

//! Helpers for spawning and joining the long-lived background executors that make up the pool.
//!
//! Every Worker, Writer, and startup executor in this crate runs on its own named,
//! independently-joinable thread rather than a scoped/daemon thread: unlike a single wrapped
//! process, these threads must outlive the call that spawns them (they keep running after
//! [`crate::coordinator::Coordinator::start`] returns) and must be explicitly joined during
//! [`crate::coordinator::Coordinator::close`].

use anyhow::{Context, Result};
use std::thread::{self, JoinHandle};

/// Spawns a named thread, wrapping spawn failure with the thread's name for diagnostics.
///
/// # Errors
///
/// Returns an error if the OS refuses to create the thread.
pub fn spawn_named<F, R>(name: &str, func: F) -> Result<JoinHandle<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(func)
        .context(format!("Failed to create thread {name}"))
}

/// Joins a thread handle, reporting a panic to stderr instead of propagating it.
///
/// A panicking background executor must not bring down threads that are still draining, so
/// failures are logged and swallowed here.
pub fn join_and_report<R>(name: &str, handle: JoinHandle<R>) -> Option<R> {
    match handle.join() {
        Ok(result) => Some(result),
        Err(e) => {
            eprintln!("Thread {name} panicked: {e:?}");
            None
        }
    }
}

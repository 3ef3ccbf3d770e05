//! Drains one Worker's per-channel queue into its bound child-process FD.

use crate::sync::TaskQueue;
use anyhow::Context;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Background loop that pulls items from a bounded queue, transforms each into bytes, and writes
/// them to one channel. Bounding this queue at a small capacity (2 by default) is what keeps a
/// fast Worker from hoarding the common queue while a slow Writer catches up: `push` blocks the
/// Worker's fan-out, not the common queue's other consumers.
pub struct Writer<T> {
    pub queue: Arc<TaskQueue<T>>,
    io: Box<dyn Write + Send>,
    transform: Box<dyn Fn(T) -> Vec<u8> + Send>,
    ignore_broken_pipe: bool,
    stop: Arc<AtomicBool>,
}

impl<T: Send + 'static> Writer<T> {
    #[must_use]
    pub fn new(
        queue: Arc<TaskQueue<T>>,
        io: Box<dyn Write + Send>,
        transform: Box<dyn Fn(T) -> Vec<u8> + Send>,
        ignore_broken_pipe: bool,
    ) -> Self {
        Self {
            queue,
            io,
            transform,
            ignore_broken_pipe,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle the owning Worker can use to ask this Writer's loop to stop once the queue
    /// drains, without waiting on the exhaustion predicate.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Runs the drain loop until told to stop and the queue is empty, or until a write fails.
    ///
    /// Returns an error only for write failures other than a broken pipe when
    /// `ignore_broken_pipe` is set; a broken pipe under that flag ends the loop quietly (the
    /// child has exited and no longer wants this channel's input).
    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let Some(item) = self.queue.pop_timeout(POLL_TIMEOUT) else {
                if self.stop.load(Ordering::SeqCst) {
                    return Ok(());
                }
                continue;
            };

            let bytes = (self.transform)(item);
            let result = self.io.write_all(&bytes).and_then(|()| self.io.flush());
            self.queue.task_done();

            if let Err(e) = result {
                if self.ignore_broken_pipe && e.kind() == std::io::ErrorKind::BrokenPipe {
                    return Ok(());
                }
                return Err(e).context("Error writing to channel");
            }
        }
    }
}

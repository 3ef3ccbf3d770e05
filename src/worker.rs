//! Per-child fan-out: pulls one item from the common queue and pushes it into every one of that
//! child's Writer queues.

use crate::channel::{Mode, NotWritable};
use crate::error::{BadConfiguration, ChannelCollision};
use crate::sync::{SyncContext, TaskQueue};
use crate::task::Task;
use crate::threads::{join_and_report, spawn_named};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// The per-channel configuration the Coordinator holds: how to encode an item for this channel,
/// and whether a broken pipe on it should stop shutdown from proceeding.
pub struct WriterSpec<T> {
    pub transform: Arc<dyn Fn(&T) -> Vec<u8> + Send + Sync>,
    pub mode: Mode,
    pub exhaust: bool,
}

impl<T> Clone for WriterSpec<T> {
    fn clone(&self) -> Self {
        Self {
            transform: self.transform.clone(),
            mode: self.mode,
            exhaust: self.exhaust,
        }
    }
}

impl<T> WriterSpec<T> {
    #[must_use]
    pub fn new(
        transform: Arc<dyn Fn(&T) -> Vec<u8> + Send + Sync>,
        mode: Mode,
        exhaust: bool,
    ) -> Self {
        Self {
            transform,
            mode,
            exhaust,
        }
    }
}

struct RunningWriter<T> {
    queue: Arc<TaskQueue<T>>,
    stop: Arc<AtomicBool>,
    join: JoinHandle<Result<()>>,
}

/// One child's fan-out agent: owns that child's Writers and the background loop feeding them
/// from the common queue. Both the Writer loops and this Worker's own loop are already running
/// once `from_task` returns successfully.
pub struct Worker<T> {
    name: String,
    context: Arc<SyncContext<T>>,
    writers: HashMap<String, RunningWriter<T>>,
    fan_out: Option<JoinHandle<()>>,
    /// Kept alive for the Worker's whole lifetime: its `ChildGuard` must not drop (and
    /// signal the child) until `close()` has explicitly waited for a clean exit, and any
    /// channel no Writer claimed (e.g. an unread stdout) must stay open rather than close the
    /// moment the startup executor returns.
    task: Task,
}

impl<T: Clone + Send + Sync + 'static> Worker<T> {
    /// Builds the Writers this Task's channels support, starts each Writer's background loop,
    /// then starts this Worker's own fan-out loop. Takes ownership of `task` for the Worker's
    /// whole lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelCollision`] if `"stdin"` also appears as a side-channel name,
    /// [`BadConfiguration`] if a requested writer spec names an unknown, unbound, or
    /// non-writable channel, or an error if a background thread cannot be created.
    pub fn from_task(
        name: String,
        context: Arc<SyncContext<T>>,
        mut task: Task,
        writer_specs: &HashMap<String, WriterSpec<T>>,
        maxsize: usize,
    ) -> Result<Self> {
        if task.side_channels.contains_key("stdin") {
            return Err(ChannelCollision {
                name: "stdin".to_string(),
            }
            .into());
        }

        let writable = task.writable_channel_names();
        let mut writers = HashMap::with_capacity(writer_specs.len());
        for (channel_name, spec) in writer_specs {
            if !writable.contains(channel_name) {
                return Err(BadConfiguration::UnknownChannel {
                    name: channel_name.clone(),
                }
                .into());
            }

            let io = task.take_writer(channel_name).map_err(|e| {
                if e.downcast_ref::<NotWritable>().is_some() {
                    BadConfiguration::ChannelNotWritable {
                        name: channel_name.clone(),
                    }
                } else {
                    BadConfiguration::ChannelNotBound {
                        name: channel_name.clone(),
                    }
                }
            })?;

            let queue = Arc::new(TaskQueue::new(maxsize));
            let transform = spec.transform.clone();
            let writer_transform: Box<dyn Fn(T) -> Vec<u8> + Send> =
                Box::new(move |item: T| transform(&item));
            let mut writer =
                crate::writer::Writer::new(queue.clone(), io, writer_transform, !spec.exhaust);
            let stop = writer.stop_handle();
            let writer_name = format!("{name}-writer-{channel_name}");
            let join = spawn_named(&writer_name, move || writer.run())?;

            writers.insert(channel_name.clone(), RunningWriter { queue, stop, join });
        }

        let fan_out_queues: Vec<Arc<TaskQueue<T>>> =
            writers.values().map(|w| w.queue.clone()).collect();
        let fan_out_context = context.clone();
        let fan_out_name = format!("{name}-worker");
        let fan_out = spawn_named(&fan_out_name, move || {
            take_loop(&fan_out_context, &fan_out_queues);
        })?;

        Ok(Self {
            name,
            context,
            writers,
            fan_out: Some(fan_out),
            task,
        })
    }

    /// True iff `eof` is set and the common queue plus every named Writer queue (or every
    /// Writer queue, if `names` is empty) have no outstanding items.
    #[must_use]
    pub fn exhausted(&self, names: &[&str]) -> bool {
        let queues: Vec<&TaskQueue<T>> = if names.is_empty() {
            self.writers.values().map(|w| w.queue.as_ref()).collect()
        } else {
            names
                .iter()
                .filter_map(|n| self.writers.get(*n))
                .map(|w| w.queue.as_ref())
                .collect()
        };
        self.context.exhausted(&queues)
    }

    /// Tells every Writer's loop it may stop once its queue is empty, independent of the
    /// exhaustion predicate. Used once the fan-out loop itself has already exited.
    pub fn signal_writers_stop(&self) {
        for writer in self.writers.values() {
            writer.stop.store(true, Ordering::SeqCst);
        }
    }

    /// Joins the fan-out thread, then every Writer thread, then waits for this Worker's child
    /// to exit, reporting (not propagating) panics and fatal write errors to stderr.
    pub fn join(mut self) {
        if let Some(handle) = self.fan_out.take() {
            join_and_report(&format!("{}-worker", self.name), handle);
        }
        self.signal_writers_stop();
        for (channel_name, handle) in std::mem::take(&mut self.writers) {
            let writer_name = format!("{}-writer-{channel_name}", self.name);
            if let Some(Err(e)) = join_and_report(&writer_name, handle.join) {
                eprintln!("Writer {writer_name} failed: {e:#}");
            }
        }

        if let Some(guard) = self.task.child.as_mut() {
            match guard.child.wait() {
                Ok(status) if !status.success() => {
                    eprintln!("Child {} exited with {status}", self.name);
                }
                Ok(_) => {}
                Err(e) => eprintln!("Error waiting for child {}: {e:#}", self.name),
            }
        }
    }
}

fn take_loop<T: Clone>(context: &SyncContext<T>, writer_queues: &[Arc<TaskQueue<T>>]) {
    loop {
        let Some(item) = context.common.pop_timeout(POLL_TIMEOUT) else {
            let refs: Vec<&TaskQueue<T>> = writer_queues.iter().map(Arc::as_ref).collect();
            if context.exhausted(&refs) {
                return;
            }
            continue;
        };

        // Anti-hoarding: each push blocks until that Writer has room, so a fast Worker cannot
        // pull ahead of its slowest Writer and starve other Workers of common-queue items.
        for queue in writer_queues {
            queue.push(item.clone());
        }
        context.common.task_done();
    }
}

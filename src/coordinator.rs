//! Orchestrates N child processes bound from one [`TaskTemplate`]: launches them concurrently,
//! exposes `feed`/`close`, and enforces the viability latch and ordered drain-on-close.

use crate::channel::Mode;
use crate::error::AllWorkersFailed;
use crate::sync::SyncContext;
use crate::task::TaskTemplate;
use crate::threads::{join_and_report, spawn_named};
use crate::worker::{Worker, WriterSpec};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const VIABILITY_POLL: Duration = Duration::from_millis(10);
const CLOSE_POLL: Duration = Duration::from_millis(10);
const DEFAULT_COMMON_QUEUE_MULTIPLIER: usize = 10;
const DEFAULT_WRITER_QUEUE_MAXSIZE: usize = 2;

/// Tuning knobs beyond the Template/count/WriterSpec map every Coordinator needs.
#[derive(Clone, Debug)]
pub struct Tuning {
    /// Common queue capacity = `count * common_queue_multiplier`.
    pub common_queue_multiplier: usize,
    /// Capacity of each per-channel Writer queue; the anti-hoarding bound.
    pub writer_queue_maxsize: usize,
    /// The key substituted into the Template for each Task's identity, `i ∈ [0, count)`.
    pub bind_id: String,
    /// Per-channel mode overrides passed to `Task::start`.
    pub modes: HashMap<String, Mode>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            common_queue_multiplier: DEFAULT_COMMON_QUEUE_MULTIPLIER,
            writer_queue_maxsize: DEFAULT_WRITER_QUEUE_MAXSIZE,
            bind_id: "id".to_string(),
            modes: HashMap::new(),
        }
    }
}

/// Orchestrator: instantiates `count` Tasks from `template`, launches them concurrently, and
/// manages their Workers/Writers through `start()`/`feed()`/`close()`.
pub struct Coordinator<T> {
    count: usize,
    writer_specs: HashMap<String, WriterSpec<T>>,
    tuning: Tuning,
    context: Arc<SyncContext<T>>,
    template: TaskTemplate,
    workers: Arc<Mutex<Vec<Worker<T>>>>,
    startup_handles: Vec<JoinHandle<()>>,
    started: bool,
}

impl<T: Clone + Send + Sync + 'static> Coordinator<T> {
    /// Binds `count` Tasks is deferred to `start()`; construction only records configuration.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn new(
        template: TaskTemplate,
        count: usize,
        writer_specs: HashMap<String, WriterSpec<T>>,
        tuning: Tuning,
    ) -> Self {
        assert!(count > 0, "Coordinator count must be at least 1");
        let context = Arc::new(SyncContext::new(count * tuning.common_queue_multiplier.max(1)));
        Self {
            count,
            writer_specs,
            tuning,
            context,
            template,
            workers: Arc::new(Mutex::new(Vec::new())),
            startup_handles: Vec::new(),
            started: false,
        }
    }

    /// The set of channel names whose WriterSpec has `exhaust = true`.
    #[must_use]
    pub fn exhaust_channels(&self) -> Vec<String> {
        self.writer_specs
            .iter()
            .filter(|(_, spec)| spec.exhaust)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Binds `count` Tasks, creates their channels, then spawns each child concurrently on a
    /// startup executor and blocks until the viability latch resolves.
    ///
    /// # Errors
    ///
    /// Returns [`AllWorkersFailed`] if every startup executor finishes without appending a
    /// Worker.
    pub fn start(&mut self) -> Result<()> {
        let mut tasks = Vec::with_capacity(self.count);
        for i in 0..self.count {
            let mut bind = HashMap::new();
            bind.insert(self.tuning.bind_id.clone(), i.to_string());
            let mut task = self.template.bind(&bind)?;
            task.create_channels()?;
            tasks.push(task);
        }

        let writer_queue_maxsize = self.tuning.writer_queue_maxsize;
        let modes = self.tuning.modes.clone();

        for (i, mut task) in tasks.into_iter().enumerate() {
            let context = self.context.clone();
            let workers = self.workers.clone();
            let writer_specs = self.writer_specs.clone();
            let modes = modes.clone();
            let name = format!("task-{i}");

            let handle = spawn_named(&format!("{name}-startup"), move || {
                let outcome = (|| -> Result<Worker<T>> {
                    let mut task = task;
                    task.start(&modes)?;
                    Worker::from_task(
                        name.clone(),
                        context,
                        task,
                        &writer_specs,
                        writer_queue_maxsize,
                    )
                })();
                match outcome {
                    Ok(worker) => {
                        workers
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .push(worker);
                    }
                    Err(e) => {
                        eprintln!("Error starting child {name}: {e:#}");
                    }
                }
            })?;
            self.startup_handles.push(handle);
        }

        self.await_viability()?;
        self.started = true;
        Ok(())
    }

    fn await_viability(&mut self) -> Result<()> {
        loop {
            if !self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_empty() {
                return Ok(());
            }
            if self.startup_handles.iter().all(JoinHandle::is_finished) {
                if !self.workers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_empty() {
                    return Ok(());
                }
                return Err(AllWorkersFailed {
                    attempted: self.count,
                }
                .into());
            }
            std::thread::sleep(VIABILITY_POLL);
        }
    }

    /// Enqueues `item` onto the common queue, blocking while it is at capacity.
    ///
    /// # Panics
    ///
    /// Panics if called before `start()`.
    pub fn feed(&self, item: T) {
        assert!(self.started, "feed() called before start()");
        self.context.common.push(item);
    }

    /// Signals end-of-input, waits for every exhaust-channel to drain, waits for every child to
    /// exit, then joins every background executor.
    ///
    /// # Errors
    ///
    /// Propagates the first error encountered joining a startup executor; Worker/Writer
    /// failures are reported to stderr rather than returned, matching the propagation policy for
    /// runtime (post-startup) errors.
    pub fn close(mut self) -> Result<()> {
        self.context.set_eof();

        let exhaust_channels = self.exhaust_channels();
        let exhaust_refs: Vec<&str> = exhaust_channels.iter().map(String::as_str).collect();
        loop {
            let snapshot_len = self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len();
            if snapshot_len == 0 {
                if self.startup_handles.iter().all(JoinHandle::is_finished) {
                    break;
                }
                std::thread::sleep(CLOSE_POLL);
                continue;
            }
            let all_exhausted = {
                let guard = self
                    .workers
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                guard.iter().all(|w| w.exhausted(&exhaust_refs))
            };
            if all_exhausted {
                break;
            }
            std::thread::sleep(CLOSE_POLL);
        }

        for handle in self.startup_handles.drain(..) {
            join_and_report("startup", handle);
        }

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for worker in workers {
            worker.join();
        }

        Ok(())
    }
}

/// Runs `f` with a started Coordinator, guaranteeing `close()` runs on every exit path
/// (including a panic inside `f`), mirroring a context manager's `__exit__`-always-runs contract.
///
/// # Errors
///
/// Returns any error from `start()` or `close()`, or re-raises `f`'s panic after `close()` has
/// run.
pub fn with_coordinator<T, R>(
    mut coordinator: Coordinator<T>,
    f: impl FnOnce(&Coordinator<T>) -> R + std::panic::UnwindSafe,
) -> Result<R>
where
    T: Clone + Send + Sync + 'static,
{
    coordinator.start()?;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&coordinator)));
    coordinator.close()?;
    match result {
        Ok(value) => Ok(value),
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

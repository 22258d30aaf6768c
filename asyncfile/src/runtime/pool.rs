use crate::runtime::event_loop::panic_message;
use crate::runtime::queue::{Task, TaskQueue};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

/// Background threads that run blocking native file calls.
///
/// Jobs are taken from a shared queue by whichever worker is free, so
/// two jobs submitted back to back may run concurrently and finish in
/// either order.
pub(crate) struct BlockingPool {
    /// Jobs waiting for a worker.
    queue: Arc<TaskQueue>,

    /// Join handles of the worker threads.
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BlockingPool {
    /// Spawns `threads` workers named `{name}-blocking-{n}`.
    pub(crate) fn new(threads: usize, name: &str) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads {
            let queue = queue.clone();

            let spawned = thread::Builder::new()
                .name(format!("{name}-blocking-{id}"))
                .spawn(move || {
                    while let Some(job) = queue.pop() {
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            tracing::error!(
                                worker = id,
                                panic = %panic_message(payload.as_ref()),
                                "blocking job panicked"
                            );
                        }
                    }
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => tracing::error!(worker = id, %err, "failed to spawn blocking worker"),
            }
        }

        Self {
            queue,
            handles: Mutex::new(handles),
        }
    }

    /// Queues a job. Jobs submitted after shutdown are dropped.
    pub(crate) fn submit(&self, job: Task) {
        if !self.queue.push(job) {
            tracing::trace!("blocking pool is shut down, dropping job");
        }
    }

    /// Stops accepting jobs and joins every worker.
    pub(crate) fn shutdown(&self) {
        self.queue.shutdown();

        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        for handle in handles {
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            let _ = handle.join();
        }
    }
}

use crate::runtime::queue::{Task, TaskQueue};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

/// Shared handle used by contexts to reach their loop.
pub(crate) type LoopHandle = Arc<LoopShared>;

/// State shared between the loop thread and the contexts it hosts.
pub(crate) struct LoopShared {
    queue: TaskQueue,

    /// Message of the first task that panicked on this loop.
    panic: Mutex<Option<String>>,

    /// Identifier of the loop thread, once it has started.
    thread: Mutex<Option<ThreadId>>,
}

impl LoopShared {
    /// Queues a task for the loop thread.
    pub(crate) fn submit(&self, task: Task) {
        if !self.queue.push(task) {
            tracing::trace!("event loop is shut down, dropping task");
        }
    }

    /// Takes the message of the first panic observed on the loop.
    pub(crate) fn take_panic(&self) -> Option<String> {
        self.panic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Returns `true` if called from the loop thread.
    pub(crate) fn is_loop_thread(&self) -> bool {
        *self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            == Some(thread::current().id())
    }

    fn record_panic(&self, payload: Box<dyn Any + Send>) {
        let message = panic_message(payload.as_ref());
        tracing::error!(panic = %message, "task panicked on the event loop");

        let mut slot = self
            .panic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if slot.is_none() {
            *slot = Some(message);
        }
    }
}

/// A single thread that runs context tasks in submission order.
pub(crate) struct EventLoop {
    shared: LoopHandle,
    handle: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Spawns the loop thread.
    pub(crate) fn start(name: String) -> Self {
        let shared = Arc::new(LoopShared {
            queue: TaskQueue::new(),
            panic: Mutex::new(None),
            thread: Mutex::new(None),
        });

        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                *worker
                    .thread
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) =
                    Some(thread::current().id());

                while let Some(task) = worker.queue.pop() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        worker.record_panic(payload);
                    }
                }
            })
            .map_err(|err| tracing::error!(%err, "failed to spawn event loop thread"))
            .ok();

        Self { shared, handle }
    }

    pub(crate) fn handle(&self) -> LoopHandle {
        self.shared.clone()
    }

    /// Stops the loop and waits for its thread, unless called from it.
    pub(crate) fn shutdown(&mut self) {
        self.shared.queue.shutdown();

        if self.shared.is_loop_thread() {
            return;
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

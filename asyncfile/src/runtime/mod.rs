//! Execution contexts and the threads behind them.
//!
//! A [`Runtime`] owns one event loop thread and a pool of blocking
//! workers. Logical [`Context`]s are created on the loop; every task a
//! context runs executes on the loop thread, one at a time, so state
//! pinned to a context needs no locking. Native file calls are pushed to
//! the blocking pool and their results are dispatched back onto the
//! owning context.

mod event_loop;
mod pool;
mod queue;

pub(crate) mod builder;
pub(crate) mod context;

use crate::runtime::context::Context;
use crate::runtime::event_loop::EventLoop;
use crate::runtime::pool::BlockingPool;

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Default time [`Runtime::run_until_complete`] waits for completion.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval at which a blocked harness checks the loop for panics.
const PANIC_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long a harness waits for a panic to be recorded once its
/// completion channel disconnects.
const PANIC_GRACE: Duration = Duration::from_millis(250);

/// The runtime handle.
///
/// Dropping the runtime stops the event loop and the blocking pool and
/// joins their threads. Tasks and jobs still queued are dropped.
pub struct Runtime {
    event_loop: EventLoop,
    pool: Arc<BlockingPool>,
}

impl Runtime {
    pub(crate) fn new(blocking_threads: usize, thread_name: &str) -> Self {
        let event_loop = EventLoop::start(format!("{thread_name}-loop"));
        let pool = Arc::new(BlockingPool::new(blocking_threads, thread_name));

        tracing::debug!(blocking_threads, thread_name, "runtime started");

        Self { event_loop, pool }
    }

    /// Creates a new logical context on the runtime's event loop.
    pub fn context(&self) -> Context {
        Context::new(self.event_loop.handle(), self.pool.clone())
    }

    /// Runs `f` on a fresh context and returns its value, blocking the
    /// calling thread.
    ///
    /// # Panics
    ///
    /// Panics if `f` panics on the loop thread.
    pub fn block_on<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (transmitter, receiver) = mpsc::channel();

        self.context().execute(move || {
            let _ = transmitter.send(f());
        });

        match receiver.recv() {
            Ok(value) => value,
            Err(_) => self.resume_panic("block_on task"),
        }
    }

    /// Runs `f` on a fresh context and blocks until the [`Done`] handle
    /// it receives is completed.
    ///
    /// # Panics
    ///
    /// Panics if any task on the event loop panics before completion, or
    /// if completion does not happen within
    /// [`DEFAULT_COMPLETION_TIMEOUT`].
    pub fn run_until_complete<F>(&self, f: F)
    where
        F: FnOnce(Done) + Send + 'static,
    {
        self.run_until_complete_timeout(DEFAULT_COMPLETION_TIMEOUT, f);
    }

    /// Like [`run_until_complete`](Self::run_until_complete) with an
    /// explicit timeout.
    pub fn run_until_complete_timeout<F>(&self, timeout: Duration, f: F)
    where
        F: FnOnce(Done) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let done = Done { sender };
        let deadline = Instant::now() + timeout;

        self.context().execute(move || f(done));

        loop {
            match receiver.recv_timeout(PANIC_POLL_INTERVAL) {
                Ok(()) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(message) = self.event_loop.handle().take_panic() {
                        panic!("task panicked on the event loop: {message}");
                    }

                    if Instant::now() >= deadline {
                        panic!("run_until_complete timed out after {timeout:?}");
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.resume_panic("completion handle dropped before completing")
                }
            }
        }

        if let Some(message) = self.event_loop.handle().take_panic() {
            panic!("task panicked on the event loop: {message}");
        }
    }

    fn resume_panic(&self, what: &str) -> ! {
        // The sender is dropped while the task unwinds, slightly before
        // the loop records the panic.
        let deadline = Instant::now() + PANIC_GRACE;
        let mut message = self.event_loop.handle().take_panic();
        while message.is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            message = self.event_loop.handle().take_panic();
        }

        match message {
            Some(message) => panic!("task panicked on the event loop: {message}"),
            None => panic!("{what} did not produce a result"),
        }
    }
}

impl Drop for Runtime {
    /// Shuts down the runtime.
    ///
    /// 1. Stops the event loop so no further completion is delivered
    /// 2. Stops the blocking pool
    /// 3. Joins all threads
    fn drop(&mut self) {
        self.event_loop.shutdown();
        self.pool.shutdown();

        tracing::debug!("runtime stopped");
    }
}

/// Completion handle passed to [`Runtime::run_until_complete`].
///
/// Cloning is cheap; completing any clone releases the waiting thread.
#[derive(Clone)]
pub struct Done {
    sender: mpsc::Sender<()>,
}

impl Done {
    /// Signals completion.
    pub fn complete(&self) {
        let _ = self.sender.send(());
    }
}

use super::Runtime;

/// Blocking pool size used unless [`RuntimeBuilder::worker_threads`] says
/// otherwise.
///
/// Pool threads mostly sit in blocking `pread`/`pwrite`/`fdatasync`
/// calls rather than computing.
pub const DEFAULT_BLOCKING_THREADS: usize = 4;

/// Configures the event loop and blocking pool behind a [`Runtime`].
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .worker_threads(2)
///     .thread_name("ingest")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    blocking_threads: usize,

    /// Prefix for the loop thread (`{name}-loop`) and pool threads
    /// (`{name}-blocking-{n}`).
    thread_name: String,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            blocking_threads: DEFAULT_BLOCKING_THREADS,
            thread_name: "asyncfile".to_owned(),
        }
    }

    /// Number of blocking pool threads, i.e. how many native file calls
    /// may run at once across all handles of the runtime.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`: completions would never arrive.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "the blocking pool needs at least one thread");

        self.blocking_threads = n;
        self
    }

    /// Prefix used to name the runtime's threads.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Spawns the loop thread and the blocking pool.
    pub fn build(self) -> Runtime {
        Runtime::new(self.blocking_threads, &self.thread_name)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

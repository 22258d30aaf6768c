use crate::runtime::event_loop::LoopHandle;
use crate::runtime::pool::BlockingPool;

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    /// The logical context whose task is running on this thread.
    ///
    /// Installed by [`enter_context`] for the duration of each task
    /// dispatched through [`Context::execute`].
    static CURRENT_CONTEXT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// Identity of a logical execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A single logical thread of execution.
///
/// Every task submitted through [`execute`](Self::execute) runs on the
/// event loop thread the context was created on, one at a time, with the
/// context installed as [`Context::current`]. Several contexts may share
/// one loop thread; they never share an identity.
///
/// Blocking work goes to the runtime's background pool through
/// [`spawn_blocking`](Self::spawn_blocking).
#[derive(Clone)]
pub struct Context {
    id: ContextId,

    /// Loop that runs this context's tasks.
    event_loop: LoopHandle,

    /// Pool that runs blocking native calls.
    pool: Arc<BlockingPool>,
}

impl Context {
    pub(crate) fn new(event_loop: LoopHandle, pool: Arc<BlockingPool>) -> Self {
        Self {
            id: ContextId::next(),
            event_loop,
            pool,
        }
    }

    /// Returns the identity of this context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the context running on the calling thread, if any.
    pub fn current() -> Option<Context> {
        CURRENT_CONTEXT.with(|cell| cell.borrow().clone())
    }

    /// Returns `true` if the caller is executing on this context.
    pub fn is_current(&self) -> bool {
        current_id() == Some(self.id)
    }

    /// Schedules `task` to run on this context.
    ///
    /// Tasks submitted after the runtime has shut down are dropped.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let context = self.clone();
        self.event_loop
            .submit(Box::new(move || enter_context(context, task)));
    }

    /// Runs `job` on the background pool.
    pub(crate) fn spawn_blocking<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.submit(Box::new(job));
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

/// Identity of the context running on the calling thread.
pub(crate) fn current_id() -> Option<ContextId> {
    CURRENT_CONTEXT.with(|cell| cell.borrow().as_ref().map(Context::id))
}

/// Runs `f` with `context` installed as the current context.
///
/// The previous context is restored afterwards, even if `f` unwinds.
pub(crate) fn enter_context<R>(context: Context, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Context>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT_CONTEXT.with(|cell| *cell.borrow_mut() = previous);
        }
    }

    let previous = CURRENT_CONTEXT.with(|cell| cell.replace(Some(context)));
    let _restore = Restore(previous);

    f()
}

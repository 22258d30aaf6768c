use crate::error::{FileError, Result};
use crate::runtime::context::{self, Context, ContextId};

use std::mem::ManuallyDrop;
use std::thread::{self, ThreadId};

/// The one logical thread allowed to touch a handle.
///
/// Captured when the handle is opened and never changed. Every public
/// operation calls [`check`](Self::check) before reading or mutating
/// handle state.
pub(crate) struct ContextGuard {
    context: Context,
}

impl ContextGuard {
    /// Captures the context the caller is running on.
    pub(crate) fn capture() -> Result<Self> {
        match Context::current() {
            Some(context) => Ok(Self { context }),
            None => Err(FileError::ContextViolation {
                expected: None,
                actual: None,
            }),
        }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    /// Fails with `ContextViolation` unless called on the owning context.
    pub(crate) fn check(&self) -> Result<()> {
        if self.context.is_current() {
            return Ok(());
        }

        Err(FileError::ContextViolation {
            expected: Some(self.context.id()),
            actual: context::current_id(),
        })
    }

    /// Pins `value` to the owning context so it can travel through the
    /// blocking pool and come back.
    pub(crate) fn bind<T>(&self, value: T) -> Bound<T> {
        Bound {
            value: ManuallyDrop::new(value),
            owner: self.context.id(),
            thread: thread::current().id(),
        }
    }
}

/// A value that may only be unwrapped on the context that bound it.
///
/// `Bound` is `Send` whatever `T` is: the value itself is never touched
/// off its home thread. If a `Bound` is dropped elsewhere (for example
/// because the runtime shut down with the completion still queued) the
/// value is leaked rather than destroyed on a foreign thread.
pub(crate) struct Bound<T> {
    value: ManuallyDrop<T>,
    owner: ContextId,
    thread: ThreadId,
}

// SAFETY: the inner value is only accessed or dropped on `thread`.
unsafe impl<T> Send for Bound<T> {}

impl<T> Bound<T> {
    fn on_home_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Returns the value if called on its owning context.
    pub(crate) fn into_inner(self) -> Result<T> {
        let actual = context::current_id();

        if !self.on_home_thread() || actual != Some(self.owner) {
            return Err(FileError::ContextViolation {
                expected: Some(self.owner),
                actual,
            });
        }

        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the value is taken exactly once.
        Ok(unsafe { ManuallyDrop::take(&mut this.value) })
    }
}

impl<T> Drop for Bound<T> {
    fn drop(&mut self) {
        if self.on_home_thread() {
            // SAFETY: dropped once, on the thread that created the value.
            unsafe { ManuallyDrop::drop(&mut self.value) };
        } else {
            tracing::warn!(
                owner = %self.owner,
                "context-bound value dropped off its home thread, leaking it"
            );
        }
    }
}

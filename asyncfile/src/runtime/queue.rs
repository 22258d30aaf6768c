use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

/// A unit of work handed to a loop or pool thread.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// FIFO of tasks shared between producers and the threads draining it.
///
/// Consumers block in [`pop`](Self::pop) until a task arrives or the
/// queue is shut down. Tasks still queued at shutdown are dropped.
pub(crate) struct TaskQueue {
    /// Pending tasks, oldest first.
    tasks: Mutex<VecDeque<Task>>,

    /// Signalled on every push and on shutdown.
    condvar: Condvar,

    /// Set once; no task is accepted or handed out afterwards.
    shutdown: AtomicBool,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueues a task and wakes one consumer.
    ///
    /// Returns `false` (dropping the task) if the queue is shut down.
    pub(crate) fn push(&self, task: Task) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }

        self.lock().push_back(task);
        self.condvar.notify_one();
        true
    }

    /// Blocks until a task is available.
    ///
    /// Returns `None` once the queue has been shut down.
    pub(crate) fn pop(&self) -> Option<Task> {
        let mut tasks = self.lock();

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }

            if let Some(task) = tasks.pop_front() {
                return Some(task);
            }

            tasks = self
                .condvar
                .wait(tasks)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Stops the queue and wakes every blocked consumer.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);

        let dropped = std::mem::take(&mut *self.lock());
        self.condvar.notify_all();
        drop(dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn tasks_come_out_in_push_order() {
        let queue = TaskQueue::new();
        let (tx, rx) = mpsc::channel();

        for i in 0..3 {
            let tx = tx.clone();
            assert!(queue.push(Box::new(move || tx.send(i).unwrap())));
        }

        for _ in 0..3 {
            queue.pop().unwrap()();
        }

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn shutdown_releases_blocked_consumer() {
        let queue = Arc::new(TaskQueue::new());
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop().is_none())
        };

        queue.shutdown();

        assert!(consumer.join().unwrap());
        assert!(!queue.push(Box::new(|| {})));
    }
}

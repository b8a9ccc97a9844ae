//! Deadline scheduling for game stage transitions.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use tokio::{runtime::Handle, task::AbortHandle};

/// Work run once a deadline is reached.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle on a scheduled task, used to cancel it before it fires.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    fn new(abort: Option<AbortHandle>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            abort,
        }
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Whether [`TaskHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Source of deadlines for game machines.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `at` is reached.
    fn schedule_at(&self, at: Instant, task: Task) -> TaskHandle;
}

/// Scheduler backed by the tokio runtime timer.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Bind the scheduler to the runtime behind `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Bind the scheduler to the runtime of the calling task.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at(&self, at: Instant, task: Task) -> TaskHandle {
        let mut handle = TaskHandle::new(None);
        let cancelled = Arc::clone(&handle.cancelled);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep_until(at.into()).await;
            if !cancelled.load(Ordering::SeqCst) {
                task();
            }
        });
        handle.abort = Some(join.abort_handle());
        handle
    }
}

#[cfg(test)]
pub use self::manual::ManualScheduler;

#[cfg(test)]
mod manual {
    use std::sync::Mutex;

    use super::*;

    struct Pending {
        at: Instant,
        handle: TaskHandle,
        task: Task,
    }

    /// Scheduler whose tasks only run when a test fires them.
    #[derive(Default)]
    pub struct ManualScheduler {
        pending: Mutex<Vec<Pending>>,
    }

    impl ManualScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of queued tasks, cancelled ones included.
        pub fn pending(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        /// Deadline of the earliest task that is still live.
        pub fn next_deadline(&self) -> Option<Instant> {
            self.pending
                .lock()
                .unwrap()
                .iter()
                .filter(|pending| !pending.handle.is_cancelled())
                .map(|pending| pending.at)
                .min()
        }

        /// Run the earliest live task. Returns false when nothing is live.
        pub fn fire_next(&self) -> bool {
            let next = {
                let mut pending = self.pending.lock().unwrap();
                pending.retain(|entry| !entry.handle.is_cancelled());
                let Some(position) = pending
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, entry)| entry.at)
                    .map(|(position, _)| position)
                else {
                    return false;
                };
                pending.remove(position)
            };
            (next.task)();
            true
        }

        /// Run every queued task regardless of cancellation.
        pub fn fire_all_ignoring_cancel(&self) -> usize {
            let drained: Vec<Pending> = std::mem::take(&mut *self.pending.lock().unwrap());
            let count = drained.len();
            for pending in drained {
                (pending.task)();
            }
            count
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule_at(&self, at: Instant, task: Task) -> TaskHandle {
            let handle = TaskHandle::new(None);
            self.pending.lock().unwrap().push(Pending {
                at,
                handle: handle.clone(),
                task,
            });
            handle
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use super::*;

    #[test]
    fn manual_scheduler_skips_cancelled_tasks() {
        let scheduler = ManualScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let first = scheduler.schedule_at(
            Instant::now(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = Arc::clone(&hits);
        scheduler.schedule_at(
            Instant::now() + Duration::from_secs(1),
            Box::new(move || {
                counter.fetch_add(10, Ordering::SeqCst);
            }),
        );

        first.cancel();
        assert!(scheduler.fire_next());
        assert!(!scheduler.fire_next());
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn tokio_scheduler_runs_and_cancels() {
        let scheduler = TokioScheduler::current();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let fired = tx.clone();
        scheduler.schedule_at(
            Instant::now() + Duration::from_millis(10),
            Box::new(move || {
                let _ = fired.send("fired");
            }),
        );
        let skipped = scheduler.schedule_at(
            Instant::now() + Duration::from_millis(20),
            Box::new(move || {
                let _ = tx.send("cancelled");
            }),
        );
        skipped.cancel();

        assert_eq!(rx.recv().await, Some("fired"));
        assert_eq!(rx.recv().await, None);
    }
}

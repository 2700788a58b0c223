//! Timer abstraction for the settle delays between speech segments.
//!
//! The orchestrator never blocks its control thread: every timed delay is a
//! callback handed to a [`Scheduler`]. Production code uses
//! [`ThreadScheduler`]; tests drive the state machine with a manual task
//! queue instead of wall-clock waits.

use std::time::Duration;

/// A deferred task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs a task after a delay, without blocking the caller.
///
/// Implementations are not required to support cancellation: every scheduled
/// task re-checks the playback session's cycle generation before acting, so
/// firing a stale task is harmless.
pub trait Scheduler: Send + Sync {
    fn after(&self, delay: Duration, task: Task);
}

/// Scheduler that sleeps on a freshly spawned thread.
///
/// A thread per timer is plenty here: at most one settle delay is pending at
/// any time (single phrase cycle in flight).
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn after(&self, delay: Duration, task: Task) {
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn thread_scheduler_runs_task_after_delay() {
        let (tx, rx) = mpsc::channel();
        ThreadScheduler.after(
            Duration::from_millis(1),
            Box::new(move || {
                tx.send(()).ok();
            }),
        );
        rx.recv_timeout(Duration::from_secs(5))
            .expect("scheduled task should run");
    }
}

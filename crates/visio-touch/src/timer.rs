//! Deferred callbacks used for the long-press and tap-resolution windows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::AbortHandle;

/// Work run when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules callbacks to run after a delay.
pub trait TimerService: Send + Sync {
    /// Run `callback` once `delay` has elapsed unless the returned handle is
    /// cancelled first.
    fn after(&self, delay: Duration, callback: TimerCallback) -> CancelHandle;
}

/// Handle to a scheduled timer.
///
/// Cancelling is idempotent: cancelling a timer that already fired or was
/// already cancelled does nothing. Exactly one of "fire" and "cancel" wins.
#[derive(Debug)]
pub struct CancelHandle {
    settled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl CancelHandle {
    /// Wrap the flag a [`TimerService`] checks before firing, and the task to
    /// abort on cancel if the service runs one.
    pub fn new(settled: Arc<AtomicBool>, task: Option<AbortHandle>) -> Self {
        Self { settled, task }
    }

    /// Prevent the callback from running if it has not started yet.
    pub fn cancel(&self) {
        if !self.settled.swap(true, Ordering::AcqRel) {
            if let Some(task) = &self.task {
                task.abort();
            }
        }
    }
}

/// [`TimerService`] backed by tokio's timer wheel.
///
/// Under `#[tokio::test(start_paused = true)]` these timers follow virtual
/// time, which is what the classifier tests rely on.
#[derive(Debug, Clone)]
pub struct TokioTimers {
    runtime: Handle,
}

impl TokioTimers {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime of the calling task.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl TimerService for TokioTimers {
    fn after(&self, delay: Duration, callback: TimerCallback) -> CancelHandle {
        let settled = Arc::new(AtomicBool::new(false));
        let fired = settled.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !fired.swap(true, Ordering::AcqRel) {
                callback();
            }
        });
        CancelHandle::new(settled, Some(task.abort_handle()))
    }
}

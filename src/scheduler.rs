//! Shared scheduler for delayed callbacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// A delayed callback that may still be cancelled.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: AbortHandle,
}

impl ScheduledTask {
    /// Cancel the callback if it has not started yet.
    ///
    /// Cancellation is advisory: a callback that is already running is not
    /// interrupted.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns true once the callback ran to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Runs delayed callbacks on a tokio runtime supplied by the host.
///
/// Clones share the same runtime and shutdown flag. After [`shutdown`] or when
/// built without a runtime, [`schedule`] returns `None` and the callback is
/// dropped.
///
/// [`shutdown`]: Scheduler::shutdown
/// [`schedule`]: Scheduler::schedule
#[derive(Debug, Clone)]
pub struct Scheduler {
    runtime: Option<Handle>,
    closed: Arc<AtomicBool>,
}

impl Scheduler {
    /// Schedule onto the given runtime.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedule onto the runtime of the calling context, if there is one.
    pub fn current() -> Self {
        Self {
            runtime: Handle::try_current().ok(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A scheduler that drops every callback.
    pub fn unavailable() -> Self {
        Self {
            runtime: None,
            closed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns true while callbacks can still be scheduled.
    pub fn is_available(&self) -> bool {
        self.runtime.is_some() && !self.closed.load(Ordering::Acquire)
    }

    /// Run `callback` after `delay`.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> Option<ScheduledTask>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let runtime = self.runtime.as_ref()?;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Some(ScheduledTask {
            handle: task.abort_handle(),
        })
    }

    /// Refuse all further callbacks. Already scheduled ones still run.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Accept callbacks again after [`shutdown`](Self::shutdown).
    ///
    /// Has no effect on a scheduler built without a runtime.
    pub fn reopen(&self) {
        if self.runtime.is_some() {
            self.closed.store(false, Ordering::Release);
        }
    }
}

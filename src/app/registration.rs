//! Per-application debouncing and coalescing of listener decisions.

use super::descriptor::UpdateHandler;
use super::listener::Listener;
use crate::error::Result;
use crate::notify::WatchOptions;
use crate::scheduler::{ScheduledTask, Scheduler};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;

/// Delay after the last change before a coalesced decision is delivered.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// A listener's verdict on one notification.
///
/// Ordered by priority: a pending `Remove` is never replaced by `Update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateKind {
    /// The application changed and should be updated.
    Update,
    /// The application's content is gone.
    Remove,
}

impl UpdateKind {
    /// The higher-priority of two decisions.
    pub fn merge(self, other: UpdateKind) -> UpdateKind {
        self.max(other)
    }
}

struct PendingState {
    kind: Option<UpdateKind>,
    timer: Option<ScheduledTask>,
    enabled: bool,
}

/// Collapses bursts of decisions into one handler call per debounce window.
///
/// Every queued decision cancels the running timer and starts a new one, so
/// the handler runs once, one window after the last decision of a burst.
///
/// Cancellation is advisory. A timer that already started firing when a new
/// decision arrives still delivers whatever is pending at that moment, and
/// the replacement timer then finds nothing left to deliver.
pub(crate) struct Coalescer {
    app_id: String,
    handler: Arc<dyn UpdateHandler>,
    scheduler: Scheduler,
    window: Duration,
    state: Mutex<PendingState>,
    #[cfg(feature = "metrics")]
    metrics: Option<MonitorMetrics>,
}

impl Coalescer {
    pub(crate) fn new(
        app_id: impl Into<String>,
        handler: Arc<dyn UpdateHandler>,
        scheduler: Scheduler,
        window: Duration,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            handler,
            scheduler,
            window,
            state: Mutex::new(PendingState {
                kind: None,
                timer: None,
                enabled: true,
            }),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: Option<MonitorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub(crate) fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Record `kind` and restart the debounce window.
    pub(crate) fn queue_event(self: &Arc<Self>, kind: UpdateKind) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        let this = Arc::clone(self);
        match self.scheduler.schedule(self.window, move || this.on_timer_fire()) {
            Some(timer) => {
                let merged = state.kind.map_or(kind, |pending| pending.merge(kind));
                state.kind = Some(merged);
                state.timer = Some(timer);
            }
            None => {
                tracing::debug!(app = %self.app_id, ?kind, "scheduler unavailable, change dropped");
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_dropped();
                }
            }
        }
    }

    fn on_timer_fire(&self) {
        let decision = {
            let mut state = self.state.lock();
            if !state.enabled {
                return;
            }
            state.timer = None;
            state.kind.take()
        };

        // The handler runs unlocked so it may remove its own application.
        if let Some(kind) = decision {
            tracing::debug!(app = %self.app_id, ?kind, "delivering coalesced change");
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.metrics {
                metrics.record_callback(kind);
            }
            self.handler.handle_update(kind == UpdateKind::Remove);
        }
    }

    /// Stop delivering decisions for good.
    pub(crate) fn disable(&self) {
        let mut state = self.state.lock();
        state.enabled = false;
        state.kind = None;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> Option<UpdateKind> {
        self.state.lock().kind
    }
}

/// The listeners and coalescer of one monitored application.
pub(crate) struct Registration {
    id: String,
    coalescer: Arc<Coalescer>,
    listeners: Vec<Listener>,
}

impl Registration {
    pub(crate) fn new(id: impl Into<String>, coalescer: Arc<Coalescer>, listeners: Vec<Listener>) -> Self {
        Self {
            id: id.into(),
            coalescer,
            listeners,
        }
    }

    /// Start every listener.
    ///
    /// # Errors
    ///
    /// Fails if a listener on the content root cannot be bound. Failures of
    /// explicit content targets are logged and skipped.
    pub(crate) fn start(&self, options: WatchOptions) -> Result<()> {
        for listener in &self.listeners {
            if let Err(e) = listener.start(options) {
                if listener.kind().watches_root() {
                    return Err(e);
                }
                tracing::warn!(
                    app = %self.id,
                    path = %listener.path().display(),
                    error = %e,
                    "content target not monitored"
                );
            }
        }
        Ok(())
    }

    pub(crate) fn stop_listeners(&self) {
        for listener in &self.listeners {
            listener.stop();
        }
    }

    /// Stop listeners and drop any pending decision; the registration is dead afterwards.
    pub(crate) fn stop_terminally(&self) {
        self.coalescer.disable();
        self.stop_listeners();
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.listeners
            .iter()
            .filter(|l| l.kind().watches_root())
            .all(Listener::is_listening)
    }

    pub(crate) fn listeners(&self) -> &[Listener] {
        &self.listeners
    }
}

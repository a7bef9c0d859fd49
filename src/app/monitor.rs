//! Registry of monitored applications.

use super::descriptor::AppDescriptor;
use super::listener::{Listener, ListenerKind};
use super::registration::{Coalescer, DEBOUNCE_WINDOW, Registration};
use super::suffix::MinorUpdateSuffixes;
use crate::core::MonitorConfig;
use crate::notify::{ChangeNotifier, WatchOptions};
use crate::scheduler::Scheduler;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;

/// Keeps one registration per application id and applies the global
/// trigger mode and polling rate to their listeners.
///
/// # Examples
///
/// ```rust,no_run
/// use app_monitor::app::{AppDescriptor, ApplicationChangeMonitor};
/// use app_monitor::core::MonitorConfig;
/// use app_monitor::notify::PollingNotifier;
/// use app_monitor::scheduler::Scheduler;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let monitor = ApplicationChangeMonitor::new(
///     Arc::new(PollingNotifier::new()),
///     Scheduler::current(),
///     MonitorConfig::default(),
/// );
///
/// monitor.add_application(
///     AppDescriptor::new("shop", |is_remove: bool| println!("remove = {is_remove}"))
///         .with_content_root("/srv/apps/shop.war"),
/// );
/// # }
/// ```
pub struct ApplicationChangeMonitor {
    notifier: Arc<dyn ChangeNotifier>,
    scheduler: Scheduler,
    suffixes: Arc<MinorUpdateSuffixes>,
    config: ArcSwap<MonitorConfig>,
    registrations: Mutex<HashMap<String, Registration>>,
    #[cfg(feature = "metrics")]
    metrics: Option<MonitorMetrics>,
}

impl ApplicationChangeMonitor {
    /// Create a monitor using the built-in minor-update suffixes.
    pub fn new(notifier: Arc<dyn ChangeNotifier>, scheduler: Scheduler, config: MonitorConfig) -> Self {
        Self {
            notifier,
            scheduler,
            suffixes: Arc::new(MinorUpdateSuffixes::builtin()),
            config: ArcSwap::from_pointee(config),
            registrations: Mutex::new(HashMap::new()),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Replace the minor-update suffix list used by applications added from now on.
    pub fn with_suffixes(mut self, suffixes: MinorUpdateSuffixes) -> Self {
        self.suffixes = Arc::new(suffixes);
        self
    }

    /// Count delivered and dropped decisions.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: MonitorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start monitoring an application, replacing any previous registration
    /// with the same id.
    ///
    /// Never fails. An application without a usable content root is left
    /// unmonitored and a warning is logged.
    pub fn add_application(&self, descriptor: AppDescriptor) {
        let id = descriptor.id().to_string();
        let mut registrations = self.registrations.lock();

        if let Some(prior) = registrations.remove(&id) {
            tracing::debug!(app = %id, "replacing registration");
            prior.stop_terminally();
        }

        let Some(root) = descriptor.content_root() else {
            tracing::warn!(app = %id, "application has no content root, not monitored");
            return;
        };
        if !root.exists() {
            tracing::warn!(app = %id, root = %root.display(), "content root missing, not monitored");
            return;
        }

        let coalescer = Coalescer::new(
            id.clone(),
            descriptor.handler(),
            self.scheduler.clone(),
            DEBOUNCE_WINDOW,
        );
        #[cfg(feature = "metrics")]
        let coalescer = coalescer.with_metrics(self.metrics.clone());
        let coalescer = Arc::new(coalescer);

        let listeners = self.listeners_for(&descriptor, root, &coalescer);
        let registration = Registration::new(id.clone(), coalescer, listeners);

        let config = self.config.load();
        if config.trigger_mode.is_enabled() {
            let options = WatchOptions::new(config.polling_rate, config.trigger_mode);
            if let Err(e) = registration.start(options) {
                tracing::warn!(app = %id, root = %root.display(), error = %e, "cannot monitor application");
                registration.stop_terminally();
                return;
            }
        }

        tracing::info!(
            app = %id,
            root = %root.display(),
            listeners = registration.listeners().len(),
            "monitoring application"
        );
        registrations.insert(id, registration);
    }

    /// Stop monitoring `id`. Returns false if it was not monitored.
    pub fn remove_application(&self, id: &str) -> bool {
        let removed = self.registrations.lock().remove(id);
        match removed {
            Some(registration) => {
                registration.stop_terminally();
                tracing::info!(app = %id, "stopped monitoring application");
                true
            }
            None => false,
        }
    }

    /// Apply a new configuration to every registration.
    ///
    /// Switching into [`TriggerMode::Disabled`] stops all listeners;
    /// switching out of it restarts them. While enabled, a changed polling
    /// rate or trigger mode is pushed to live listeners. Registrations are
    /// never recreated.
    ///
    /// [`TriggerMode::Disabled`]: crate::core::TriggerMode::Disabled
    pub fn refresh(&self, config: &MonitorConfig) {
        let registrations = self.registrations.lock();
        let previous = self.config.swap(Arc::new(config.clone()));

        if !config.trigger_mode.is_enabled() {
            if previous.trigger_mode.is_enabled() {
                tracing::info!(count = registrations.len(), "change detection disabled");
                for registration in registrations.values() {
                    registration.stop_listeners();
                }
            }
            return;
        }

        let options = WatchOptions::new(config.polling_rate, config.trigger_mode);
        let previous_options = WatchOptions::new(previous.polling_rate, previous.trigger_mode);
        if previous.trigger_mode.is_enabled() && previous_options == options {
            return;
        }

        tracing::debug!(
            interval = ?config.polling_rate,
            mode = %config.trigger_mode,
            "applying watch options"
        );
        for (id, registration) in registrations.iter() {
            if let Err(e) = registration.start(options) {
                tracing::warn!(app = %id, error = %e, "cannot restart listeners");
            }
        }
    }

    /// Stop every registration for good.
    pub fn stop_all(&self) {
        let drained: Vec<_> = self.registrations.lock().drain().collect();
        for (_, registration) in drained {
            registration.stop_terminally();
        }
    }

    /// Whether `id` has a registration.
    pub fn is_monitored(&self, id: &str) -> bool {
        self.registrations.lock().contains_key(id)
    }

    /// Whether every content-root listener of `id` is currently bound.
    pub fn is_listening(&self, id: &str) -> bool {
        self.registrations
            .lock()
            .get(id)
            .is_some_and(Registration::is_listening)
    }

    /// Ids of all registered applications, sorted.
    pub fn application_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.registrations.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The configuration last applied by [`refresh`](Self::refresh).
    pub fn config(&self) -> Arc<MonitorConfig> {
        self.config.load_full()
    }

    fn listeners_for(
        &self,
        descriptor: &AppDescriptor,
        root: &Path,
        coalescer: &Arc<Coalescer>,
    ) -> Vec<Listener> {
        let listener = |kind, path: &Path| {
            Listener::new(kind, path, Arc::clone(coalescer), Arc::clone(&self.notifier))
        };

        if descriptor.targets().is_empty() {
            return vec![listener(ListenerKind::Complete, root)];
        }

        // Root first, so a missing root fails before any target is bound.
        let mut listeners = vec![listener(
            ListenerKind::Root {
                watch_structure: descriptor.watches_root_structure(),
            },
            root,
        )];
        for target in descriptor.targets() {
            let kind = ListenerKind::Content {
                suffixes: Arc::clone(&self.suffixes),
                redefiner: descriptor.redefiner(),
            };
            listeners.push(listener(kind, &root.join(target)));
        }
        listeners
    }
}

impl Drop for ApplicationChangeMonitor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for ApplicationChangeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationChangeMonitor")
            .field("applications", &self.application_ids())
            .field("config", &self.config.load())
            .finish_non_exhaustive()
    }
}

//! The host-facing monitor handle.

use crate::app::{AppDescriptor, ApplicationChangeMonitor};
use crate::core::{AppMonitorBuilder, ConfigCell, ConfigChange, ConfigLoader, MonitorConfig, MonitorConfigUpdate, TriggerMode};
use crate::dropins::{DropinMonitor, RecordStore};
use crate::error::{MonitorError, Result};
use crate::notify::{ChangeNotifier, SubscriptionHandle};
use crate::scheduler::Scheduler;
use parking_lot::ReentrantMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Application change monitoring and dropin discovery driven by the host
/// lifecycle.
///
/// The host calls [`activate`](Self::activate) once, [`modified`](Self::modified)
/// on every reconfiguration and [`deactivate`](Self::deactivate) on shutdown.
/// Applications are registered with [`add_application`](Self::add_application)
/// whenever the host installs them.
///
/// # Examples
///
/// ```rust,no_run
/// use app_monitor::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let monitor = AppMonitor::builder().build()?;
/// monitor.activate(&MonitorConfigUpdate::new().with_dropins_location("/srv/dropins"))?;
///
/// monitor.add_application(
///     AppDescriptor::new("shop", |is_remove: bool| {
///         println!("shop changed, remove = {is_remove}");
///     })
///     .with_content_root("/srv/dropins/shop.war"),
/// );
///
/// monitor.deactivate();
/// # Ok(())
/// # }
/// ```
pub struct AppMonitor {
    config: ConfigCell,
    loader: Option<ConfigLoader>,
    notifier: Arc<dyn ChangeNotifier>,
    store: Arc<dyn RecordStore>,
    scheduler: Scheduler,
    applications: ApplicationChangeMonitor,
    dropins: DropinMonitor,
    active: AtomicBool,
    // Reentrant so record subscribers may reconfigure from inside a lifecycle call.
    lifecycle: ReentrantMutex<()>,
}

impl AppMonitor {
    /// Create a new builder for constructing a monitor.
    pub fn builder() -> AppMonitorBuilder {
        AppMonitorBuilder::new()
    }

    pub(crate) fn from_parts(
        loader: Option<ConfigLoader>,
        notifier: Arc<dyn ChangeNotifier>,
        store: Arc<dyn RecordStore>,
        scheduler: Scheduler,
        applications: ApplicationChangeMonitor,
        dropins: DropinMonitor,
    ) -> Self {
        Self {
            config: ConfigCell::new(applications.config().as_ref().clone()),
            loader,
            notifier,
            store,
            scheduler,
            applications,
            dropins,
            active: AtomicBool::new(false),
            lifecycle: ReentrantMutex::new(()),
        }
    }

    /// Start with `update` laid over the built-in defaults.
    ///
    /// Removes dropin records left over from a previous run before the
    /// dropins directory is scanned.
    ///
    /// # Errors
    ///
    /// Returns an error if `update` fails validation; nothing is started then.
    pub fn activate(&self, update: &MonitorConfigUpdate) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let change = self.config.reset(update)?;
        let config = change.current;

        self.scheduler.reopen();
        self.applications.refresh(&config);
        self.dropins.start(&config);
        self.active.store(true, Ordering::Release);

        tracing::info!(
            polling_rate = ?config.polling_rate,
            trigger = %config.trigger_mode,
            dropins = %config.dropins_location,
            dropins_enabled = config.dropins_enabled,
            "application monitor activated"
        );
        Ok(())
    }

    /// Load the configured sources and [`activate`](Self::activate) with them.
    ///
    /// # Errors
    ///
    /// Fails if the builder was given no sources or loading fails.
    pub fn activate_from_sources(&self) -> Result<()> {
        let update = self.load_sources()?;
        self.activate(&update)
    }

    /// Apply a reconfiguration; fields absent from `update` keep their values.
    ///
    /// # Errors
    ///
    /// Returns an error if `update` fails validation; the previous
    /// configuration stays in effect.
    pub fn modified(&self, update: &MonitorConfigUpdate) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let change = self.config.apply(update)?;
        if change.is_changed() {
            self.applications.refresh(&change.current);
        }
        // Unchanged settings still prune vanished dropins and rescan.
        if self.active.load(Ordering::Acquire) {
            self.dropins.refresh(&change.current);
        }
        Ok(())
    }

    /// Reload the configured sources and apply them as a reconfiguration.
    ///
    /// # Errors
    ///
    /// Fails if the builder was given no sources, loading fails or the
    /// loaded values are invalid.
    pub fn reload(&self) -> Result<()> {
        let update = self.load_sources()?;
        self.modified(&update)
    }

    /// Stop everything: dropin records are deleted, registrations are stopped
    /// for good and pending decisions are dropped.
    ///
    /// A later [`activate`](Self::activate) starts over; applications must be
    /// added again.
    pub fn deactivate(&self) {
        let _lifecycle = self.lifecycle.lock();
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.dropins.stop();
        self.applications.stop_all();
        self.scheduler.shutdown();
        tracing::info!("application monitor deactivated");
    }

    /// Scan now. Only has an effect in [`TriggerMode::Mbean`].
    pub fn trigger_scan(&self) {
        let mode = self.config.get().trigger_mode;
        if mode == TriggerMode::Mbean {
            tracing::debug!("external scan requested");
            self.notifier.trigger();
        } else {
            tracing::debug!(%mode, "scan request ignored, not externally triggered");
        }
    }

    /// Start monitoring an application. See [`ApplicationChangeMonitor::add_application`].
    pub fn add_application(&self, descriptor: AppDescriptor) {
        self.applications.add_application(descriptor);
    }

    /// Stop monitoring `id`. Returns false if it was not monitored.
    pub fn remove_application(&self, id: &str) -> bool {
        self.applications.remove_application(id)
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<MonitorConfig> {
        self.config.get()
    }

    /// Receive every configuration change until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle<ConfigChange>
    where
        F: Fn(&ConfigChange) + Send + Sync + 'static,
    {
        self.config.subscribe(callback)
    }

    /// Whether [`activate`](Self::activate) ran and [`deactivate`](Self::deactivate) did not.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The application registry.
    pub fn applications(&self) -> &ApplicationChangeMonitor {
        &self.applications
    }

    /// The dropins directory monitor.
    pub fn dropins(&self) -> &DropinMonitor {
        &self.dropins
    }

    /// The record store dropins are written to.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn load_sources(&self) -> Result<MonitorConfigUpdate> {
        self.loader
            .as_ref()
            .ok_or_else(|| MonitorError::Other("No configuration sources to load".to_string()))?
            .load()
    }
}

impl std::fmt::Debug for AppMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppMonitor")
            .field("config", &self.config.get())
            .field("active", &self.is_active())
            .field("applications", &self.applications)
            .field("dropins", &self.dropins)
            .finish_non_exhaustive()
    }
}

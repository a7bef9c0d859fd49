//! Builder for constructing AppMonitor instances.

use crate::app::{ApplicationChangeMonitor, MinorUpdateSuffixes};
use crate::core::{AppMonitor, ConfigLoader, MonitorConfig};
use crate::dropins::{DropinMonitor, MemoryRecordStore, PathResolver, RecordStore, SymbolicResolver};
use crate::error::Result;
use crate::notify::ChangeNotifier;
use crate::scheduler::Scheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;

/// Builder for constructing an [`AppMonitor`].
///
/// Every collaborator has a default: a [`PollingNotifier`], an in-memory
/// record store, a resolver relative to the working directory and the tokio
/// runtime of the calling context.
///
/// [`PollingNotifier`]: crate::notify::PollingNotifier
///
/// # Examples
///
/// ```rust,no_run
/// use app_monitor::prelude::*;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let store = Arc::new(MemoryRecordStore::new());
/// let monitor = AppMonitor::builder()
///     .with_store(store.clone())
///     .with_resolver(Arc::new(SymbolicResolver::new("/srv/server")))
///     .with_minor_update_suffixes(".html,.css")
///     .with_file("/srv/server/monitor.yaml")
///     .with_env_overrides("APP_MONITOR")
///     .build()?;
///
/// monitor.activate_from_sources()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct AppMonitorBuilder {
    notifier: Option<Arc<dyn ChangeNotifier>>,
    store: Option<Arc<dyn RecordStore>>,
    resolver: Option<Arc<dyn PathResolver>>,
    scheduler: Option<Scheduler>,
    suffix_override: Option<String>,
    file_paths: Vec<PathBuf>,
    env_prefix: Option<String>,
    #[cfg(feature = "metrics")]
    meter: Option<opentelemetry::metrics::Meter>,
}

impl AppMonitorBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `notifier` for all watches.
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Write dropin records to `store`.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Resolve the dropins location and configured record locations with `resolver`.
    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Run debounce timers on `scheduler`.
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Run debounce timers on `runtime`.
    pub fn with_runtime(self, runtime: Handle) -> Self {
        self.with_scheduler(Scheduler::new(runtime))
    }

    /// Append comma-separated suffixes to the built-in minor-update list.
    pub fn with_minor_update_suffixes(mut self, suffixes: impl Into<String>) -> Self {
        self.suffix_override = Some(suffixes.into());
        self
    }

    /// Add a configuration file for [`AppMonitor::activate_from_sources`] and
    /// [`AppMonitor::reload`]. Later files override earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Read `<prefix>_*` environment variables, overriding every file.
    pub fn with_env_overrides(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Record counters on `meter`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Wire the collaborators into a monitor. Nothing is watched until
    /// [`AppMonitor::activate`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if no notifier was given and the `file-watch`
    /// feature is disabled.
    pub fn build(self) -> Result<AppMonitor> {
        let notifier = match self.notifier {
            Some(notifier) => notifier,
            None => default_notifier()?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryRecordStore::new()));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(SymbolicResolver::current_dir()));
        let scheduler = self.scheduler.unwrap_or_else(Scheduler::current);
        if !scheduler.is_available() {
            tracing::warn!("no tokio runtime available, application changes will be dropped");
        }

        let suffixes = match &self.suffix_override {
            Some(extra) => MinorUpdateSuffixes::with_override(extra),
            None => MinorUpdateSuffixes::builtin(),
        };

        let applications = ApplicationChangeMonitor::new(
            Arc::clone(&notifier),
            scheduler.clone(),
            MonitorConfig::default(),
        )
        .with_suffixes(suffixes);
        let dropins = DropinMonitor::new(Arc::clone(&notifier), Arc::clone(&store), resolver);

        #[cfg(feature = "metrics")]
        let (applications, dropins) = match self.meter {
            Some(meter) => {
                let metrics = MonitorMetrics::new(meter);
                (
                    applications.with_metrics(metrics.clone()),
                    dropins.with_metrics(metrics),
                )
            }
            None => (applications, dropins),
        };

        let loader = (!self.file_paths.is_empty() || self.env_prefix.is_some()).then(|| {
            let loader = self
                .file_paths
                .into_iter()
                .fold(ConfigLoader::new(), ConfigLoader::with_file);
            match self.env_prefix {
                Some(prefix) => loader.with_env_prefix(prefix),
                None => loader,
            }
        });

        Ok(AppMonitor::from_parts(
            loader,
            notifier,
            store,
            scheduler,
            applications,
            dropins,
        ))
    }
}

#[cfg(feature = "file-watch")]
fn default_notifier() -> Result<Arc<dyn ChangeNotifier>> {
    Ok(Arc::new(crate::notify::PollingNotifier::new()))
}

#[cfg(not(feature = "file-watch"))]
fn default_notifier() -> Result<Arc<dyn ChangeNotifier>> {
    Err(crate::error::MonitorError::Other(
        "No change notifier configured and the file-watch feature is disabled".to_string(),
    ))
}

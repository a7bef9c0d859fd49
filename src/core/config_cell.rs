//! Lock-free holder of the current monitor configuration.

use crate::core::{MonitorConfig, MonitorConfigUpdate};
use crate::error::Result;
use crate::notify::{SubscriberRegistry, SubscriptionHandle};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "validation")]
use crate::core::Validate;

/// The snapshots on either side of one reconfiguration.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// The snapshot that was replaced.
    pub previous: Arc<MonitorConfig>,
    /// The snapshot now in effect.
    pub current: Arc<MonitorConfig>,
}

impl ConfigChange {
    /// Returns true if any field differs.
    pub fn is_changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Single-writer, many-reader cell for [`MonitorConfig`] snapshots.
///
/// Reads are lock-free through `arc-swap`. Writers are serialized so that
/// each update overlays the snapshot it actually replaces, and subscribers
/// see changes in the order they were applied.
///
/// # Examples
///
/// ```rust
/// use app_monitor::core::{ConfigCell, MonitorConfig, MonitorConfigUpdate, TriggerMode};
///
/// let cell = ConfigCell::new(MonitorConfig::default());
/// let change = cell
///     .apply(&MonitorConfigUpdate::new().with_trigger_mode(TriggerMode::Mbean))
///     .unwrap();
///
/// assert_eq!(change.previous.trigger_mode, TriggerMode::Polled);
/// assert_eq!(cell.get().trigger_mode, TriggerMode::Mbean);
/// ```
pub struct ConfigCell {
    current: ArcSwap<MonitorConfig>,
    writer: Mutex<()>,
    subscribers: SubscriberRegistry<ConfigChange>,
}

impl ConfigCell {
    /// Create a cell holding `initial`.
    pub fn new(initial: MonitorConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// The current snapshot.
    pub fn get(&self) -> Arc<MonitorConfig> {
        self.current.load_full()
    }

    /// Overlay `update` onto the current snapshot.
    ///
    /// # Errors
    ///
    /// With the `validation` feature, an invalid update is rejected and the
    /// current snapshot is kept.
    pub fn apply(&self, update: &MonitorConfigUpdate) -> Result<ConfigChange> {
        #[cfg(feature = "validation")]
        update.validate()?;

        let _writer = self.writer.lock();
        let previous = self.current.load_full();
        let current = Arc::new(MonitorConfig::overlay(Some(&previous), update));
        Ok(self.swap_locked(previous, current))
    }

    /// Overlay `update` onto the built-in defaults, discarding the current snapshot.
    ///
    /// # Errors
    ///
    /// As for [`apply`](Self::apply).
    pub fn reset(&self, update: &MonitorConfigUpdate) -> Result<ConfigChange> {
        #[cfg(feature = "validation")]
        update.validate()?;

        Ok(self.replace(MonitorConfig::overlay(None, update)))
    }

    /// Install `config` as is.
    pub fn replace(&self, config: MonitorConfig) -> ConfigChange {
        let _writer = self.writer.lock();
        let previous = self.current.load_full();
        self.swap_locked(previous, Arc::new(config))
    }

    /// Receive every change until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle<ConfigChange>
    where
        F: Fn(&ConfigChange) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    fn swap_locked(&self, previous: Arc<MonitorConfig>, current: Arc<MonitorConfig>) -> ConfigChange {
        self.current.store(Arc::clone(&current));
        let change = ConfigChange { previous, current };
        if change.is_changed() {
            tracing::debug!(config = ?change.current, "monitor configuration changed");
            self.subscribers.notify_all(&change);
        }
        change
    }
}

impl Default for ConfigCell {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl std::fmt::Debug for ConfigCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCell")
            .field("current", &self.current.load())
            .finish_non_exhaustive()
    }
}

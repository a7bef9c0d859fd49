//! The contract between monitors and the file change notification mechanism.

use crate::core::TriggerMode;
use crate::error::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Identifies one live watch registered with a [`ChangeNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// When a watch scans for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Interval between scans in timed mode.
    pub interval: Duration,
    /// Scan only when [`ChangeNotifier::trigger`] is called.
    pub external_trigger: bool,
}

impl WatchOptions {
    /// Options for the given polling rate and trigger mode.
    pub fn new(interval: Duration, mode: TriggerMode) -> Self {
        Self {
            interval,
            external_trigger: mode == TriggerMode::Mbean,
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::new(crate::core::DEFAULT_POLLING_RATE, TriggerMode::Polled)
    }
}

/// A request to watch one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    /// The watched file or directory.
    pub path: PathBuf,
    /// Whether the whole tree below `path` is watched, or only its direct children.
    pub recursive: bool,
    /// Scan options.
    pub options: WatchOptions,
}

/// The paths that changed between two scans of one watch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Paths that appeared.
    pub added: BTreeSet<PathBuf>,
    /// Paths that disappeared.
    pub removed: BTreeSet<PathBuf>,
    /// Paths whose content or timestamp changed.
    pub modified: BTreeSet<PathBuf>,
}

impl ChangeSet {
    /// An empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an appeared path.
    pub fn added(mut self, path: impl Into<PathBuf>) -> Self {
        self.added.insert(path.into());
        self
    }

    /// Add a disappeared path.
    pub fn removed(mut self, path: impl Into<PathBuf>) -> Self {
        self.removed.insert(path.into());
        self
    }

    /// Add a modified path.
    pub fn modified(mut self, path: impl Into<PathBuf>) -> Self {
        self.modified.insert(path.into());
        self
    }

    /// True when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// True when paths were added or removed.
    pub fn is_structural(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// True when `path` itself disappeared.
    pub fn removes(&self, path: &Path) -> bool {
        self.removed.contains(path)
    }
}

/// Receives the change sets of one watch.
///
/// Called on the notification mechanism's own threads; implementations must
/// not block for long.
pub trait ChangeSink: Send + Sync {
    /// Handle one batch of changes.
    fn on_change(&self, changes: &ChangeSet);
}

impl<F> ChangeSink for F
where
    F: Fn(&ChangeSet) + Send + Sync,
{
    fn on_change(&self, changes: &ChangeSet) {
        self(changes)
    }
}

/// A file change notification mechanism.
///
/// The mechanism delivers the paths that changed since the previous scan of a
/// watch; the first scan only establishes the baseline.
pub trait ChangeNotifier: Send + Sync {
    /// Start watching `request.path`, delivering changes to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist or cannot be watched.
    fn watch(&self, request: WatchRequest, sink: Arc<dyn ChangeSink>) -> Result<WatchId>;

    /// Apply new scan options to a live watch.
    fn reconfigure(&self, id: WatchId, options: WatchOptions) -> Result<()>;

    /// Stop a watch. Unknown ids are ignored.
    fn unwatch(&self, id: WatchId);

    /// Scan every externally triggered watch now.
    fn trigger(&self);
}

//! Listeners bind one monitored path to the notification mechanism and
//! classify its change sets.

use super::descriptor::Redefiner;
use super::registration::{Coalescer, UpdateKind};
use super::suffix::MinorUpdateSuffixes;
use crate::error::Result;
use crate::notify::{ChangeNotifier, ChangeSet, ChangeSink, WatchId, WatchOptions, WatchRequest};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What a listener watches and how it judges changes.
#[derive(Clone)]
pub enum ListenerKind {
    /// The content root itself, non-recursively. Detects deletion of the application.
    Root {
        /// Also report entries added to or removed from the top of the root.
        watch_structure: bool,
    },
    /// An explicit target below the content root, recursively.
    ///
    /// Never reports removal; a root listener covers that.
    Content {
        /// Suffixes of files that may change without a restart.
        suffixes: Arc<MinorUpdateSuffixes>,
        /// Confirms that modified classes were redefined in place.
        redefiner: Option<Arc<dyn Redefiner>>,
    },
    /// The whole tree below the content root.
    Complete,
}

impl ListenerKind {
    /// Whether the bound path is watched recursively.
    pub fn is_recursive(&self) -> bool {
        !matches!(self, ListenerKind::Root { .. })
    }

    /// Whether the listener is bound to the content root (and so detects its deletion).
    pub fn watches_root(&self) -> bool {
        !matches!(self, ListenerKind::Content { .. })
    }

    /// Judge one change set of the watch bound at `path`.
    pub fn classify(&self, path: &Path, changes: &ChangeSet) -> Option<UpdateKind> {
        match self {
            ListenerKind::Root { watch_structure } => {
                if changes.removes(path) {
                    Some(UpdateKind::Remove)
                } else if *watch_structure && changes.is_structural() {
                    Some(UpdateKind::Update)
                } else if changes.modified.contains(path) {
                    Some(UpdateKind::Update)
                } else {
                    None
                }
            }
            ListenerKind::Content {
                suffixes,
                redefiner,
            } => {
                if changes.is_structural() {
                    return Some(UpdateKind::Update);
                }
                if changes.modified.is_empty() {
                    return None;
                }
                let minor = changes.modified.iter().all(|p| suffixes.allows(p))
                    && redefiner
                        .as_ref()
                        .is_some_and(|r| r.redefine(&changes.modified));
                (!minor).then_some(UpdateKind::Update)
            }
            ListenerKind::Complete => {
                if changes.removes(path) {
                    Some(UpdateKind::Remove)
                } else if changes.is_empty() {
                    None
                } else {
                    Some(UpdateKind::Update)
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ListenerKind::Root { .. } => "root",
            ListenerKind::Content { .. } => "content",
            ListenerKind::Complete => "complete",
        }
    }
}

impl std::fmt::Debug for ListenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerKind::Root { watch_structure } => f
                .debug_struct("Root")
                .field("watch_structure", watch_structure)
                .finish(),
            ListenerKind::Content {
                suffixes,
                redefiner,
            } => f
                .debug_struct("Content")
                .field("suffixes", suffixes)
                .field("redefiner", &redefiner.is_some())
                .finish(),
            ListenerKind::Complete => f.write_str("Complete"),
        }
    }
}

struct Classifier {
    kind: ListenerKind,
    path: PathBuf,
    coalescer: Arc<Coalescer>,
}

impl ChangeSink for Classifier {
    fn on_change(&self, changes: &ChangeSet) {
        if let Some(kind) = self.kind.classify(&self.path, changes) {
            self.coalescer.queue_event(kind);
        }
    }
}

struct Binding {
    options: WatchOptions,
    watch: Option<WatchId>,
}

/// One monitored path of one application.
///
/// Moves between unregistered and listening. Both transitions are guarded by
/// a compare-and-set on the `listening` flag, so redundant or concurrent
/// `start`/`stop` calls register and unregister at most once.
pub(crate) struct Listener {
    classifier: Arc<Classifier>,
    notifier: Arc<dyn ChangeNotifier>,
    listening: AtomicBool,
    binding: Mutex<Binding>,
}

impl Listener {
    pub(crate) fn new(
        kind: ListenerKind,
        path: impl Into<PathBuf>,
        coalescer: Arc<Coalescer>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            classifier: Arc::new(Classifier {
                kind,
                path: path.into(),
                coalescer,
            }),
            notifier,
            listening: AtomicBool::new(false),
            binding: Mutex::new(Binding {
                options: WatchOptions::default(),
                watch: None,
            }),
        }
    }

    pub(crate) fn kind(&self) -> &ListenerKind {
        &self.classifier.kind
    }

    pub(crate) fn path(&self) -> &Path {
        &self.classifier.path
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Apply `options` and register with the notifier unless already listening.
    ///
    /// A listener that is already registered gets the new options pushed to
    /// its live watch instead.
    pub(crate) fn start(&self, options: WatchOptions) -> Result<()> {
        let mut binding = self.binding.lock();
        let previous = std::mem::replace(&mut binding.options, options);

        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let request = WatchRequest {
                path: self.classifier.path.clone(),
                recursive: self.classifier.kind.is_recursive(),
                options,
            };
            let sink: Arc<dyn ChangeSink> = self.classifier.clone();
            match self.notifier.watch(request, sink) {
                Ok(id) => {
                    tracing::debug!(
                        app = %self.classifier.coalescer.app_id(),
                        listener = self.classifier.kind.name(),
                        path = %self.classifier.path.display(),
                        "listening"
                    );
                    binding.watch = Some(id);
                }
                Err(e) => {
                    self.listening.store(false, Ordering::Release);
                    return Err(e);
                }
            }
        } else if previous != options {
            if let Some(id) = binding.watch {
                self.notifier.reconfigure(id, options)?;
            }
        }
        Ok(())
    }

    /// Unregister from the notifier if listening.
    pub(crate) fn stop(&self) {
        let mut binding = self.binding.lock();
        if self
            .listening
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Some(id) = binding.watch.take() {
                self.notifier.unwatch(id);
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

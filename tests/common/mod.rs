//! Shared helpers for integration tests.

#![allow(dead_code)]

use app_monitor::error::{MonitorError, Result};
use app_monitor::notify::{ChangeNotifier, ChangeSet, ChangeSink, WatchId, WatchOptions, WatchRequest};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::time::Instant;

struct FakeWatch {
    request: WatchRequest,
    sink: Arc<dyn ChangeSink>,
}

/// A notifier that delivers only what a test pushes with [`FakeNotifier::emit`].
#[derive(Default)]
pub struct FakeNotifier {
    watches: Mutex<BTreeMap<WatchId, FakeWatch>>,
    failing: Mutex<HashSet<PathBuf>>,
    next_id: AtomicU64,
    registered: AtomicUsize,
    triggers: AtomicUsize,
    reconfigured: Mutex<Vec<(PathBuf, WatchOptions)>>,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every future watch of `path` fail.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Deliver `changes` to every live watch bound at `path`.
    pub fn emit(&self, path: impl AsRef<Path>, changes: ChangeSet) {
        let sinks: Vec<_> = self
            .watches
            .lock()
            .values()
            .filter(|w| w.request.path == path.as_ref())
            .map(|w| Arc::clone(&w.sink))
            .collect();
        for sink in sinks {
            sink.on_change(&changes);
        }
    }

    pub fn requests(&self) -> Vec<WatchRequest> {
        self.watches.lock().values().map(|w| w.request.clone()).collect()
    }

    pub fn watch_count(&self) -> usize {
        self.watches.lock().len()
    }

    pub fn is_watched(&self, path: impl AsRef<Path>) -> bool {
        self.watches
            .lock()
            .values()
            .any(|w| w.request.path == path.as_ref())
    }

    pub fn options_of(&self, path: impl AsRef<Path>) -> Option<WatchOptions> {
        self.watches
            .lock()
            .values()
            .find(|w| w.request.path == path.as_ref())
            .map(|w| w.request.options)
    }

    /// Total successful `watch` calls so far.
    pub fn registrations(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }

    pub fn reconfigured(&self) -> Vec<(PathBuf, WatchOptions)> {
        self.reconfigured.lock().clone()
    }
}

impl ChangeNotifier for FakeNotifier {
    fn watch(&self, request: WatchRequest, sink: Arc<dyn ChangeSink>) -> Result<WatchId> {
        if !request.path.exists() || self.failing.lock().contains(&request.path) {
            return Err(MonitorError::watch(&request.path, "cannot watch"));
        }
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.watches.lock().insert(id, FakeWatch { request, sink });
        self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn reconfigure(&self, id: WatchId, options: WatchOptions) -> Result<()> {
        let mut watches = self.watches.lock();
        let watch = watches.get_mut(&id).ok_or(MonitorError::UnknownWatch(id.0))?;
        watch.request.options = options;
        self.reconfigured
            .lock()
            .push((watch.request.path.clone(), options));
        Ok(())
    }

    fn unwatch(&self, id: WatchId) {
        self.watches.lock().remove(&id);
    }

    fn trigger(&self) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
    }
}

/// Update handler calls with the (paused) time they arrived at.
#[derive(Clone, Default)]
pub struct Calls {
    inner: Arc<Mutex<Vec<(Instant, bool)>>>,
}

impl Calls {
    pub fn handler(&self) -> impl Fn(bool) + Send + Sync + 'static {
        let inner = Arc::clone(&self.inner);
        move |is_remove| inner.lock().push((Instant::now(), is_remove))
    }

    pub fn kinds(&self) -> Vec<bool> {
        self.inner.lock().iter().map(|(_, remove)| *remove).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.inner.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

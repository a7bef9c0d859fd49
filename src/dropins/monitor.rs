//! Reconciliation of the dropins directory with the record store.

use super::resolve::PathResolver;
use super::store::{AppRecord, RecordFilter, RecordId, RecordStore};
use crate::core::MonitorConfig;
use crate::notify::{ChangeNotifier, ChangeSet, ChangeSink, WatchId, WatchOptions, WatchRequest};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;

const XML_SUFFIX: &str = ".xml";

/// Which watch a batch of changes came from.
enum Scope {
    Root(PathBuf),
    Group(PathBuf),
}

struct DropinSink {
    inner: Weak<DropinInner>,
    scope: Scope,
}

impl ChangeSink for DropinSink {
    fn on_change(&self, changes: &ChangeSet) {
        if let Some(inner) = self.inner.upgrade() {
            inner.run(|state| inner.apply_changes(state, &self.scope, changes));
        }
    }
}

/// A record store call decided under the state lock and made after it is released.
enum StoreOp {
    Create { key: PathBuf, record: AppRecord },
    Delete { key: PathBuf, id: RecordId },
}

#[derive(Default)]
struct DropinState {
    location: Option<PathBuf>,
    created_dir: bool,
    root_watch: Option<WatchId>,
    groups: HashMap<PathBuf, WatchId>,
    /// `None` while the record is being created.
    tracked: HashMap<PathBuf, Option<RecordId>>,
    options: WatchOptions,
    deferred: Vec<StoreOp>,
}

impl DropinState {
    fn untrack(&mut self, key: &Path) {
        if let Some(Some(id)) = self.tracked.remove(key) {
            self.deferred.push(StoreOp::Delete {
                key: key.to_path_buf(),
                id,
            });
        }
    }

    fn queued_deletes(&self) -> HashSet<RecordId> {
        self.deferred
            .iter()
            .filter_map(|op| match op {
                StoreOp::Delete { id, .. } => Some(*id),
                StoreOp::Create { .. } => None,
            })
            .collect()
    }
}

struct DropinInner {
    notifier: Arc<dyn ChangeNotifier>,
    store: Arc<dyn RecordStore>,
    resolver: Arc<dyn PathResolver>,
    state: Mutex<DropinState>,
    #[cfg(feature = "metrics")]
    metrics: Option<MonitorMetrics>,
}

/// Watches the dropins directory and keeps one auto-install record per
/// application found in it.
///
/// Files and directories directly inside the dropins directory are
/// applications. A directory whose name has no `.` is a group instead: it
/// gets its own watch, and each visible entry inside it is an application
/// typed by the group's name. Groups are one level deep: the group watch is
/// not recursive, and a dot-less directory inside a group is an application,
/// not a nested group. Names starting with `.` are ignored.
///
/// Records are keyed by the entry's path with a trailing `.xml` removed, so
/// `shop.war` and `shop.war.xml` describe the same application.
///
/// Operations and change batches are serialized under one lock. Record store
/// calls are made after that lock is released, so store subscribers may call
/// back into the monitor. Record store failures are logged and otherwise
/// ignored.
pub struct DropinMonitor {
    inner: Arc<DropinInner>,
}

impl DropinMonitor {
    /// Create an idle monitor.
    pub fn new(
        notifier: Arc<dyn ChangeNotifier>,
        store: Arc<dyn RecordStore>,
        resolver: Arc<dyn PathResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(DropinInner {
                notifier,
                store,
                resolver,
                state: Mutex::new(DropinState::default()),
                #[cfg(feature = "metrics")]
                metrics: None,
            }),
        }
    }

    /// Count created and deleted records and store failures.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: MonitorMetrics) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.metrics = Some(metrics);
        }
        self
    }

    /// Remove records left behind by a previous run, then apply `config`.
    pub fn start(&self, config: &MonitorConfig) {
        let inner = &self.inner;
        inner.run(|state| {
            let swept = inner.purge_auto_installed(state);
            if swept > 0 {
                tracing::info!(count = swept, "removing dropin records from a previous run");
            }
            inner.refresh(state, config);
        });
    }

    /// Apply `config`.
    ///
    /// Disabling dropins deletes every dropin record. A changed location
    /// moves the monitor, dropping the records of the old one. Disabling the
    /// trigger only pauses the watch; records are kept. Records whose
    /// backing path disappeared in the meantime are pruned either way.
    pub fn refresh(&self, config: &MonitorConfig) {
        let inner = &self.inner;
        inner.run(|state| inner.refresh(state, config));
    }

    /// Stop watching and delete every record this monitor created.
    pub fn stop(&self) {
        let inner = &self.inner;
        inner.run(|state| inner.stop(state));
    }

    /// The resolved dropins directory, once configured.
    pub fn location(&self) -> Option<PathBuf> {
        self.inner.state.lock().location.clone()
    }

    /// Whether the dropins directory is currently watched.
    pub fn is_watching(&self) -> bool {
        self.inner.state.lock().root_watch.is_some()
    }

    /// Record keys of all tracked applications, sorted.
    pub fn tracked_locations(&self) -> Vec<PathBuf> {
        let mut tracked: Vec<_> = self.inner.state.lock().tracked.keys().cloned().collect();
        tracked.sort();
        tracked
    }

    /// The record created for `path`, with or without its `.xml` suffix.
    pub fn record_for(&self, path: impl AsRef<Path>) -> Option<RecordId> {
        let key = strip_xml(path.as_ref());
        self.inner.state.lock().tracked.get(&key).copied().flatten()
    }

    /// Grouped directories with a live watch, sorted.
    pub fn groups(&self) -> Vec<PathBuf> {
        let mut groups: Vec<_> = self.inner.state.lock().groups.keys().cloned().collect();
        groups.sort();
        groups
    }
}

impl Drop for DropinMonitor {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        self.inner.disarm(&mut state);
    }
}

impl std::fmt::Debug for DropinMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DropinMonitor")
            .field("location", &state.location)
            .field("watching", &state.root_watch.is_some())
            .field("groups", &state.groups.len())
            .field("tracked", &state.tracked.len())
            .finish()
    }
}

impl DropinInner {
    /// Run `f` under the state lock, then make the store calls it queued.
    fn run<R>(&self, f: impl FnOnce(&mut DropinState) -> R) -> R {
        let (result, ops) = {
            let mut state = self.state.lock();
            let result = f(&mut *state);
            (result, std::mem::take(&mut state.deferred))
        };
        for op in ops {
            match op {
                StoreOp::Create { key, record } => self.create_record(key, record),
                StoreOp::Delete { key, id } => self.delete_record(&key, id),
            }
        }
        result
    }

    fn refresh(self: &Arc<Self>, state: &mut DropinState, config: &MonitorConfig) {
        if !config.dropins_enabled {
            if state.root_watch.is_some() || !state.tracked.is_empty() {
                tracing::info!("dropins disabled");
            }
            self.stop(state);
            return;
        }

        let location = self.resolver.resolve(&config.dropins_location);
        if state.location.as_ref() != Some(&location) {
            if state.location.is_some() {
                self.relocate(state);
            }
            tracing::debug!(location = %location.display(), "dropins location set");
            state.location = Some(location);
            state.created_dir = false;
        }

        self.prune(state);
        self.disarm(state);
        state.options = WatchOptions::new(config.polling_rate, config.trigger_mode);

        if config.watches_dropins() {
            self.arm(state);
        } else {
            tracing::debug!("dropins watch paused, change detection disabled");
        }
    }

    fn stop(&self, state: &mut DropinState) {
        self.disarm(state);
        let keys: Vec<_> = state.tracked.keys().cloned().collect();
        for key in keys {
            state.untrack(&key);
        }
    }

    /// Drop the watches and records of the current location. Its directory
    /// is removed only if it was created here and is now empty.
    fn relocate(&self, state: &mut DropinState) {
        self.stop(state);
        self.purge_auto_installed(state);

        let Some(old) = state.location.take() else {
            return;
        };
        tracing::info!(old = %old.display(), "dropins location changed");
        if state.created_dir && is_empty_dir(&old) {
            match fs::remove_dir(&old) {
                Ok(()) => tracing::debug!(path = %old.display(), "removed unused dropins directory"),
                Err(e) => tracing::warn!(path = %old.display(), error = %e, "cannot remove old dropins directory"),
            }
        }
        state.created_dir = false;
    }

    /// Queue deletion of every auto-install record not already queued.
    fn purge_auto_installed(&self, state: &mut DropinState) -> usize {
        let records = match self.store.list(&RecordFilter::auto_installed()) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "cannot list dropin records");
                self.store_failed();
                return 0;
            }
        };

        let queued = state.queued_deletes();
        let mut count = 0;
        for (id, record) in records {
            if queued.contains(&id) {
                continue;
            }
            state.tracked.retain(|_, tracked| *tracked != Some(id));
            state.deferred.push(StoreOp::Delete {
                key: PathBuf::from(record.location),
                id,
            });
            count += 1;
        }
        count
    }

    fn prune(&self, state: &mut DropinState) {
        let gone: Vec<_> = state
            .tracked
            .keys()
            .filter(|path| !path.exists() && !with_xml(path).exists())
            .cloned()
            .collect();
        for path in gone {
            tracing::info!(path = %path.display(), "dropin disappeared while unwatched");
            state.untrack(&path);
        }
    }

    fn disarm(&self, state: &mut DropinState) {
        if let Some(id) = state.root_watch.take() {
            self.notifier.unwatch(id);
        }
        for (_, id) in state.groups.drain() {
            self.notifier.unwatch(id);
        }
    }

    fn arm(self: &Arc<Self>, state: &mut DropinState) {
        let Some(location) = state.location.clone() else {
            return;
        };

        if !location.exists() {
            match fs::create_dir_all(&location) {
                Ok(()) => {
                    tracing::info!(path = %location.display(), "created dropins directory");
                    state.created_dir = true;
                }
                Err(e) => {
                    tracing::error!(path = %location.display(), error = %e, "cannot create dropins directory");
                    return;
                }
            }
        } else if !location.is_dir() {
            tracing::warn!(path = %location.display(), "dropins location is not a directory");
            return;
        }

        let request = WatchRequest {
            path: location.clone(),
            recursive: false,
            options: state.options,
        };
        match self.notifier.watch(request, self.sink(Scope::Root(location.clone()))) {
            Ok(id) => state.root_watch = Some(id),
            Err(e) => {
                tracing::error!(path = %location.display(), error = %e, "cannot watch dropins directory");
                return;
            }
        }
        tracing::info!(path = %location.display(), "watching dropins");

        match sorted_children(&location) {
            Ok(children) => {
                for child in children {
                    self.add_entry(state, &child);
                }
            }
            Err(e) => tracing::error!(path = %location.display(), error = %e, "cannot list dropins"),
        }
    }

    fn sink(self: &Arc<Self>, scope: Scope) -> Arc<dyn ChangeSink> {
        Arc::new(DropinSink {
            inner: Arc::downgrade(self),
            scope,
        })
    }

    fn apply_changes(self: &Arc<Self>, state: &mut DropinState, scope: &Scope, changes: &ChangeSet) {
        match scope {
            Scope::Root(dir) => {
                if state.root_watch.is_none() || state.location.as_ref() != Some(dir) {
                    return;
                }
                for path in changes.removed.iter().filter(|p| p.parent() == Some(dir.as_path())) {
                    self.remove_entry(state, path);
                }
                for path in changes.added.iter().filter(|p| p.parent() == Some(dir.as_path())) {
                    self.add_entry(state, path);
                }
            }
            Scope::Group(dir) => {
                if !state.groups.contains_key(dir) {
                    return;
                }
                let group = file_name(dir);
                for path in changes.removed.iter().filter(|p| p.parent() == Some(dir.as_path())) {
                    self.remove_app(state, path);
                }
                for path in changes.added.iter().filter(|p| p.parent() == Some(dir.as_path())) {
                    self.add_group_member(state, path, &group);
                }
            }
        }
    }

    fn add_entry(self: &Arc<Self>, state: &mut DropinState, path: &Path) {
        let name = file_name(path);
        if name.is_empty() || name.starts_with('.') {
            return;
        }
        let Some(metadata) = entry_metadata(path) else {
            return;
        };

        if metadata.is_dir() && !name.contains('.') {
            self.add_group(state, path, &name);
        } else {
            self.register_app(state, path, inferred_type(path));
        }
    }

    fn add_group(self: &Arc<Self>, state: &mut DropinState, dir: &Path, group: &str) {
        if state.groups.contains_key(dir) {
            return;
        }
        let request = WatchRequest {
            path: dir.to_path_buf(),
            recursive: false,
            options: state.options,
        };
        match self.notifier.watch(request, self.sink(Scope::Group(dir.to_path_buf()))) {
            Ok(id) => {
                state.groups.insert(dir.to_path_buf(), id);
            }
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "cannot watch dropin group");
                return;
            }
        }
        tracing::debug!(path = %dir.display(), group, "watching dropin group");

        match sorted_children(dir) {
            Ok(children) => {
                for child in children {
                    self.add_group_member(state, &child, group);
                }
            }
            Err(e) => tracing::error!(path = %dir.display(), error = %e, "cannot list dropin group"),
        }
    }

    fn add_group_member(&self, state: &mut DropinState, path: &Path, group: &str) {
        let name = file_name(path);
        if name.is_empty() || name.starts_with('.') || entry_metadata(path).is_none() {
            return;
        }
        self.register_app(state, path, Some(group.to_string()));
    }

    fn remove_entry(&self, state: &mut DropinState, path: &Path) {
        let Some(id) = state.groups.remove(path) else {
            self.remove_app(state, path);
            return;
        };
        self.notifier.unwatch(id);
        tracing::debug!(path = %path.display(), "dropin group removed");

        let members: Vec<_> = state
            .tracked
            .keys()
            .filter(|key| key.parent() == Some(path))
            .cloned()
            .collect();
        for member in members {
            self.remove_app(state, &member);
        }
    }

    fn register_app(&self, state: &mut DropinState, path: &Path, app_type: Option<String>) {
        let key = strip_xml(path);
        if state.tracked.contains_key(&key) {
            return;
        }
        if self.is_statically_configured(&key) {
            tracing::warn!(
                path = %path.display(),
                "application is already configured, dropin ignored"
            );
            return;
        }

        let record = AppRecord::dropin(key.to_string_lossy().into_owned(), app_type);
        state.tracked.insert(key.clone(), None);
        state.deferred.push(StoreOp::Create { key, record });
    }

    fn remove_app(&self, state: &mut DropinState, path: &Path) {
        let key = strip_xml(path);
        if state.tracked.contains_key(&key) {
            tracing::info!(path = %key.display(), "dropin removed");
            state.untrack(&key);
        }
    }

    fn is_statically_configured(&self, key: &Path) -> bool {
        match self.store.list(&RecordFilter::configured()) {
            Ok(records) => records
                .iter()
                .any(|(_, record)| strip_xml(&self.resolver.resolve(&record.location)) == key),
            Err(e) => {
                tracing::error!(error = %e, "cannot list configured applications");
                self.store_failed();
                false
            }
        }
    }

    /// Create the record for `key` and claim it, unless the entry went away
    /// while the lock was released.
    fn create_record(&self, key: PathBuf, record: AppRecord) {
        let app_type = record.app_type.clone();
        let id = match self.store.create(record) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(path = %key.display(), error = %e, "cannot create dropin record");
                self.store_failed();
                let mut state = self.state.lock();
                if state.tracked.get(&key) == Some(&None) {
                    state.tracked.remove(&key);
                }
                return;
            }
        };
        tracing::info!(path = %key.display(), app_type = ?app_type, record = %id, "dropin added");
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_created();
        }

        let claimed = {
            let mut state = self.state.lock();
            match state.tracked.get_mut(&key) {
                Some(slot) if slot.is_none() => {
                    *slot = Some(id);
                    true
                }
                _ => false,
            }
        };
        if !claimed {
            tracing::debug!(path = %key.display(), record = %id, "dropin went away before its record was stored");
            self.delete_record(&key, id);
        }
    }

    fn delete_record(&self, path: &Path, id: RecordId) {
        match self.store.delete(id) {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_deleted();
                }
            }
            Err(e) => {
                tracing::error!(path = %path.display(), record = %id, error = %e, "cannot delete dropin record");
                self.store_failed();
            }
        }
    }

    fn store_failed(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_store_failure();
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Metadata of a scanned entry, or `None` with an error logged when it is
/// gone or is neither a file nor a directory.
fn entry_metadata(path: &Path) -> Option<fs::Metadata> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() || metadata.is_file() => Some(metadata),
        Ok(_) => {
            tracing::error!(path = %path.display(), "dropin is neither a file nor a directory");
            None
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "dropin vanished before it could be added");
            None
        }
    }
}

/// The path without a trailing `.xml`.
pub(crate) fn strip_xml(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match raw.strip_suffix(XML_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => PathBuf::from(stripped),
        _ => path.to_path_buf(),
    }
}

fn with_xml(path: &Path) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(XML_SUFFIX);
    PathBuf::from(raw)
}

/// The extension of the entry once `.xml` is stripped, else its parent's name.
fn inferred_type(path: &Path) -> Option<String> {
    let key = strip_xml(path);
    key.extension()
        .or_else(|| key.parent().and_then(Path::file_name))
        .map(|s| s.to_string_lossy().into_owned())
}

fn sorted_children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    children.sort();
    Ok(children)
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none())
}

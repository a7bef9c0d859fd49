//! Declarative application records.

use crate::error::{MonitorError, Result};
use crate::notify::{SubscriberRegistry, SubscriptionHandle};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one record in a [`RecordStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record-{}", self.0)
    }
}

/// A declarative application configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    /// Where the application lives, possibly symbolic.
    pub location: String,
    /// Declared application type, such as `war`.
    pub app_type: Option<String>,
    /// True for records created by the dropin monitor rather than the host.
    pub auto_install: bool,
}

impl AppRecord {
    /// A record created for a discovered dropin.
    pub fn dropin(location: impl Into<String>, app_type: Option<String>) -> Self {
        Self {
            location: location.into(),
            app_type,
            auto_install: true,
        }
    }

    /// A record from the host's static configuration.
    pub fn configured(location: impl Into<String>, app_type: Option<String>) -> Self {
        Self {
            location: location.into(),
            app_type,
            auto_install: false,
        }
    }
}

/// Selects records in [`RecordStore::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Match only records with this auto-install flag.
    pub auto_install: Option<bool>,
    /// Match only records with exactly this location.
    pub location: Option<String>,
}

impl RecordFilter {
    /// A filter matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Records created by the dropin monitor.
    pub fn auto_installed() -> Self {
        Self {
            auto_install: Some(true),
            location: None,
        }
    }

    /// Records from static configuration.
    pub fn configured() -> Self {
        Self {
            auto_install: Some(false),
            location: None,
        }
    }

    /// Restrict to one location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Whether `record` passes the filter.
    pub fn matches(&self, record: &AppRecord) -> bool {
        self.auto_install.is_none_or(|flag| record.auto_install == flag)
            && self
                .location
                .as_deref()
                .is_none_or(|location| record.location == location)
    }
}

/// A change to the contents of a [`MemoryRecordStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// A record was added.
    Created(RecordId, AppRecord),
    /// A record was replaced; carries the new value.
    Updated(RecordId, AppRecord),
    /// A record was removed; carries its last value.
    Deleted(RecordId, AppRecord),
}

/// Persistent storage of application records.
///
/// Implementations are called synchronously from change notifications and
/// must be safe to share between threads.
pub trait RecordStore: Send + Sync {
    /// Store a new record.
    fn create(&self, record: AppRecord) -> Result<RecordId>;

    /// Replace an existing record.
    fn update(&self, id: RecordId, record: AppRecord) -> Result<()>;

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// Fails if no record has the given id.
    fn delete(&self, id: RecordId) -> Result<()>;

    /// All records passing `filter`, ordered by id.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<(RecordId, AppRecord)>>;
}

/// An in-process [`RecordStore`] that reports every change to subscribers.
///
/// # Examples
///
/// ```rust
/// use app_monitor::dropins::{AppRecord, MemoryRecordStore, RecordEvent, RecordStore};
///
/// let store = MemoryRecordStore::new();
/// let _handle = store.subscribe(|event: &RecordEvent| {
///     if let RecordEvent::Created(id, record) = event {
///         println!("install {} from {}", id, record.location);
///     }
/// });
///
/// let id = store.create(AppRecord::dropin("${server.config.dir}/dropins/shop.war", None)).unwrap();
/// assert!(store.get(id).is_some());
/// ```
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<RecordId, AppRecord>>,
    next_id: AtomicU64,
    subscribers: SubscriberRegistry<RecordEvent>,
}

impl MemoryRecordStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// Receive every change until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle<RecordEvent>
    where
        F: Fn(&RecordEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// The record with the given id.
    pub fn get(&self, id: RecordId) -> Option<AppRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRecordStore")
            .field("records", &*self.records.read())
            .finish_non_exhaustive()
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(&self, record: AppRecord) -> Result<RecordId> {
        let id = RecordId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.records.write().insert(id, record.clone());
        self.subscribers.notify_all(&RecordEvent::Created(id, record));
        Ok(id)
    }

    fn update(&self, id: RecordId, record: AppRecord) -> Result<()> {
        {
            let mut records = self.records.write();
            let slot = records
                .get_mut(&id)
                .ok_or_else(|| MonitorError::StoreError(format!("no such record: {id}")))?;
            *slot = record.clone();
        }
        self.subscribers.notify_all(&RecordEvent::Updated(id, record));
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<()> {
        let removed = self
            .records
            .write()
            .remove(&id)
            .ok_or_else(|| MonitorError::StoreError(format!("no such record: {id}")))?;
        self.subscribers.notify_all(&RecordEvent::Deleted(id, removed));
        Ok(())
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<(RecordId, AppRecord)>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(_, record)| filter.matches(record))
            .map(|(id, record)| (*id, record.clone()))
            .collect())
    }
}

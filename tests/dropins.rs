//! Dropin directory reconciliation against the record store.

mod common;

use app_monitor::core::{MonitorConfig, TriggerMode};
use app_monitor::dropins::{
    AppRecord, DropinMonitor, MemoryRecordStore, RecordEvent, RecordFilter, RecordStore, SymbolicResolver,
};
use app_monitor::notify::ChangeSet;
use common::FakeNotifier;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct Fixture {
    server: TempDir,
    notifier: Arc<FakeNotifier>,
    store: Arc<MemoryRecordStore>,
    monitor: DropinMonitor,
}

impl Fixture {
    fn new() -> Self {
        Self::with_store(MemoryRecordStore::new())
    }

    fn with_store(store: MemoryRecordStore) -> Self {
        let server = TempDir::new().unwrap();
        let notifier = FakeNotifier::new();
        let store = Arc::new(store);
        let resolver = SymbolicResolver::new(server.path()).with_var("shared.app.dir", server.path().join("shared"));
        let monitor = DropinMonitor::new(notifier.clone(), store.clone(), Arc::new(resolver));
        Self {
            server,
            notifier,
            store,
            monitor,
        }
    }

    fn dropins(&self) -> PathBuf {
        self.server.path().join("dropins")
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dropins().join(relative)
    }

    fn auto_records(&self) -> Vec<AppRecord> {
        self.store
            .list(&RecordFilter::auto_installed())
            .unwrap()
            .into_iter()
            .map(|(_, record)| record)
            .collect()
    }

    fn locations(&self) -> Vec<String> {
        let mut locations: Vec<_> = self.auto_records().into_iter().map(|r| r.location).collect();
        locations.sort();
        locations
    }
}

fn config(location: &str) -> MonitorConfig {
    MonitorConfig {
        dropins_location: location.to_string(),
        ..MonitorConfig::default()
    }
}

fn location(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_sample_war_record_lifecycle() {
    let f = Fixture::new();
    fs::create_dir_all(f.dropins()).unwrap();
    fs::write(f.path("sample.war"), b"zip").unwrap();

    f.monitor.start(&config("dropins"));
    assert!(f.monitor.is_watching());
    assert!(f.notifier.is_watched(f.dropins()));

    let records = f.auto_records();
    assert_eq!(records, vec![AppRecord::dropin(location(&f.path("sample.war")), Some("war".into()))]);

    fs::remove_file(f.path("sample.war")).unwrap();
    f.notifier
        .emit(f.dropins(), ChangeSet::new().removed(f.path("sample.war")));
    assert!(f.store.is_empty());
    assert!(f.monitor.tracked_locations().is_empty());
}

#[test]
fn test_creates_missing_directory() {
    let f = Fixture::new();
    f.monitor.start(&config("dropins"));

    assert!(f.dropins().is_dir());
    assert_eq!(f.monitor.location(), Some(f.dropins()));
    assert!(f.store.is_empty());
}

#[test]
fn test_added_entries_are_registered_once() {
    let f = Fixture::new();
    f.monitor.start(&config("dropins"));

    fs::write(f.path("shop.war"), b"zip").unwrap();
    let added = ChangeSet::new().added(f.path("shop.war"));
    f.notifier.emit(f.dropins(), added.clone());
    f.notifier.emit(f.dropins(), added);

    assert_eq!(f.store.len(), 1);
    assert!(f.monitor.record_for(f.path("shop.war")).is_some());
}

#[test]
fn test_xml_suffix_is_stripped() {
    let f = Fixture::new();
    fs::create_dir_all(f.dropins()).unwrap();
    fs::write(f.path("billing.ear.xml"), b"<app/>").unwrap();

    f.monitor.start(&config("dropins"));

    assert_eq!(f.locations(), vec![location(&f.path("billing.ear"))]);
    assert_eq!(f.auto_records()[0].app_type.as_deref(), Some("ear"));
    assert_eq!(
        f.monitor.record_for(f.path("billing.ear.xml")),
        f.monitor.record_for(f.path("billing.ear"))
    );

    fs::remove_file(f.path("billing.ear.xml")).unwrap();
    f.notifier
        .emit(f.dropins(), ChangeSet::new().removed(f.path("billing.ear.xml")));
    assert!(f.store.is_empty());
}

#[test]
fn test_hidden_and_vanished_entries_are_ignored() {
    let f = Fixture::new();
    fs::create_dir_all(f.dropins()).unwrap();
    fs::write(f.path(".DS_Store"), b"").unwrap();
    fs::create_dir(f.path(".git")).unwrap();

    f.monitor.start(&config("dropins"));
    f.notifier
        .emit(f.dropins(), ChangeSet::new().added(f.path("gone.war")));

    assert!(f.store.is_empty());
    assert!(f.monitor.groups().is_empty());
}

#[test]
fn test_grouped_directory() {
    let f = Fixture::new();
    fs::create_dir_all(f.path("war/catalog")).unwrap();
    fs::write(f.path("war/orders"), b"zip").unwrap();

    f.monitor.start(&config("dropins"));

    assert_eq!(f.monitor.groups(), vec![f.path("war")]);
    assert!(f.notifier.is_watched(f.path("war")));
    assert_eq!(
        f.locations(),
        vec![location(&f.path("war/catalog")), location(&f.path("war/orders"))]
    );
    assert!(f.auto_records().iter().all(|r| r.app_type.as_deref() == Some("war")));
    assert!(f.monitor.record_for(f.path("war")).is_none());

    // The group's own events are ignored; its children's are not.
    f.notifier
        .emit(f.dropins(), ChangeSet::new().added(f.path("war")));
    fs::write(f.path("war/invoices.xml"), b"<app/>").unwrap();
    f.notifier
        .emit(f.path("war"), ChangeSet::new().added(f.path("war/invoices.xml")));
    assert_eq!(f.store.len(), 3);
    assert!(f.monitor.record_for(f.path("war/invoices")).is_some());

    fs::remove_dir_all(f.path("war")).unwrap();
    f.notifier
        .emit(f.dropins(), ChangeSet::new().removed(f.path("war")));
    assert!(f.monitor.groups().is_empty());
    assert!(!f.notifier.is_watched(f.path("war")));
    assert!(f.store.is_empty());
}

#[test]
fn test_statically_configured_application_is_skipped() {
    let store = MemoryRecordStore::new();
    store
        .create(AppRecord::configured("dropins/legacy.war", Some("war".into())))
        .unwrap();
    let f = Fixture::with_store(store);
    fs::create_dir_all(f.dropins()).unwrap();
    fs::write(f.path("legacy.war"), b"zip").unwrap();
    fs::write(f.path("fresh.war"), b"zip").unwrap();

    f.monitor.start(&config("dropins"));

    assert_eq!(f.locations(), vec![location(&f.path("fresh.war"))]);
    assert_eq!(f.store.len(), 2);
}

#[test]
fn test_relocation_deletes_only_auto_install_records() {
    let store = MemoryRecordStore::new();
    let configured = store
        .create(AppRecord::configured("apps/catalog.war", Some("war".into())))
        .unwrap();
    let f = Fixture::with_store(store);

    f.monitor.start(&config("auto"));
    let old = f.server.path().join("auto");
    assert!(old.is_dir());
    fs::write(old.join("shop.war"), b"zip").unwrap();
    f.notifier.emit(&old, ChangeSet::new().added(old.join("shop.war")));
    assert_eq!(f.auto_records().len(), 1);

    fs::create_dir_all(f.path("war")).unwrap();
    fs::write(f.path("war/orders"), b"zip").unwrap();
    f.monitor.refresh(&config("dropins"));

    assert!(!f.notifier.is_watched(&old));
    assert!(f.notifier.is_watched(f.dropins()));
    assert_eq!(f.locations(), vec![location(&f.path("war/orders"))]);
    assert!(f.store.get(configured).is_some());
    // Created by the monitor but not empty: kept.
    assert!(old.is_dir());
}

#[test]
fn test_relocation_removes_empty_created_directory() {
    let f = Fixture::new();
    fs::create_dir_all(f.dropins()).unwrap();

    f.monitor.start(&config("auto"));
    let created = f.server.path().join("auto");
    assert!(created.is_dir());

    f.monitor.refresh(&config("dropins"));
    assert!(!created.exists());

    // Not created by the monitor: kept even when empty.
    f.monitor.refresh(&config("auto"));
    f.monitor.refresh(&config("dropins"));
    assert!(f.dropins().is_dir());
}

#[test]
fn test_symbolic_location() {
    let f = Fixture::new();
    f.monitor.start(&config("${shared.app.dir}/dropins"));

    let resolved = f.server.path().join("shared/dropins");
    assert_eq!(f.monitor.location(), Some(resolved.clone()));
    assert!(f.notifier.is_watched(resolved));
}

#[test]
fn test_dropins_disabled_deletes_records() {
    let f = Fixture::new();
    fs::create_dir_all(f.dropins()).unwrap();
    fs::write(f.path("shop.war"), b"zip").unwrap();
    f.monitor.start(&config("dropins"));
    assert_eq!(f.store.len(), 1);

    f.monitor.refresh(&MonitorConfig {
        dropins_enabled: false,
        ..config("dropins")
    });

    assert!(f.store.is_empty());
    assert!(!f.monitor.is_watching());
    assert_eq!(f.notifier.watch_count(), 0);

    f.monitor.refresh(&config("dropins"));
    assert_eq!(f.store.len(), 1);
}

#[test]
fn test_trigger_disabled_keeps_records() {
    let f = Fixture::new();
    fs::create_dir_all(f.path("war")).unwrap();
    fs::write(f.path("shop.war"), b"zip").unwrap();
    fs::write(f.path("war/orders"), b"zip").unwrap();
    f.monitor.start(&config("dropins"));
    let shop = f.monitor.record_for(f.path("shop.war"));

    f.monitor.refresh(&MonitorConfig {
        trigger_mode: TriggerMode::Disabled,
        ..config("dropins")
    });

    assert_eq!(f.store.len(), 2);
    assert!(!f.monitor.is_watching());
    assert_eq!(f.notifier.watch_count(), 0);

    f.monitor.refresh(&config("dropins"));
    assert_eq!(f.store.len(), 2);
    assert_eq!(f.monitor.record_for(f.path("shop.war")), shop);
    assert_eq!(f.notifier.watch_count(), 2);
}

#[test]
fn test_refresh_prunes_records_of_vanished_entries() {
    let f = Fixture::new();
    fs::create_dir_all(f.dropins()).unwrap();
    fs::write(f.path("shop.war"), b"zip").unwrap();
    fs::write(f.path("cart.war.xml"), b"<app/>").unwrap();
    f.monitor.start(&config("dropins"));
    f.monitor.refresh(&MonitorConfig {
        trigger_mode: TriggerMode::Disabled,
        ..config("dropins")
    });

    fs::remove_file(f.path("shop.war")).unwrap();
    f.monitor.refresh(&MonitorConfig {
        trigger_mode: TriggerMode::Disabled,
        ..config("dropins")
    });

    assert_eq!(f.locations(), vec![location(&f.path("cart.war"))]);
}

#[test]
fn test_start_removes_records_of_previous_run() {
    let store = MemoryRecordStore::new();
    store
        .create(AppRecord::dropin("/gone/server/dropins/old.war", Some("war".into())))
        .unwrap();
    let configured = store
        .create(AppRecord::configured("apps/catalog.war", None))
        .unwrap();
    let f = Fixture::with_store(store);

    f.monitor.start(&config("dropins"));

    assert!(f.auto_records().is_empty());
    assert!(f.store.get(configured).is_some());
}

#[test]
fn test_stop_deletes_records_and_watches() {
    let f = Fixture::new();
    fs::create_dir_all(f.path("war")).unwrap();
    fs::write(f.path("war/orders"), b"zip").unwrap();
    fs::write(f.path("shop.war"), b"zip").unwrap();
    f.monitor.start(&config("dropins"));
    assert_eq!(f.notifier.watch_count(), 2);

    f.monitor.stop();
    f.monitor.stop();

    assert!(f.store.is_empty());
    assert_eq!(f.notifier.watch_count(), 0);
    assert!(f.monitor.groups().is_empty());
}

#[test]
fn test_record_subscribers_may_call_back_into_the_monitor() {
    let server = TempDir::new().unwrap();
    let dropins = server.path().join("dropins");
    fs::create_dir_all(&dropins).unwrap();
    let shop = dropins.join("shop.war");
    fs::write(&shop, b"zip").unwrap();

    let store = Arc::new(MemoryRecordStore::new());
    let monitor = Arc::new(DropinMonitor::new(
        FakeNotifier::new(),
        store.clone(),
        Arc::new(SymbolicResolver::new(server.path())),
    ));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = Arc::downgrade(&monitor);
    let seen_by_host = Arc::clone(&seen);
    let _subscription = store.subscribe(move |event: &RecordEvent| {
        let (RecordEvent::Created(..), Some(monitor)) = (event, host.upgrade()) else {
            return;
        };
        seen_by_host.lock().unwrap().push(monitor.tracked_locations());
        monitor.refresh(&config("dropins"));
    });

    monitor.start(&config("dropins"));

    assert_eq!(*seen.lock().unwrap(), vec![vec![shop.clone()]]);
    assert_eq!(store.len(), 1);
    assert!(monitor.record_for(&shop).is_some());
}

#[test]
fn test_entry_removed_while_its_record_is_created() {
    let server = TempDir::new().unwrap();
    let dropins = server.path().join("dropins");
    fs::create_dir_all(&dropins).unwrap();
    let shop = dropins.join("shop.war");
    fs::write(&shop, b"zip").unwrap();

    let notifier = FakeNotifier::new();
    let store = Arc::new(MemoryRecordStore::new());
    let monitor = DropinMonitor::new(
        notifier.clone(),
        store.clone(),
        Arc::new(SymbolicResolver::new(server.path())),
    );

    let watch = dropins.clone();
    let removed = shop.clone();
    let _subscription = store.subscribe(move |event: &RecordEvent| {
        if let RecordEvent::Created(..) = event {
            fs::remove_file(&removed).unwrap();
            notifier.emit(&watch, ChangeSet::new().removed(&removed));
        }
    });

    monitor.start(&config("dropins"));

    assert!(store.is_empty());
    assert!(monitor.tracked_locations().is_empty());
    assert!(monitor.record_for(&shop).is_none());
}

//! Listener composition, start/stop transitions and classification through
//! the application monitor.

mod common;

use app_monitor::app::{AppDescriptor, ApplicationChangeMonitor, DEBOUNCE_WINDOW, MinorUpdateSuffixes};
use app_monitor::core::{MonitorConfig, TriggerMode};
use app_monitor::notify::{ChangeSet, WatchOptions};
use app_monitor::scheduler::Scheduler;
use common::{Calls, FakeNotifier};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct App {
    _dir: TempDir,
    root: PathBuf,
    classes: PathBuf,
}

fn exploded_app() -> App {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("shop.war");
    let classes = root.join("WEB-INF/classes");
    fs::create_dir_all(&classes).unwrap();
    fs::write(classes.join("Cart.class"), b"cafebabe").unwrap();
    fs::write(root.join("index.jsp"), b"<%= 1 %>").unwrap();
    App {
        _dir: dir,
        root,
        classes,
    }
}

fn monitor(notifier: &Arc<FakeNotifier>, config: MonitorConfig) -> ApplicationChangeMonitor {
    ApplicationChangeMonitor::new(notifier.clone(), Scheduler::current(), config)
}

fn disabled() -> MonitorConfig {
    MonitorConfig {
        trigger_mode: TriggerMode::Disabled,
        ..MonitorConfig::default()
    }
}

#[tokio::test]
async fn test_targets_get_content_and_root_listeners() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());

    monitor.add_application(
        AppDescriptor::new("shop", |_: bool| {})
            .with_content_root(&app.root)
            .with_target("WEB-INF/classes"),
    );

    let requests = notifier.requests();
    assert_eq!(requests.len(), 2);
    let root = requests.iter().find(|r| r.path == app.root).unwrap();
    assert!(!root.recursive);
    let content = requests.iter().find(|r| r.path == app.classes).unwrap();
    assert!(content.recursive);
    assert_eq!(content.options, WatchOptions::default());
    assert!(monitor.is_listening("shop"));
}

#[tokio::test]
async fn test_no_targets_get_one_complete_listener() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());

    monitor.add_application(AppDescriptor::new("shop", |_: bool| {}).with_content_root(&app.root));

    let requests = notifier.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, app.root);
    assert!(requests[0].recursive);
}

#[tokio::test]
async fn test_missing_root_leaves_application_unmonitored() {
    let dir = TempDir::new().unwrap();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());

    monitor.add_application(
        AppDescriptor::new("ghost", |_: bool| {}).with_content_root(dir.path().join("ghost.war")),
    );
    monitor.add_application(AppDescriptor::new("rootless", |_: bool| {}));

    assert!(monitor.application_ids().is_empty());
    assert_eq!(notifier.watch_count(), 0);
}

#[tokio::test]
async fn test_unbindable_root_is_not_registered() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    notifier.fail_on(&app.root);
    let monitor = monitor(&notifier, MonitorConfig::default());

    monitor.add_application(
        AppDescriptor::new("shop", |_: bool| {})
            .with_content_root(&app.root)
            .with_target("WEB-INF/classes"),
    );

    assert!(!monitor.is_monitored("shop"));
    assert_eq!(notifier.watch_count(), 0);
}

#[tokio::test]
async fn test_unbindable_target_is_skipped() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());

    monitor.add_application(
        AppDescriptor::new("shop", |_: bool| {})
            .with_content_root(&app.root)
            .with_target("WEB-INF/classes")
            .with_target("WEB-INF/missing"),
    );

    assert!(monitor.is_listening("shop"));
    assert_eq!(notifier.watch_count(), 2);
}

#[tokio::test]
async fn test_re_add_replaces_prior_registration() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());

    for _ in 0..3 {
        monitor.add_application(AppDescriptor::new("shop", |_: bool| {}).with_content_root(&app.root));
    }

    assert_eq!(monitor.application_ids(), vec!["shop".to_string()]);
    assert_eq!(notifier.watch_count(), 1);
    assert_eq!(notifier.registrations(), 3);
    assert!(!monitor.remove_application("unknown"));
}

#[tokio::test]
async fn test_disabled_trigger_registers_without_listening() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, disabled());

    monitor.add_application(AppDescriptor::new("shop", |_: bool| {}).with_content_root(&app.root));

    assert!(monitor.is_monitored("shop"));
    assert!(!monitor.is_listening("shop"));
    assert_eq!(notifier.watch_count(), 0);
}

#[tokio::test]
async fn test_refresh_stops_and_restarts_listeners_once() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());
    monitor.add_application(AppDescriptor::new("shop", |_: bool| {}).with_content_root(&app.root));
    assert_eq!(notifier.registrations(), 1);

    monitor.refresh(&disabled());
    monitor.refresh(&disabled());
    assert_eq!(notifier.watch_count(), 0);
    assert!(monitor.is_monitored("shop"));

    let enabled = MonitorConfig {
        polling_rate: Duration::from_secs(2),
        ..MonitorConfig::default()
    };
    monitor.refresh(&enabled);
    monitor.refresh(&enabled);
    assert_eq!(notifier.registrations(), 2);
    assert_eq!(
        notifier.options_of(&app.root).unwrap().interval,
        Duration::from_secs(2)
    );
    assert!(notifier.reconfigured().is_empty());
}

#[tokio::test]
async fn test_refresh_pushes_changed_options_to_live_listeners() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());
    monitor.add_application(AppDescriptor::new("shop", |_: bool| {}).with_content_root(&app.root));

    let mbean = MonitorConfig {
        trigger_mode: TriggerMode::Mbean,
        ..MonitorConfig::default()
    };
    monitor.refresh(&mbean);

    assert_eq!(notifier.registrations(), 1);
    let reconfigured = notifier.reconfigured();
    assert_eq!(reconfigured.len(), 1);
    assert_eq!(reconfigured[0].0, app.root);
    assert!(reconfigured[0].1.external_trigger);
    assert_eq!(monitor.config().trigger_mode, TriggerMode::Mbean);
}

#[tokio::test]
async fn test_stop_all_is_terminal() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());
    monitor.add_application(AppDescriptor::new("shop", |_: bool| {}).with_content_root(&app.root));

    monitor.stop_all();
    monitor.refresh(&MonitorConfig {
        polling_rate: Duration::from_secs(1),
        ..MonitorConfig::default()
    });

    assert!(monitor.application_ids().is_empty());
    assert_eq!(notifier.watch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_minor_update_needs_redefinition() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());
    let calls = Calls::default();
    let redefined = Arc::new(AtomicUsize::new(0));
    let redefined_clone = Arc::clone(&redefined);

    monitor.add_application(
        AppDescriptor::new("shop", calls.handler())
            .with_content_root(&app.root)
            .with_target("WEB-INF/classes")
            .with_redefiner(move |paths: &BTreeSet<PathBuf>| {
                redefined_clone.fetch_add(1, Ordering::SeqCst);
                paths.iter().all(|p| p.extension().is_some_and(|e| e == "class"))
            }),
    );

    // Redefined in place: no restart.
    notifier.emit(&app.classes, ChangeSet::new().modified(app.classes.join("Cart.class")));
    tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;
    assert_eq!(calls.len(), 0);
    assert_eq!(redefined.load(Ordering::SeqCst), 1);

    // A suffix outside the allow-list never reaches the redefiner.
    notifier.emit(&app.classes, ChangeSet::new().modified(app.classes.join("app.properties")));
    tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;
    assert_eq!(calls.kinds(), vec![false]);
    assert_eq!(redefined.load(Ordering::SeqCst), 1);

    // Added classes are structural.
    notifier.emit(&app.classes, ChangeSet::new().added(app.classes.join("New.class")));
    tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;
    assert_eq!(calls.kinds(), vec![false, false]);
}

#[tokio::test(start_paused = true)]
async fn test_suffix_override_extends_minor_updates() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default())
        .with_suffixes(MinorUpdateSuffixes::with_override(".properties"));
    let calls = Calls::default();

    monitor.add_application(
        AppDescriptor::new("shop", calls.handler())
            .with_content_root(&app.root)
            .with_target("WEB-INF/classes")
            .with_redefiner(|_: &BTreeSet<PathBuf>| true),
    );

    notifier.emit(&app.classes, ChangeSet::new().modified(app.classes.join("app.properties")));
    tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;
    assert_eq!(calls.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_root_listener_reports_structure_and_removal() {
    let app = exploded_app();
    let notifier = FakeNotifier::new();
    let monitor = monitor(&notifier, MonitorConfig::default());
    let calls = Calls::default();

    monitor.add_application(
        AppDescriptor::new("shop", calls.handler())
            .with_content_root(&app.root)
            .with_target("WEB-INF/classes")
            .watch_root_structure(true),
    );

    notifier.emit(&app.root, ChangeSet::new().added(app.root.join("about.html")));
    tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;
    notifier.emit(&app.root, ChangeSet::new().removed(&app.root));
    tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;

    assert_eq!(calls.kinds(), vec![false, true]);
}

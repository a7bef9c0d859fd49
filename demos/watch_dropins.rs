//! Example of a host installing whatever is dropped into a directory.
//!
//! This example shows how to:
//! - Watch a dropins directory with the polling notifier
//! - Install and uninstall applications from record store events
//! - Receive debounced update and removal decisions per application
//!
//! Run with: cargo run --example watch_dropins -- /tmp/dropins
//!
//! While running, copy a `.war` file or directory into the dropins directory,
//! touch files inside it, then delete it.

use app_monitor::prelude::*;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

fn install(monitor: &AppMonitor, record: &AppRecord) {
    let id = Path::new(&record.location)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.location.clone());

    println!(
        "Installing {} ({})",
        id,
        record.app_type.as_deref().unwrap_or("unknown type")
    );

    let name = id.clone();
    monitor.add_application(
        AppDescriptor::new(id, move |is_remove: bool| {
            if is_remove {
                println!("  {name}: content removed");
            } else {
                println!("  {name}: content updated, restarting");
            }
        })
        .with_content_root(&record.location),
    );
}

fn uninstall(monitor: &AppMonitor, record: &AppRecord) {
    if let Some(name) = Path::new(&record.location).file_name() {
        let id = name.to_string_lossy();
        if monitor.remove_application(&id) {
            println!("Uninstalled {id}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app_monitor=info".into()),
        )
        .init();

    println!("=== Dropins Example ===\n");

    let location = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/dropins".to_string());

    let store = Arc::new(MemoryRecordStore::new());
    let monitor = Arc::new(AppMonitor::builder().with_store(store.clone()).build()?);

    // Records drive installation; the monitor only reports what it sees.
    let host: Weak<AppMonitor> = Arc::downgrade(&monitor);
    let _subscription = store.subscribe(move |event: &RecordEvent| {
        let Some(monitor) = host.upgrade() else {
            return;
        };
        match event {
            RecordEvent::Created(_, record) => install(&monitor, record),
            RecordEvent::Deleted(_, record) => uninstall(&monitor, record),
            RecordEvent::Updated(..) => {}
        }
    });

    monitor.activate(
        &MonitorConfigUpdate::new()
            .with_dropins_location(location.as_str())
            .with_polling_rate(Duration::from_millis(250)),
    )?;

    if let Some(dir) = monitor.dropins().location() {
        println!("Watching {}", dir.display());
    }
    println!("Press Ctrl+C to stop\n");

    let _ = tokio::signal::ctrl_c().await;

    monitor.deactivate();
    println!("\nStopped; {} records left", store.len());

    Ok(())
}

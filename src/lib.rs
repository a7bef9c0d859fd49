//! # app-monitor
//!
//! Debounced change detection for installed applications, plus automatic
//! discovery of applications dropped into a watched directory.
//!
//! ## Overview
//!
//! `app-monitor` turns raw filesystem notifications into lifecycle decisions
//! for a host application manager:
//! - Listeners classify each batch of added, removed and modified paths as
//!   no event, an update or a removal
//! - Decisions of one application are debounced for 200 ms and coalesced,
//!   with a removal always winning over an update
//! - The dropins directory is reconciled with a store of declarative
//!   application records
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use app_monitor::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let monitor = AppMonitor::builder().build()?;
//! monitor.activate(
//!     &MonitorConfigUpdate::new()
//!         .with_dropins_location("/srv/server/dropins")
//!         .with_polling_rate(std::time::Duration::from_millis(250)),
//! )?;
//!
//! monitor.add_application(
//!     AppDescriptor::new("shop", |is_remove: bool| {
//!         if is_remove {
//!             println!("uninstall shop");
//!         } else {
//!             println!("restart shop");
//!         }
//!     })
//!     .with_content_root("/srv/server/dropins/shop.war")
//!     .with_target("WEB-INF/classes"),
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): the `notify`-based [`PollingNotifier`](notify::PollingNotifier)
//! - `validation` (default): reject invalid configuration updates
//! - `metrics`: OpenTelemetry counters

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod app;
pub mod core;
pub mod dropins;
pub mod error;
pub mod notify;
pub mod scheduler;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::app::{AppDescriptor, ApplicationChangeMonitor, UpdateHandler, UpdateKind};
    pub use crate::core::{AppMonitor, AppMonitorBuilder, MonitorConfig, MonitorConfigUpdate, TriggerMode};
    pub use crate::dropins::{AppRecord, MemoryRecordStore, RecordEvent, RecordStore, SymbolicResolver};
    pub use crate::error::{MonitorError, Result, ValidationError};
    pub use crate::notify::ChangeNotifier;
    pub use crate::scheduler::Scheduler;

    #[cfg(feature = "validation")]
    pub use crate::core::Validate;

    #[cfg(feature = "file-watch")]
    pub use crate::notify::PollingNotifier;
}

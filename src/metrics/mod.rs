//! Built-in metrics for monitor operations.
//!
//! Provides OpenTelemetry counters for:
//! - Coalesced decisions delivered, by kind
//! - Decisions dropped after shutdown
//! - Dropin records created and deleted
//! - Record store failures
//!
//! # Examples
//!
//! ```rust,no_run
//! use app_monitor::prelude::*;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let monitor = AppMonitor::builder()
//!     .with_metrics(global::meter("my-server"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod monitor_metrics;

pub use monitor_metrics::MonitorMetrics;

//! Monitor counters using OpenTelemetry.

use crate::app::UpdateKind;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter};

/// Counters for delivered decisions and dropin record churn.
///
/// # Examples
///
/// ```rust,no_run
/// use app_monitor::metrics::MonitorMetrics;
/// use opentelemetry::global;
///
/// let metrics = MonitorMetrics::new(global::meter("app-monitor"));
/// metrics.record_created();
/// ```
#[derive(Clone)]
pub struct MonitorMetrics {
    callbacks: Counter<u64>,
    dropped: Counter<u64>,
    records_created: Counter<u64>,
    records_deleted: Counter<u64>,
    store_failures: Counter<u64>,
}

impl MonitorMetrics {
    /// Create the counters on `meter`.
    pub fn new(meter: Meter) -> Self {
        let callbacks = meter
            .u64_counter("app_monitor.callbacks")
            .with_description("Coalesced decisions delivered to update handlers")
            .build();

        let dropped = meter
            .u64_counter("app_monitor.events.dropped")
            .with_description("Decisions dropped because no scheduler was available")
            .build();

        let records_created = meter
            .u64_counter("app_monitor.dropins.created")
            .with_description("Dropin records created")
            .build();

        let records_deleted = meter
            .u64_counter("app_monitor.dropins.deleted")
            .with_description("Dropin records deleted")
            .build();

        let store_failures = meter
            .u64_counter("app_monitor.store.failures")
            .with_description("Failed record store operations")
            .build();

        Self {
            callbacks,
            dropped,
            records_created,
            records_deleted,
            store_failures,
        }
    }

    /// Count one delivered decision.
    pub fn record_callback(&self, kind: UpdateKind) {
        let kind = match kind {
            UpdateKind::Update => "update",
            UpdateKind::Remove => "remove",
        };
        self.callbacks.add(1, &[KeyValue::new("kind", kind)]);
    }

    /// Count one dropped decision.
    pub fn record_dropped(&self) {
        self.dropped.add(1, &[]);
    }

    /// Count one created dropin record.
    pub fn record_created(&self) {
        self.records_created.add(1, &[]);
    }

    /// Count one deleted dropin record.
    pub fn record_deleted(&self) {
        self.records_deleted.add(1, &[]);
    }

    /// Count one failed store operation.
    pub fn record_store_failure(&self) {
        self.store_failures.add(1, &[]);
    }
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorMetrics").finish_non_exhaustive()
    }
}

//! Prometheus metrics for the network status operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `network_status_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `network_status_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `network_status_condition` (gauge): 1 when the published condition of a type is True, labeled by record and condition.
//! - `network_status_hung_workloads` (gauge): workloads whose rollout stopped making progress.
//! - `network_status_publish_conflicts_total` (counter): optimistic-concurrency conflicts while publishing, labeled by record.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "network-status"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind/category, e.g. "kube", "conflict", "panic"
    pub kind: String,
}

/// Labels for published conditions
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ConditionLabels {
    /// Name of the status record, e.g. "network"
    pub name: String,
    /// Condition type, e.g. "Degraded"
    pub condition: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RecordLabels {
    pub record: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static CONDITION_STATUS: Lazy<Family<ConditionLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

pub static HUNG_WORKLOADS: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

pub static PUBLISH_CONFLICTS_TOTAL: Lazy<Family<RecordLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "network_status_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "network_status_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "network_status_condition",
        "Published condition status (1 = True)",
        CONDITION_STATUS.clone(),
    );
    registry.register(
        "network_status_hung_workloads",
        "Workloads whose rollout is not making progress",
        HUNG_WORKLOADS.clone(),
    );
    registry.register(
        "network_status_publish_conflicts_total",
        "Conflicts encountered while writing status records",
        PUBLISH_CONFLICTS_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn set_condition_status(name: &str, type_: &str, is_true: bool) {
    let labels = ConditionLabels {
        name: name.to_string(),
        condition: type_.to_string(),
    };
    CONDITION_STATUS
        .get_or_create(&labels)
        .set(i64::from(is_true));
}

pub fn set_hung_workloads(count: usize) {
    HUNG_WORKLOADS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn inc_publish_conflict(record: &str) {
    let labels = RecordLabels {
        record: record.to_string(),
    };
    PUBLISH_CONFLICTS_TOTAL.get_or_create(&labels).inc();
}

//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `alerts_operator_reconciliations_total{kind}` - Total number of reconciliations
//! - `alerts_operator_reconciliation_errors_total{kind}` - Total number of failed reconciliations
//! - `alerts_operator_reconciliation_duration_seconds{kind}` - Duration of reconciliation passes
//! - `alerts_operator_remote_operations_total{operation,outcome}` - New Relic API calls
//! - `alerts_operator_skipped_reconciliations_total{kind}` - Passes short-circuited by equality
//! - `alerts_operator_requeues_total{reason}` - Requeues scheduled by the controllers

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "alerts_operator_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "alerts_operator_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "alerts_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REMOTE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "alerts_operator_remote_operations_total",
            "Total number of New Relic API operations",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create REMOTE_OPERATIONS_TOTAL metric - this should never happen")
});

static SKIPPED_RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "alerts_operator_skipped_reconciliations_total",
            "Reconciliations that made no remote call because nothing changed",
        ),
        &["kind"],
    )
    .expect("Failed to create SKIPPED_RECONCILIATIONS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("alerts_operator_requeues_total", "Total number of requeues"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the shared registry
///
/// # Errors
/// Returns an error if a metric is registered twice
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SKIPPED_RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

/// Record the outcome (`success`, `not_found`, `error`) of one API call
pub fn record_remote_operation(operation: &str, outcome: &str) {
    REMOTE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn increment_skipped_reconciliations(kind: &str) {
    SKIPPED_RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

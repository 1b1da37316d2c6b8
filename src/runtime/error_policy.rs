//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.
//! Failed reconciliations requeue with a Fibonacci backoff tracked per
//! resource; controller stream errors are classified and logged.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::ResourceKey;
use crate::observability::metrics;
use kube_runtime::controller::{self, Action};
use tracing::{debug, error, info, warn};

/// Backoff and logging key of one resource (`<kind>:<namespace>/<name>`)
#[must_use]
pub fn backoff_key(kind: &str, key: &ResourceKey) -> String {
    format!("{kind}:{key}")
}

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing resource does not
/// slow down the others.
pub fn handle_reconciliation_error(
    kind: &str,
    key: &ResourceKey,
    error: &ReconcilerError,
    ctx: &Reconciler,
) -> Action {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        resource.kind = kind,
        reason = error.reason()
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {} {}: {}", kind, key, error);
    metrics::increment_reconciliation_errors(kind);

    let (delay, error_count) = ctx.backoff.record_failure(&backoff_key(kind, key));
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(delay.as_secs()).unwrap_or(i64::MAX));

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, next attempt: {})",
        delay.as_secs(),
        error_count,
        next_trigger_time.to_rfc3339()
    );

    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

/// Log one item of a controller's output stream
///
/// Reconciler failures were already handled by the error policy; everything
/// else is a watch or queue problem the controller recovers from itself.
pub fn log_controller_result<K, QueueErr>(
    kind: &str,
    result: &Result<
        (kube_runtime::reflector::ObjectRef<K>, Action),
        controller::Error<ReconcilerError, QueueErr>,
    >,
) where
    K: kube::Resource,
    QueueErr: std::error::Error,
{
    match result {
        Ok((object, action)) => {
            debug!(resource.kind = kind, object = %object, action = ?action, "reconciled");
        }
        Err(controller::Error::ReconcilerFailed(_, object)) => {
            debug!(resource.kind = kind, object = %object, "reconciliation failed, requeued");
        }
        Err(controller::Error::ObjectNotFound(object)) => {
            debug!(
                resource.kind = kind,
                object = %object,
                "Object no longer in cache, skipping"
            );
        }
        Err(controller::Error::QueueError(e)) => {
            warn!(resource.kind = kind, "Watch stream error: {}", e);
        }
        Err(e) => {
            warn!(resource.kind = kind, "Controller error: {}", e);
        }
    }
}

//! # Status Management
//!
//! Builds `Ready` conditions and writes status only when something other than
//! timestamps changed, so a status write does not retrigger an identical pass.

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{AlertsPolicyStatus, ChildConditionStatus, Condition, ResourceKey};
use tracing::debug;

pub const REASON_RECONCILED: &str = "Reconciled";

#[must_use]
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Replace the `Ready` condition
///
/// The previous transition time is kept when the status value is unchanged.
pub fn set_ready(conditions: &mut Vec<Condition>, ready: bool, reason: &str, message: Option<String>) {
    let mut condition = Condition::ready(ready, reason, message);
    if let Some(previous) = conditions.iter().find(|c| c.r#type == "Ready") {
        if previous.status == condition.status {
            condition.last_transition_time.clone_from(&previous.last_transition_time);
        }
    }
    conditions.retain(|c| c.r#type != "Ready");
    conditions.push(condition);
}

fn conditions_equal(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.r#type == y.r#type
                && x.status == y.status
                && x.reason == y.reason
                && x.message == y.message
        })
}

/// Whether `new` differs from `old` in anything but timestamps
#[must_use]
pub fn policy_status_changed(old: Option<&AlertsPolicyStatus>, new: &AlertsPolicyStatus) -> bool {
    match old {
        None => true,
        Some(old) => {
            old.applied_spec != new.applied_spec
                || old.policy_id != new.policy_id
                || old.observed_generation != new.observed_generation
                || !conditions_equal(&old.conditions, &new.conditions)
        }
    }
}

/// Whether `new` differs from `old` in anything but timestamps
#[must_use]
pub fn child_status_changed<S: PartialEq>(
    old: Option<&ChildConditionStatus<S>>,
    new: &ChildConditionStatus<S>,
) -> bool {
    match old {
        None => true,
        Some(old) => {
            old.applied_spec != new.applied_spec
                || old.condition_id != new.condition_id
                || !conditions_equal(&old.conditions, &new.conditions)
        }
    }
}

/// Write the policy status unless it is unchanged
///
/// # Errors
/// Returns an error if the store rejects the write
pub async fn write_policy_status(
    ctx: &Reconciler,
    key: &ResourceKey,
    current: Option<&AlertsPolicyStatus>,
    mut status: AlertsPolicyStatus,
) -> Result<(), ReconcilerError> {
    if !policy_status_changed(current, &status) {
        debug!("Skipping status update for {} - unchanged", key);
        return Ok(());
    }
    status.last_reconcile_time = Some(now());
    ctx.policies.update_policy_status(key, &status).await?;
    Ok(())
}

/// Record a successful push of `spec` as remote condition `condition_id`
pub fn mark_applied<S: Clone>(status: &mut ChildConditionStatus<S>, spec: &S, condition_id: i64) {
    status.applied_spec = Some(spec.clone());
    status.condition_id = Some(condition_id);
    set_ready(&mut status.conditions, true, REASON_RECONCILED, None);
}

pub fn mark_failed<S>(status: &mut ChildConditionStatus<S>, error: &ReconcilerError) {
    set_ready(
        &mut status.conditions,
        false,
        error.reason(),
        Some(error.to_string()),
    );
}

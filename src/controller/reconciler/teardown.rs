//! # Teardown
//!
//! Finalizer handling for policies under deletion.
//!
//! Child objects go first (their own finalizers delete the remote conditions),
//! then the remote policy. A remote policy that is already gone counts as
//! deleted. The finalizer is released only when every step succeeded.

use crate::constants::POLICY_FINALIZER;
use crate::controller::reconciler::credentials::policy_client;
use crate::controller::reconciler::errors::ErrorCollector;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{AlertsPolicy, ConditionKind, ResourceKey};
use std::collections::BTreeSet;
use tracing::{info, warn};

#[must_use]
pub fn has_finalizer(policy: &AlertsPolicy) -> bool {
    policy
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == POLICY_FINALIZER))
}

/// Append the teardown finalizer; returns `false` when it was already present
pub fn add_finalizer(policy: &mut AlertsPolicy) -> bool {
    if has_finalizer(policy) {
        return false;
    }
    policy
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(POLICY_FINALIZER.to_string());
    true
}

pub fn remove_finalizer(policy: &mut AlertsPolicy) {
    if let Some(finalizers) = policy.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != POLICY_FINALIZER);
    }
}

/// Child objects the policy may own: applied entries plus identities recorded
/// in the spec by a pass that did not complete
fn owned_children(policy: &AlertsPolicy) -> Vec<(ConditionKind, ResourceKey, String)> {
    let applied = policy
        .status
        .as_ref()
        .and_then(|status| status.applied_spec.as_ref())
        .map(|spec| spec.conditions.as_slice())
        .unwrap_or_default();

    let mut seen = BTreeSet::new();
    applied
        .iter()
        .chain(policy.spec.conditions.iter())
        .filter_map(|condition| {
            let key = condition.identity()?;
            seen.insert((condition.spec.kind().as_str(), key.clone()))
                .then(|| (condition.spec.kind(), key, condition.spec.name().to_string()))
        })
        .collect()
}

/// Tear down a policy marked for deletion and release its finalizer
///
/// # Errors
/// Returns an error if any child or the remote policy could not be deleted;
/// the finalizer then stays in place
pub async fn finalize_policy(
    ctx: &Reconciler,
    mut policy: AlertsPolicy,
) -> Result<(), ReconcilerError> {
    let key = ResourceKey::of(&policy);
    let policy_id = policy.status.as_ref().and_then(|status| status.policy_id);

    if let Some(policy_id) = policy_id {
        info!("🗑️  Tearing down policy {} (remote ID {})", key, policy_id);
        let client = policy_client(ctx, &policy).await?;
        let mut errors = ErrorCollector::new();

        for (kind, child, name) in owned_children(&policy) {
            info!("Deleting {} {} ('{}')", kind.resource_kind(), child, name);
            if let Err(source) = ctx.conditions.delete_condition(kind, &child).await {
                errors.push(ReconcilerError::Child {
                    condition: name,
                    source,
                });
            }
        }

        match client.delete_policy(policy_id).await {
            Ok(()) => info!("Deleted remote policy {}", policy_id),
            Err(source) if source.is_not_found() => {
                warn!(
                    "Remote policy {} was already deleted, treating as success",
                    policy_id
                );
            }
            Err(source) => {
                errors.push(ReconcilerError::delete(format!("policy {policy_id}"), source));
            }
        }

        errors.into_result().map_err(ReconcilerError::Teardown)?;
    } else {
        info!(
            "Policy {} has no remote counterpart, releasing finalizer",
            key
        );
    }

    remove_finalizer(&mut policy);
    ctx.policies.update_policy(&policy).await?;
    info!("✅ Teardown complete for {}", key);
    Ok(())
}

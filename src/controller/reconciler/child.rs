//! # Child Condition Reconciliation
//!
//! Pushes one `AlertsNrqlCondition` / `AlertsApmCondition` object to New Relic.
//!
//! The policy reconciler only creates, rewrites and deletes these objects;
//! every remote condition call happens here. Deleting a child removes its
//! remote condition through the `condition-cleanup` finalizer.

use crate::constants::{CONDITION_FINALIZER, POLICY_LABEL};
use crate::controller::reconciler::credentials::condition_client;
use crate::controller::reconciler::status::{child_status_changed, mark_applied, mark_failed, now};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ChildConditionStatus, ConditionKind, ConditionSpec, ResourceKey};
use crate::observability::metrics;
use crate::provider::{AlertsClient, ClientError, RemoteCondition};
use crate::store::ChildCondition;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Result of a successful child pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    Absent,
    Deleted,
    Unchanged { condition_id: i64 },
    Converged { condition_id: i64 },
}

/// Reconcile the child condition of `kind` identified by `key`
///
/// # Errors
/// Returns the failing step; every error is retryable
pub async fn reconcile_condition(
    ctx: &Reconciler,
    kind: ConditionKind,
    key: &ResourceKey,
) -> Result<ConditionOutcome, ReconcilerError> {
    let Some(mut child) = ctx.conditions.get_condition(kind, key).await? else {
        debug!("{} {} not found, nothing to do", kind.resource_kind(), key);
        return Ok(ConditionOutcome::Absent);
    };

    if child.metadata().deletion_timestamp.is_some() {
        if has_finalizer(&child) {
            finalize_condition(ctx, child).await?;
        }
        return Ok(ConditionOutcome::Deleted);
    }

    if add_finalizer(&mut child) {
        debug!("Adding finalizer to {} {}", kind.resource_kind(), key);
        child = ctx.conditions.update_condition(&child).await?;
    }

    if let Some(condition_id) = converged_id(&child) {
        debug!(
            "{} {} unchanged since last push (condition {})",
            kind.resource_kind(),
            key,
            condition_id
        );
        metrics::increment_skipped_reconciliations(kind.as_str());
        // Clears a Ready=False left by a failed push of a since-reverted spec
        if record_success(&mut child, condition_id) {
            ctx.conditions.update_condition_status(&child).await?;
        }
        return Ok(ConditionOutcome::Unchanged { condition_id });
    }

    match push_condition(ctx, &child, key).await {
        Ok(condition_id) => {
            if record_success(&mut child, condition_id) {
                ctx.conditions.update_condition_status(&child).await?;
            }
            info!(
                "✅ {} {} pushed as condition {}",
                kind.resource_kind(),
                key,
                condition_id
            );
            Ok(ConditionOutcome::Converged { condition_id })
        }
        Err(error) => {
            if record_failure(&mut child, &error) {
                if let Err(status_error) = ctx.conditions.update_condition_status(&child).await {
                    warn!(
                        "Failed to record failure status on {} {}: {}",
                        kind.resource_kind(),
                        key,
                        status_error
                    );
                }
            }
            Err(error)
        }
    }
}

/// Create or update the remote condition, returning its ID
async fn push_condition(
    ctx: &Reconciler,
    child: &ChildCondition,
    key: &ResourceKey,
) -> Result<i64, ReconcilerError> {
    let spec = child.spec();
    let client = condition_client(ctx, spec.base(), &key.namespace).await?;
    let policy_id = spec.base().existing_policy_id.ok_or_else(|| {
        ReconcilerError::Configuration(format!(
            "condition '{}' has no existingPolicyId",
            spec.name()
        ))
    })?;

    let condition_id = match child.condition_id() {
        Some(id) => Some(id),
        None => {
            let taken = sibling_condition_ids(ctx, child, key).await?;
            adopt_by_name(client.as_ref(), &spec, policy_id, &taken).await?
        }
    };

    let Some(condition_id) = condition_id else {
        return create_remote(client.as_ref(), &spec, policy_id).await;
    };

    debug!("Updating remote condition {} ('{}')", condition_id, spec.name());
    let updated = match &spec {
        ConditionSpec::Nrql(nrql) => client.update_nrql_condition(condition_id, nrql).await,
        ConditionSpec::Apm(apm) => client.update_apm_condition(condition_id, apm).await,
    };
    match updated {
        Ok(remote) => Ok(remote.id),
        Err(source) if source.is_not_found() => {
            warn!(
                "Remote condition {} ('{}') no longer exists, creating it again",
                condition_id,
                spec.name()
            );
            create_remote(client.as_ref(), &spec, policy_id).await
        }
        Err(source) => Err(ReconcilerError::update(
            format!("{} condition {condition_id}", spec.kind()),
            source,
        )),
    }
}

/// Remote IDs already recorded by other children of the same policy
async fn sibling_condition_ids(
    ctx: &Reconciler,
    child: &ChildCondition,
    key: &ResourceKey,
) -> Result<BTreeSet<i64>, ReconcilerError> {
    let Some(policy) = child
        .metadata()
        .labels
        .as_ref()
        .and_then(|labels| labels.get(POLICY_LABEL))
    else {
        return Ok(BTreeSet::new());
    };
    let siblings = ctx
        .conditions
        .list_policy_conditions(child.kind(), &key.namespace, policy)
        .await?;
    Ok(siblings
        .iter()
        .filter(|sibling| sibling.key() != *key)
        .filter_map(ChildCondition::condition_id)
        .collect())
}

/// Find a remote condition a previous pass created without recording its ID
///
/// Conditions in `taken` belong to sibling children and are never adopted.
async fn adopt_by_name(
    client: &dyn AlertsClient,
    spec: &ConditionSpec,
    policy_id: i64,
    taken: &BTreeSet<i64>,
) -> Result<Option<i64>, ReconcilerError> {
    let listed: Result<Vec<RemoteCondition>, ClientError> = match spec.kind() {
        ConditionKind::Nrql => client.list_nrql_conditions(policy_id).await,
        ConditionKind::Apm => client.list_apm_conditions(policy_id).await,
    };
    let listed = listed.map_err(|source| {
        ReconcilerError::lookup(
            format!("{} conditions of policy {policy_id}", spec.kind()),
            source,
        )
    })?;
    let adopted = listed
        .into_iter()
        .find(|remote| remote.name == spec.name() && !taken.contains(&remote.id))
        .map(|remote| remote.id);
    if let Some(id) = adopted {
        info!(
            "Adopting existing remote condition {} ('{}')",
            id,
            spec.name()
        );
    }
    Ok(adopted)
}

async fn create_remote(
    client: &dyn AlertsClient,
    spec: &ConditionSpec,
    policy_id: i64,
) -> Result<i64, ReconcilerError> {
    let created = match spec {
        ConditionSpec::Nrql(nrql) => client.create_nrql_condition(policy_id, nrql).await,
        ConditionSpec::Apm(apm) => client.create_apm_condition(policy_id, apm).await,
    }
    .map_err(|source| {
        ReconcilerError::create(
            format!("{} condition '{}'", spec.kind(), spec.name()),
            source,
        )
    })?;
    info!(
        "Created remote {} condition {} ('{}') in policy {}",
        spec.kind(),
        created.id,
        spec.name(),
        policy_id
    );
    Ok(created.id)
}

/// Delete the remote condition and release the finalizer
async fn finalize_condition(
    ctx: &Reconciler,
    mut child: ChildCondition,
) -> Result<(), ReconcilerError> {
    let key = child.key();
    if let Some(condition_id) = child.condition_id() {
        let spec = child.spec();
        let client = condition_client(ctx, spec.base(), &key.namespace).await?;
        let deleted = match spec.kind() {
            ConditionKind::Nrql => client.delete_nrql_condition(condition_id).await,
            ConditionKind::Apm => client.delete_apm_condition(condition_id).await,
        };
        match deleted {
            Ok(()) => info!("Deleted remote condition {} ('{}')", condition_id, spec.name()),
            Err(source) if source.is_not_found() => {
                warn!(
                    "Remote condition {} was already deleted, treating as success",
                    condition_id
                );
            }
            Err(source) => {
                return Err(ReconcilerError::delete(
                    format!("{} condition {condition_id}", spec.kind()),
                    source,
                ));
            }
        }
    }

    remove_finalizer(&mut child);
    ctx.conditions.update_condition(&child).await?;
    debug!("Released finalizer of {}", key);
    Ok(())
}

fn has_finalizer(child: &ChildCondition) -> bool {
    child
        .metadata()
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == CONDITION_FINALIZER))
}

fn add_finalizer(child: &mut ChildCondition) -> bool {
    if has_finalizer(child) {
        return false;
    }
    child
        .metadata_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(CONDITION_FINALIZER.to_string());
    true
}

fn remove_finalizer(child: &mut ChildCondition) {
    if let Some(finalizers) = child.metadata_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != CONDITION_FINALIZER);
    }
}

/// Remote ID when the current spec is exactly what was last pushed
fn converged_id(child: &ChildCondition) -> Option<i64> {
    fn check<S: PartialEq>(spec: &S, status: Option<&ChildConditionStatus<S>>) -> Option<i64> {
        let status = status?;
        (status.applied_spec.as_ref() == Some(spec))
            .then_some(status.condition_id)
            .flatten()
    }
    match child {
        ChildCondition::Nrql(object) => check(&object.spec, object.status.as_ref()),
        ChildCondition::Apm(object) => check(&object.spec, object.status.as_ref()),
    }
}

/// Apply `edit` to the status; returns whether anything but timestamps changed
fn edit_status<S: Clone + Default + PartialEq>(
    status: &mut Option<ChildConditionStatus<S>>,
    edit: impl FnOnce(&mut ChildConditionStatus<S>),
) -> bool {
    let before = status.clone();
    let current = status.get_or_insert_with(ChildConditionStatus::default);
    edit(current);
    let changed = child_status_changed(before.as_ref(), current);
    if changed {
        current.last_reconcile_time = Some(now());
    }
    changed
}

fn record_success(child: &mut ChildCondition, condition_id: i64) -> bool {
    match child {
        ChildCondition::Nrql(object) => {
            let spec = object.spec.clone();
            edit_status(&mut object.status, |status| {
                mark_applied(status, &spec, condition_id);
            })
        }
        ChildCondition::Apm(object) => {
            let spec = object.spec.clone();
            edit_status(&mut object.status, |status| {
                mark_applied(status, &spec, condition_id);
            })
        }
    }
}

fn record_failure(child: &mut ChildCondition, error: &ReconcilerError) -> bool {
    match child {
        ChildCondition::Nrql(object) => {
            edit_status(&mut object.status, |status| mark_failed(status, error))
        }
        ChildCondition::Apm(object) => {
            edit_status(&mut object.status, |status| mark_failed(status, error))
        }
    }
}

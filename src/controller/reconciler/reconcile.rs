//! # Policy Reconciliation
//!
//! One pass of the `AlertsPolicy` state machine for one resource identity.
//!
//! ```text
//! absent -> present (pending identity) -> present (converged) -> deleting -> absent
//! ```
//!
//! The pass stops at the first failing stage. `status.appliedSpec` only moves
//! when every stage succeeded, so the next pass retries the same diff; a
//! failed pass records `Ready=False` together with any remote policy ID it
//! already learned.

use crate::controller::reconciler::channels::{reconcile_channels, ChannelDirectory};
use crate::controller::reconciler::conditions::ConditionSynchronizer;
use crate::controller::reconciler::credentials::policy_client;
use crate::controller::reconciler::fingerprint::find_duplicates;
use crate::controller::reconciler::status::{set_ready, write_policy_status, REASON_RECONCILED};
use crate::controller::reconciler::teardown::{add_finalizer, finalize_policy, has_finalizer};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{AlertsPolicy, AlertsPolicySpec, AlertsPolicyStatus, ResourceKey};
use crate::observability::metrics;
use crate::provider::{AlertsClient, RemotePolicy};
use tracing::{debug, info, warn};

/// Result of a successful policy pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The resource no longer exists
    Absent,
    /// Teardown finished (or the resource is being deleted without our finalizer)
    Deleted,
    /// Desired state equals the applied baseline; no remote call was made
    Unchanged { policy_id: i64 },
    /// Remote state was converged onto the desired state
    Converged { policy_id: i64 },
}

/// What a failing pass already learned and must not lose
#[derive(Debug, Default)]
struct PassProgress {
    policy_id: Option<i64>,
}

/// Reconcile the `AlertsPolicy` identified by `key`
///
/// # Errors
/// Returns the first failing stage; every error is retryable
pub async fn reconcile_policy(
    ctx: &Reconciler,
    key: &ResourceKey,
) -> Result<PolicyOutcome, ReconcilerError> {
    let Some(policy) = ctx.policies.get_policy(key).await? else {
        debug!("AlertsPolicy {} not found, nothing to do", key);
        return Ok(PolicyOutcome::Absent);
    };

    let current_status = policy.status.clone();
    let mut progress = PassProgress {
        policy_id: current_status.as_ref().and_then(|status| status.policy_id),
    };

    let result = if policy.metadata.deletion_timestamp.is_some() {
        if has_finalizer(&policy) {
            finalize_policy(ctx, policy)
                .await
                .map(|()| PolicyOutcome::Deleted)
        } else {
            debug!("AlertsPolicy {} is being deleted without our finalizer", key);
            return Ok(PolicyOutcome::Deleted);
        }
    } else {
        converge_policy(ctx, key, policy, &mut progress).await
    };

    if let Err(error) = &result {
        record_failure(ctx, key, current_status.as_ref(), &progress, error).await;
    }
    result
}

async fn record_failure(
    ctx: &Reconciler,
    key: &ResourceKey,
    current: Option<&AlertsPolicyStatus>,
    progress: &PassProgress,
    error: &ReconcilerError,
) {
    let mut status = current.cloned().unwrap_or_default();
    if progress.policy_id.is_some() {
        status.policy_id = progress.policy_id;
    }
    set_ready(
        &mut status.conditions,
        false,
        error.reason(),
        Some(error.to_string()),
    );
    if let Err(status_error) = write_policy_status(ctx, key, current, status).await {
        warn!(
            "Failed to record failure status on AlertsPolicy {}: {}",
            key, status_error
        );
    }
}

async fn converge_policy(
    ctx: &Reconciler,
    key: &ResourceKey,
    mut policy: AlertsPolicy,
    progress: &mut PassProgress,
) -> Result<PolicyOutcome, ReconcilerError> {
    let client = policy_client(ctx, &policy).await?;

    if add_finalizer(&mut policy) {
        debug!("Adding finalizer to AlertsPolicy {}", key);
        policy = ctx.policies.update_policy(&policy).await?;
    }

    let current_status = policy.status.clone();
    let status = current_status.clone().unwrap_or_default();
    let applied = status.applied_spec.as_ref();

    if let (Some(applied), Some(policy_id)) = (applied, status.policy_id) {
        if *applied == policy.spec {
            debug!(
                "AlertsPolicy {} unchanged since last pass (policy {})",
                key, policy_id
            );
            metrics::increment_skipped_reconciliations("policy");
            let mut next = status.clone();
            set_ready(&mut next.conditions, true, REASON_RECONCILED, None);
            write_policy_status(ctx, key, current_status.as_ref(), next).await?;
            return Ok(PolicyOutcome::Unchanged { policy_id });
        }
    }

    reject_duplicates(&policy.spec)?;

    let remote = ensure_remote_policy(client.as_ref(), &policy.spec, applied, status.policy_id).await?;
    let policy_id = remote.policy_id;
    progress.policy_id = Some(policy_id);

    let applied_conditions = applied
        .map(|spec| spec.conditions.as_slice())
        .unwrap_or_default();
    let synchronizer = ConditionSynchronizer::new(ctx.conditions.as_ref(), &policy, policy_id);
    let (conditions, mut errors) = synchronizer
        .reconcile_conditions(&policy.spec.conditions, applied_conditions)
        .await;

    if conditions != policy.spec.conditions {
        debug!("Recording child identities on AlertsPolicy {}", key);
        policy.spec.conditions = conditions;
        match ctx.policies.update_policy(&policy).await {
            Ok(updated) => policy = updated,
            Err(error) if errors.is_empty() => return Err(error.into()),
            // Reported together with the condition failures
            Err(error) => errors.push(error.into()),
        }
    }
    errors.into_result().map_err(ReconcilerError::ConditionSync)?;

    let mut directory = ChannelDirectory::new();
    let desired_channels = directory
        .resolve(
            client.as_ref(),
            &policy.spec.channel_ids,
            &policy.spec.channel_names,
            true,
        )
        .await?;
    let applied_channels = match applied {
        // A policy we did not create ourselves may carry any attachment; re-attaching is harmless
        Some(applied) if !remote.fresh => {
            directory
                .resolve(
                    client.as_ref(),
                    &applied.channel_ids,
                    &applied.channel_names,
                    false,
                )
                .await?
        }
        _ => Vec::new(),
    };
    let attached = reconcile_channels(
        client.as_ref(),
        policy_id,
        &desired_channels,
        &applied_channels,
    )
    .await
    .map_err(ReconcilerError::ChannelSync)?;
    debug!(
        "AlertsPolicy {} attached to channels {:?}",
        key, attached
    );

    let mut next = status;
    next.applied_spec = Some(policy.spec.clone());
    next.policy_id = Some(policy_id);
    next.observed_generation = policy.metadata.generation;
    set_ready(&mut next.conditions, true, REASON_RECONCILED, None);
    write_policy_status(ctx, key, current_status.as_ref(), next).await?;

    info!("✅ AlertsPolicy {} converged (policy {})", key, policy_id);
    Ok(PolicyOutcome::Converged { policy_id })
}

/// Two conditions with equal fingerprints are rejected before any remote write
fn reject_duplicates(spec: &AlertsPolicySpec) -> Result<(), ReconcilerError> {
    let duplicates = find_duplicates(&spec.conditions);
    if duplicates.is_empty() {
        return Ok(());
    }
    let pairs = duplicates
        .iter()
        .map(|(first, second)| {
            format!(
                "'{}' (#{}) and '{}' (#{})",
                spec.conditions[*first].spec.name(),
                first,
                spec.conditions[*second].spec.name(),
                second
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    Err(ReconcilerError::Configuration(format!(
        "duplicate conditions: {pairs}"
    )))
}

struct ResolvedPolicy {
    policy_id: i64,
    /// Created, recreated or adopted during this pass: the applied baseline
    /// says nothing about its channel attachments
    fresh: bool,
}

/// Adopt, update or create the remote policy
async fn ensure_remote_policy(
    client: &dyn AlertsClient,
    spec: &AlertsPolicySpec,
    applied: Option<&AlertsPolicySpec>,
    recorded_id: Option<i64>,
) -> Result<ResolvedPolicy, ReconcilerError> {
    let (known, adopted) = match recorded_id {
        Some(id) => (Some(id), None),
        None => {
            let adopted = adopt_by_name(client, &spec.name).await?;
            (adopted.as_ref().map(|remote| remote.id), adopted)
        }
    };

    let Some(policy_id) = known else {
        let created = create_policy(client, spec).await?;
        return Ok(ResolvedPolicy {
            policy_id: created,
            fresh: true,
        });
    };

    let needs_update = match (&adopted, applied) {
        (Some(remote), _) => {
            remote.name != spec.name || remote.incident_preference != spec.incident_preference
        }
        (None, Some(applied)) => applied.policy_fields_differ(spec),
        (None, None) => true,
    };
    if !needs_update {
        debug!("Remote policy {} fields unchanged", policy_id);
        return Ok(ResolvedPolicy {
            policy_id,
            fresh: adopted.is_some(),
        });
    }

    info!("Updating remote policy {} ('{}')", policy_id, spec.name);
    match client.update_policy(policy_id, spec).await {
        Ok(_) => Ok(ResolvedPolicy {
            policy_id,
            fresh: adopted.is_some(),
        }),
        Err(source) if source.is_not_found() => {
            warn!(
                "Remote policy {} no longer exists, creating '{}' again",
                policy_id, spec.name
            );
            let created = create_policy(client, spec).await?;
            Ok(ResolvedPolicy {
                policy_id: created,
                fresh: true,
            })
        }
        Err(source) => Err(ReconcilerError::update(
            format!("policy {policy_id}"),
            source,
        )),
    }
}

/// Guard against a create whose ID was never persisted
async fn adopt_by_name(
    client: &dyn AlertsClient,
    name: &str,
) -> Result<Option<RemotePolicy>, ReconcilerError> {
    let mut found = client
        .find_policies_by_name(name)
        .await
        .map_err(|source| ReconcilerError::lookup(format!("policy '{name}'"), source))?;
    if found.len() > 1 {
        warn!(
            "{} remote policies are named '{}', adopting the first",
            found.len(),
            name
        );
    }
    if found.is_empty() {
        return Ok(None);
    }
    let remote = found.swap_remove(0);
    info!("Adopting existing remote policy {} ('{}')", remote.id, name);
    Ok(Some(remote))
}

async fn create_policy(
    client: &dyn AlertsClient,
    spec: &AlertsPolicySpec,
) -> Result<i64, ReconcilerError> {
    let created = client
        .create_policy(spec)
        .await
        .map_err(|source| ReconcilerError::create(format!("policy '{}'", spec.name), source))?;
    info!("Created remote policy {} ('{}')", created.id, spec.name);
    Ok(created.id)
}

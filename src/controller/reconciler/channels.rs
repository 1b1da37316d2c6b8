//! # Channel Synchronization
//!
//! Diffs desired against applied channel attachments and applies the
//! difference: one batched attach for additions, one detach call per removal.
//! Every call is attempted; failures are reported together.

use crate::controller::reconciler::errors::{CollectedErrors, ErrorCollector};
use crate::controller::reconciler::types::ReconcilerError;
use crate::provider::{AlertsClient, RemoteChannel};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Attachment changes for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDiff {
    pub to_add: Vec<i64>,
    pub to_remove: Vec<i64>,
}

impl ChannelDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set difference in both directions; order and duplicates are ignored
#[must_use]
pub fn diff_channels(desired: &[i64], applied: &[i64]) -> ChannelDiff {
    let desired: BTreeSet<i64> = desired.iter().copied().collect();
    let applied: BTreeSet<i64> = applied.iter().copied().collect();
    ChannelDiff {
        to_add: desired.difference(&applied).copied().collect(),
        to_remove: applied.difference(&desired).copied().collect(),
    }
}

/// Apply the channel diff to remote policy `policy_id`
///
/// Returns the new applied set (the desired set, sorted and deduplicated).
///
/// # Errors
/// Returns every failed attach/detach call
pub async fn reconcile_channels(
    client: &dyn AlertsClient,
    policy_id: i64,
    desired: &[i64],
    applied: &[i64],
) -> Result<Vec<i64>, CollectedErrors> {
    let diff = diff_channels(desired, applied);
    if diff.is_empty() {
        debug!("Channels of policy {} unchanged", policy_id);
    }

    let mut errors = ErrorCollector::new();

    if !diff.to_add.is_empty() {
        info!(
            "Attaching {} channel(s) to policy {}: {:?}",
            diff.to_add.len(),
            policy_id,
            diff.to_add
        );
        if let Err(source) = client.attach_channels(policy_id, &diff.to_add).await {
            errors.push(ReconcilerError::update(
                format!("channel attachments {:?} of policy {policy_id}", diff.to_add),
                source,
            ));
        }
    }

    for channel_id in &diff.to_remove {
        info!("Detaching channel {} from policy {}", channel_id, policy_id);
        match client.detach_channel(policy_id, *channel_id).await {
            Ok(()) => {}
            Err(source) if source.is_not_found() => {
                warn!(
                    "Channel {} was already detached from policy {}",
                    channel_id, policy_id
                );
            }
            Err(source) => errors.push(ReconcilerError::delete(
                format!("channel attachment {channel_id} of policy {policy_id}"),
                source,
            )),
        }
    }

    errors.into_result()?;
    Ok(desired
        .iter()
        .copied()
        .collect::<BTreeSet<i64>>()
        .into_iter()
        .collect())
}

/// Lazily fetched channel listing, shared between desired and applied resolution
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    channels: Option<Vec<RemoteChannel>>,
}

impl ChannelDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn channels(
        &mut self,
        client: &dyn AlertsClient,
    ) -> Result<&[RemoteChannel], ReconcilerError> {
        if self.channels.is_none() {
            let listed = client
                .list_channels()
                .await
                .map_err(|source| ReconcilerError::lookup("notification channels", source))?;
            self.channels = Some(listed);
        }
        Ok(self.channels.as_deref().unwrap_or_default())
    }

    /// `ids ∪ ids of channels named in names`
    ///
    /// With `strict`, an unknown name is a configuration error; otherwise it is
    /// skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the listing fails or, with `strict`, a name is unknown
    pub async fn resolve(
        &mut self,
        client: &dyn AlertsClient,
        ids: &[i64],
        names: &[String],
        strict: bool,
    ) -> Result<Vec<i64>, ReconcilerError> {
        let mut resolved: BTreeSet<i64> = ids.iter().copied().collect();
        if names.is_empty() {
            return Ok(resolved.into_iter().collect());
        }

        let channels = self.channels(client).await?;
        for name in names {
            let matches: Vec<i64> = channels
                .iter()
                .filter(|channel| &channel.name == name)
                .map(|channel| channel.id)
                .collect();
            if matches.is_empty() {
                if strict {
                    return Err(ReconcilerError::Configuration(format!(
                        "notification channel '{name}' does not exist"
                    )));
                }
                warn!("Previously attached channel '{}' no longer exists", name);
            }
            resolved.extend(matches);
        }
        Ok(resolved.into_iter().collect())
    }
}

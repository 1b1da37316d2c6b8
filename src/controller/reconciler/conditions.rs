//! # Condition Synchronization
//!
//! Converges the child condition objects of one policy onto its desired
//! condition list, diffing against the previously applied list.
//!
//! Each desired entry is matched to a child through its identity pair. An entry
//! without identity adopts the identity of an applied entry with the same
//! semantic name and kind, unless another desired entry names that child
//! explicitly; failing that, a new child is created under a generated name. Matched children are rewritten only when their fingerprint
//! differs. Applied entries no desired entry claimed are deleted, which hands
//! the remote delete to the child's own finalizer.
//!
//! Failures are collected per condition; the loop never stops early.

use crate::constants::POLICY_LABEL;
use crate::controller::reconciler::errors::ErrorCollector;
use crate::controller::reconciler::fingerprint::fingerprint;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{
    AlertsPolicy, ConditionKind, ConditionSpec, PolicyCondition, Region, ResourceKey,
    SecretReference,
};
use crate::store::{ChildCondition, ConditionStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Fields a child condition inherits from its parent policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InheritedFields {
    pub api_key: Option<String>,
    pub api_key_secret: Option<SecretReference>,
    pub region: Option<Region>,
    pub existing_policy_id: Option<i64>,
}

impl InheritedFields {
    #[must_use]
    pub fn from_policy(policy: &AlertsPolicy, policy_id: i64) -> Self {
        let namespace = policy.metadata.namespace.as_deref().unwrap_or("default");
        let api_key_secret = policy.spec.api_key_secret.clone().map(|mut reference| {
            if reference.namespace.as_deref().is_none_or(str::is_empty) {
                reference.namespace = Some(namespace.to_string());
            }
            reference
        });
        Self {
            api_key: policy.spec.api_key.clone(),
            api_key_secret,
            region: Some(policy.spec.effective_region()),
            existing_policy_id: Some(policy_id),
        }
    }

    pub fn apply(&self, spec: &mut ConditionSpec) {
        let base = spec.base_mut();
        base.api_key.clone_from(&self.api_key);
        base.api_key_secret.clone_from(&self.api_key_secret);
        base.region = self.region;
        base.existing_policy_id = self.existing_policy_id;
    }

    fn matches(&self, spec: &ConditionSpec) -> bool {
        let base = spec.base();
        base.api_key == self.api_key
            && base.api_key_secret == self.api_key_secret
            && base.region == self.region
            && base.existing_policy_id == self.existing_policy_id
    }
}

#[derive(Debug)]
struct AppliedEntry {
    kind: ConditionKind,
    name: String,
    processed: bool,
}

/// Child-object plan executor for one policy pass
pub struct ConditionSynchronizer<'a> {
    store: &'a dyn ConditionStore,
    parent_name: String,
    parent_namespace: String,
    owner: Option<OwnerReference>,
    inherited: InheritedFields,
}

impl std::fmt::Debug for ConditionSynchronizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionSynchronizer")
            .field("parent_name", &self.parent_name)
            .field("parent_namespace", &self.parent_namespace)
            .finish_non_exhaustive()
    }
}

impl<'a> ConditionSynchronizer<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ConditionStore, policy: &AlertsPolicy, policy_id: i64) -> Self {
        Self {
            store,
            parent_name: policy.metadata.name.clone().unwrap_or_default(),
            parent_namespace: policy
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            owner: policy.controller_owner_ref(&()),
            inherited: InheritedFields::from_policy(policy, policy_id),
        }
    }

    /// Converge child objects and return the desired list with identities back-filled
    pub async fn reconcile_conditions(
        &self,
        desired: &[PolicyCondition],
        applied: &[PolicyCondition],
    ) -> (Vec<PolicyCondition>, ErrorCollector) {
        let mut errors = ErrorCollector::new();

        let mut order: Vec<ResourceKey> = Vec::new();
        let mut table: HashMap<ResourceKey, AppliedEntry> = HashMap::new();
        for entry in applied {
            if let Some(key) = entry.identity() {
                if !table.contains_key(&key) {
                    order.push(key.clone());
                    table.insert(
                        key,
                        AppliedEntry {
                            kind: entry.spec.kind(),
                            name: entry.spec.name().to_string(),
                            processed: false,
                        },
                    );
                }
            }
        }

        // Children named explicitly by some desired entry are never taken by name
        let claimed: HashSet<ResourceKey> =
            desired.iter().filter_map(PolicyCondition::identity).collect();

        let mut updated = Vec::with_capacity(desired.len());
        for entry in desired {
            let mut condition = entry.clone();
            let kind = condition.spec.kind();

            if condition.identity().is_none() {
                let resolved = order.iter().find(|key| {
                    !claimed.contains(*key)
                        && table.get(*key).is_some_and(|applied| {
                            !applied.processed
                                && applied.kind == kind
                                && applied.name == condition.spec.name()
                        })
                });
                if let Some(key) = resolved {
                    debug!(
                        "Resolved condition '{}' to existing child {} by name",
                        condition.spec.name(),
                        key
                    );
                    condition.set_identity(key);
                }
            }

            // A kind change cannot be applied in place
            if let Some(key) = condition.identity() {
                if table.get(&key).is_some_and(|applied| applied.kind != kind) {
                    info!(
                        "Condition '{}' changed kind to {}, replacing child {}",
                        condition.spec.name(),
                        kind,
                        key
                    );
                    condition.resource_name = None;
                    condition.resource_namespace = None;
                }
            }

            let original = condition.identity();
            let result = match &original {
                None => self.create_child(&condition.spec).await.map(Some),
                Some(key) => self.converge_child(key, &condition.spec).await,
            };
            match result {
                Ok(Some(key)) => condition.set_identity(&key),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        "Failed to synchronize condition '{}': {}",
                        condition.spec.name(),
                        error
                    );
                    errors.push(error);
                }
            }

            for key in original.iter().chain(condition.identity().iter()) {
                if let Some(applied) = table.get_mut(key) {
                    if applied.kind == kind {
                        applied.processed = true;
                    }
                }
            }
            updated.push(condition);
        }

        for key in &order {
            let Some(entry) = table.get(key) else {
                continue;
            };
            if entry.processed {
                continue;
            }
            info!(
                "Condition '{}' removed from policy {}/{}, deleting child {}",
                entry.name, self.parent_namespace, self.parent_name, key
            );
            if let Err(source) = self.store.delete_condition(entry.kind, key).await {
                errors.push(ReconcilerError::Child {
                    condition: entry.name.clone(),
                    source,
                });
            }
        }

        (updated, errors)
    }

    /// Create a child object under a generated name
    async fn create_child(&self, spec: &ConditionSpec) -> Result<ResourceKey, ReconcilerError> {
        let mut child_spec = spec.clone();
        self.inherited.apply(&mut child_spec);

        let metadata = ObjectMeta {
            generate_name: Some(format!("{}-", self.parent_name)),
            namespace: Some(self.parent_namespace.clone()),
            labels: Some(BTreeMap::from([(
                POLICY_LABEL.to_string(),
                self.parent_name.clone(),
            )])),
            owner_references: self.owner.clone().map(|owner| vec![owner]),
            ..ObjectMeta::default()
        };

        let child = ChildCondition::from_spec(child_spec, metadata);
        let created = self
            .store
            .create_condition(&child)
            .await
            .map_err(|source| child_error(spec, source))?;
        let key = created.key();
        info!(
            "Created {} {} for condition '{}'",
            spec.kind().resource_kind(),
            key,
            spec.name()
        );
        Ok(key)
    }

    /// Bring an existing child in line with `spec`
    ///
    /// Returns a new identity when the child had to be recreated.
    async fn converge_child(
        &self,
        key: &ResourceKey,
        spec: &ConditionSpec,
    ) -> Result<Option<ResourceKey>, ReconcilerError> {
        let existing = self
            .store
            .get_condition(spec.kind(), key)
            .await
            .map_err(|source| child_error(spec, source))?;

        let mut child = match existing {
            Some(child) if child.metadata().deletion_timestamp.is_none() => child,
            _ => {
                warn!(
                    "Child {} of condition '{}' is gone, creating a replacement",
                    key,
                    spec.name()
                );
                return self.create_child(spec).await.map(Some);
            }
        };

        let current = child.spec();
        if fingerprint(&current) == fingerprint(spec) {
            if self.inherited.matches(&current) {
                debug!("Condition '{}' unchanged ({})", spec.name(), key);
                return Ok(None);
            }
            debug!(
                "Refreshing inherited fields of child {} ('{}')",
                key,
                spec.name()
            );
        } else {
            info!("Updating child {} for condition '{}'", key, spec.name());
        }

        let mut next = spec.clone();
        self.inherited.apply(&mut next);
        child
            .set_spec(next)
            .map_err(|source| child_error(spec, source))?;
        self.store
            .update_condition(&child)
            .await
            .map_err(|source| child_error(spec, source))?;
        Ok(None)
    }
}

fn child_error(spec: &ConditionSpec, source: StoreError) -> ReconcilerError {
    ReconcilerError::Child {
        condition: spec.name().to_string(),
        source,
    }
}

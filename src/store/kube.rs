//! # Kubernetes Store
//!
//! `PolicyStore`, `ConditionStore` and `SecretSource` backed by the Kubernetes API.
//! Spec and metadata are written with `replace` (optimistic concurrency through
//! `resourceVersion`), status with a merge patch on the status subresource.

use super::{ChildCondition, ConditionStore, PolicyStore, SecretSource, StoreError};
use crate::constants::{CONTROLLER_NAME, POLICY_LABEL};
use crate::crd::{
    AlertsApmCondition, AlertsNrqlCondition, AlertsPolicy, AlertsPolicyStatus, ConditionKind,
    ResourceKey,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Store backed by a Kubernetes client
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn name_of(metadata: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Result<&str, StoreError> {
        metadata
            .name
            .as_deref()
            .ok_or_else(|| StoreError::Invalid("object has no name".to_string()))
    }

    async fn patch_status<K, S>(
        api: &Api<K>,
        name: &str,
        status: &S,
    ) -> Result<(), StoreError>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
        S: Serialize,
    {
        let patch = serde_json::json!({
            "status": status
        });
        api.patch_status(
            name,
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(patch),
        )
        .await?;
        Ok(())
    }
}

/// Treat a 404 from a delete as success
fn ignore_not_found<T>(result: Result<T, kube::Error>) -> Result<(), StoreError> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(e) => Err(StoreError::Kube(e)),
    }
}

#[async_trait]
impl PolicyStore for KubeStore {
    async fn get_policy(&self, key: &ResourceKey) -> Result<Option<AlertsPolicy>, StoreError> {
        let api: Api<AlertsPolicy> = self.api(&key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn update_policy(&self, policy: &AlertsPolicy) -> Result<AlertsPolicy, StoreError> {
        let key = ResourceKey::of(policy);
        let api: Api<AlertsPolicy> = self.api(&key.namespace);
        debug!("Replacing AlertsPolicy {}", key);
        Ok(api
            .replace(Self::name_of(&policy.metadata)?, &PostParams::default(), policy)
            .await?)
    }

    async fn update_policy_status(
        &self,
        key: &ResourceKey,
        status: &AlertsPolicyStatus,
    ) -> Result<(), StoreError> {
        let api: Api<AlertsPolicy> = self.api(&key.namespace);
        Self::patch_status(&api, &key.name, status).await
    }
}

#[async_trait]
impl ConditionStore for KubeStore {
    async fn get_condition(
        &self,
        kind: ConditionKind,
        key: &ResourceKey,
    ) -> Result<Option<ChildCondition>, StoreError> {
        Ok(match kind {
            ConditionKind::Nrql => {
                let api: Api<AlertsNrqlCondition> = self.api(&key.namespace);
                api.get_opt(&key.name).await?.map(ChildCondition::Nrql)
            }
            ConditionKind::Apm => {
                let api: Api<AlertsApmCondition> = self.api(&key.namespace);
                api.get_opt(&key.name).await?.map(ChildCondition::Apm)
            }
        })
    }

    async fn list_policy_conditions(
        &self,
        kind: ConditionKind,
        namespace: &str,
        policy: &str,
    ) -> Result<Vec<ChildCondition>, StoreError> {
        let params = ListParams::default().labels(&format!("{POLICY_LABEL}={policy}"));
        Ok(match kind {
            ConditionKind::Nrql => {
                let api: Api<AlertsNrqlCondition> = self.api(namespace);
                api.list(&params)
                    .await?
                    .items
                    .into_iter()
                    .map(ChildCondition::Nrql)
                    .collect()
            }
            ConditionKind::Apm => {
                let api: Api<AlertsApmCondition> = self.api(namespace);
                api.list(&params)
                    .await?
                    .items
                    .into_iter()
                    .map(ChildCondition::Apm)
                    .collect()
            }
        })
    }

    async fn create_condition(
        &self,
        condition: &ChildCondition,
    ) -> Result<ChildCondition, StoreError> {
        let namespace = condition
            .metadata()
            .namespace
            .clone()
            .ok_or_else(|| StoreError::Invalid("child condition has no namespace".to_string()))?;
        let params = PostParams::default();
        Ok(match condition {
            ChildCondition::Nrql(object) => {
                let api: Api<AlertsNrqlCondition> = self.api(&namespace);
                ChildCondition::Nrql(api.create(&params, object).await?)
            }
            ChildCondition::Apm(object) => {
                let api: Api<AlertsApmCondition> = self.api(&namespace);
                ChildCondition::Apm(api.create(&params, object).await?)
            }
        })
    }

    async fn update_condition(
        &self,
        condition: &ChildCondition,
    ) -> Result<ChildCondition, StoreError> {
        let key = condition.key();
        let name = Self::name_of(condition.metadata())?;
        let params = PostParams::default();
        debug!("Replacing {} {}", condition.kind().resource_kind(), key);
        Ok(match condition {
            ChildCondition::Nrql(object) => {
                let api: Api<AlertsNrqlCondition> = self.api(&key.namespace);
                ChildCondition::Nrql(api.replace(name, &params, object).await?)
            }
            ChildCondition::Apm(object) => {
                let api: Api<AlertsApmCondition> = self.api(&key.namespace);
                ChildCondition::Apm(api.replace(name, &params, object).await?)
            }
        })
    }

    async fn update_condition_status(&self, condition: &ChildCondition) -> Result<(), StoreError> {
        let key = condition.key();
        match condition {
            ChildCondition::Nrql(object) => {
                let api: Api<AlertsNrqlCondition> = self.api(&key.namespace);
                Self::patch_status(&api, &key.name, &object.status).await
            }
            ChildCondition::Apm(object) => {
                let api: Api<AlertsApmCondition> = self.api(&key.namespace);
                Self::patch_status(&api, &key.name, &object.status).await
            }
        }
    }

    async fn delete_condition(
        &self,
        kind: ConditionKind,
        key: &ResourceKey,
    ) -> Result<(), StoreError> {
        debug!("Deleting {} {}", kind.resource_kind(), key);
        let params = DeleteParams::default();
        match kind {
            ConditionKind::Nrql => {
                let api: Api<AlertsNrqlCondition> = self.api(&key.namespace);
                ignore_not_found(api.delete(&key.name, &params).await)
            }
            ConditionKind::Apm => {
                let api: Api<AlertsApmCondition> = self.api(&key.namespace);
                ignore_not_found(api.delete(&key.name, &params).await)
            }
        }
    }
}

#[async_trait]
impl SecretSource for KubeStore {
    async fn read_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError> {
        let api: Api<Secret> = self.api(namespace);
        Ok(api.get_opt(name).await?.map(|secret| {
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect()
        }))
    }
}

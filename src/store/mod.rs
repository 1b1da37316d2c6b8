//! # Resource Store
//!
//! Read/write access to the custom resources and secrets the reconcilers act on.
//!
//! The reconcilers only see these traits. `KubeStore` implements all three
//! against the Kubernetes API; tests provide in-memory versions.

mod kube;

pub use self::kube::KubeStore;

use crate::crd::{
    AlertsApmCondition, AlertsNrqlCondition, AlertsPolicy, AlertsPolicyStatus, ConditionKind,
    ConditionSpec, ResourceKey,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] ::kube::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid object: {0}")]
    Invalid(String),
}

/// A child condition object of either kind
#[derive(Debug, Clone)]
pub enum ChildCondition {
    Nrql(AlertsNrqlCondition),
    Apm(AlertsApmCondition),
}

impl ChildCondition {
    /// Build an unsaved child object carrying `spec`
    #[must_use]
    pub fn from_spec(spec: ConditionSpec, metadata: ObjectMeta) -> Self {
        match spec {
            ConditionSpec::Nrql(spec) => {
                let mut object = AlertsNrqlCondition::new("", spec);
                object.metadata = metadata;
                ChildCondition::Nrql(object)
            }
            ConditionSpec::Apm(spec) => {
                let mut object = AlertsApmCondition::new("", spec);
                object.metadata = metadata;
                ChildCondition::Apm(object)
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> ConditionKind {
        match self {
            ChildCondition::Nrql(_) => ConditionKind::Nrql,
            ChildCondition::Apm(_) => ConditionKind::Apm,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ChildCondition::Nrql(object) => &object.metadata,
            ChildCondition::Apm(object) => &object.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ChildCondition::Nrql(object) => &mut object.metadata,
            ChildCondition::Apm(object) => &mut object.metadata,
        }
    }

    #[must_use]
    pub fn key(&self) -> ResourceKey {
        match self {
            ChildCondition::Nrql(object) => ResourceKey::of(object),
            ChildCondition::Apm(object) => ResourceKey::of(object),
        }
    }

    /// Current spec wrapped in the tagged union
    #[must_use]
    pub fn spec(&self) -> ConditionSpec {
        match self {
            ChildCondition::Nrql(object) => ConditionSpec::Nrql(object.spec.clone()),
            ChildCondition::Apm(object) => ConditionSpec::Apm(object.spec.clone()),
        }
    }

    /// Replace the spec
    ///
    /// # Errors
    /// Returns an error if `spec` is of a different kind than the object
    pub fn set_spec(&mut self, spec: ConditionSpec) -> Result<(), StoreError> {
        match (self, spec) {
            (ChildCondition::Nrql(object), ConditionSpec::Nrql(spec)) => {
                object.spec = spec;
                Ok(())
            }
            (ChildCondition::Apm(object), ConditionSpec::Apm(spec)) => {
                object.spec = spec;
                Ok(())
            }
            (object, spec) => Err(StoreError::Invalid(format!(
                "cannot store a {} condition in {} {}",
                spec.kind(),
                object.kind().resource_kind(),
                object.key()
            ))),
        }
    }

    /// Remote condition ID recorded in status
    #[must_use]
    pub fn condition_id(&self) -> Option<i64> {
        match self {
            ChildCondition::Nrql(object) => object.status.as_ref().and_then(|s| s.condition_id),
            ChildCondition::Apm(object) => object.status.as_ref().and_then(|s| s.condition_id),
        }
    }
}

/// Access to `AlertsPolicy` objects
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_policy(&self, key: &ResourceKey) -> Result<Option<AlertsPolicy>, StoreError>;

    /// Write spec and metadata (finalizers), returning the stored object
    async fn update_policy(&self, policy: &AlertsPolicy) -> Result<AlertsPolicy, StoreError>;

    async fn update_policy_status(
        &self,
        key: &ResourceKey,
        status: &AlertsPolicyStatus,
    ) -> Result<(), StoreError>;
}

/// Access to child condition objects of both kinds
#[async_trait]
pub trait ConditionStore: Send + Sync {
    async fn get_condition(
        &self,
        kind: ConditionKind,
        key: &ResourceKey,
    ) -> Result<Option<ChildCondition>, StoreError>;

    /// Create a child from `metadata.generateName`, returning it with its assigned name
    async fn create_condition(
        &self,
        condition: &ChildCondition,
    ) -> Result<ChildCondition, StoreError>;

    /// Write spec and metadata, returning the stored object
    async fn update_condition(
        &self,
        condition: &ChildCondition,
    ) -> Result<ChildCondition, StoreError>;

    /// Write the object's status
    async fn update_condition_status(&self, condition: &ChildCondition) -> Result<(), StoreError>;

    /// Children of `kind` labelled as belonging to `policy` in `namespace`
    async fn list_policy_conditions(
        &self,
        kind: ConditionKind,
        namespace: &str,
        policy: &str,
    ) -> Result<Vec<ChildCondition>, StoreError>;

    /// Request deletion. Deleting an absent object succeeds.
    async fn delete_condition(
        &self,
        kind: ConditionKind,
        key: &ResourceKey,
    ) -> Result<(), StoreError>;
}

/// Access to Kubernetes Secrets holding API keys
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Raw `data` of the secret, `None` if the secret does not exist
    async fn read_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError>;
}

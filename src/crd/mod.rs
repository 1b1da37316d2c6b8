//! # Custom Resource Definitions
//!
//! CRD types for the Alerts Policy Controller.
//!
//! ## Module Structure
//!
//! - `policy.rs` - `AlertsPolicy`, the desired-state document
//! - `condition.rs` - condition specs and the `AlertsNrqlCondition` / `AlertsApmCondition` children
//! - `common.rs` - credential references, regions, terms and status conditions

mod common;
mod condition;
mod policy;

pub use common::{
    default_true, AlertTerm, Condition, Region, SecretReference, TermOperator, TermPriority,
    TimeFunction,
};
pub use condition::{
    AlertsApmCondition, AlertsApmConditionStatus, AlertsNrqlCondition, AlertsNrqlConditionStatus,
    ApmConditionSpec, ChildConditionStatus, ConditionBase, ConditionKind, ConditionSpec,
    NrqlConditionSpec, NrqlQuery, PolicyCondition, UserDefinedMetric,
};
pub use policy::{AlertsPolicy, AlertsPolicySpec, AlertsPolicyStatus, IncidentPreference};

/// Namespace/name identity of a namespaced resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Identity of any namespaced object
    #[must_use]
    pub fn of<K: kube::Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            namespace: meta.namespace.clone().unwrap_or_else(|| "default".to_string()),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

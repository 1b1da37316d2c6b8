//! # Alert Condition Resources
//!
//! Condition specs in their two flavours (NRQL-query based and APM-metric
//! based), the tagged union embedded in `AlertsPolicy`, and the two child
//! custom resources the policy reconciler creates for each entry.

use crate::crd::common::{default_true, AlertTerm, Condition, Region, SecretReference};
use serde::{Deserialize, Serialize};

/// Fields shared by every condition kind
///
/// The last four fields are inherited from the parent policy when the child
/// object is created or updated. They never take part in fingerprinting.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionBase {
    /// Condition name as shown in New Relic. Used to match conditions across passes.
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub terms: Vec<AlertTerm>,
    #[serde(default)]
    pub runbook_url: Option<String>,
    /// Inline API key (inherited)
    #[serde(default)]
    pub api_key: Option<String>,
    /// API key secret reference (inherited)
    #[serde(default)]
    pub api_key_secret: Option<SecretReference>,
    /// Region (inherited)
    #[serde(default)]
    pub region: Option<Region>,
    /// Remote policy the condition belongs to (inherited)
    #[serde(default)]
    pub existing_policy_id: Option<i64>,
}

impl ConditionBase {
    /// Clear every field inherited from the parent policy
    pub fn strip_inherited(&mut self) {
        self.api_key = None;
        self.api_key_secret = None;
        self.region = None;
        self.existing_policy_id = None;
    }
}

/// NRQL query and look-back window
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NrqlQuery {
    pub query: String,
    /// Look-back window in minutes (e.g. "3")
    pub since_value: String,
}

/// NRQL-query-based alert condition
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema,
)]
#[kube(
    kind = "AlertsNrqlCondition",
    group = "nr.k8s.newrelic.com",
    version = "v1",
    namespaced,
    status = "AlertsNrqlConditionStatus",
    shortname = "nrqlcondition",
    printcolumn = r#"{"name":"Condition ID", "type":"integer", "jsonPath":".status.conditionId"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NrqlConditionSpec {
    #[serde(flatten)]
    pub base: ConditionBase,
    pub nrql: NrqlQuery,
    /// `single_value` or `sum`
    #[serde(default)]
    pub value_function: Option<String>,
    #[serde(default)]
    pub violation_time_limit_seconds: Option<i64>,
    #[serde(default)]
    pub expected_groups: Option<i64>,
    #[serde(default)]
    pub ignore_overlap: Option<bool>,
}

/// Custom metric definition for `user_defined` APM conditions
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDefinedMetric {
    pub metric: String,
    pub value_function: String,
}

/// APM-metric-based alert condition
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema,
)]
#[kube(
    kind = "AlertsApmCondition",
    group = "nr.k8s.newrelic.com",
    version = "v1",
    namespaced,
    status = "AlertsApmConditionStatus",
    shortname = "apmcondition",
    printcolumn = r#"{"name":"Condition ID", "type":"integer", "jsonPath":".status.conditionId"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApmConditionSpec {
    #[serde(flatten)]
    pub base: ConditionBase,
    /// e.g. `apm_app_metric`, `apm_kt_metric`
    pub condition_type: String,
    #[serde(default)]
    pub entities: Vec<String>,
    pub metric: String,
    /// `application` or `instance`
    #[serde(default)]
    pub condition_scope: Option<String>,
    #[serde(default)]
    pub violation_close_timer: Option<i64>,
    #[serde(default)]
    pub user_defined: Option<UserDefinedMetric>,
}

/// Status shared by both child condition kinds
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChildConditionStatus<S> {
    /// Spec that was last pushed to New Relic successfully
    #[serde(default)]
    pub applied_spec: Option<S>,
    /// Remote condition ID assigned by New Relic
    #[serde(default)]
    pub condition_id: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
}

pub type AlertsNrqlConditionStatus = ChildConditionStatus<NrqlConditionSpec>;
pub type AlertsApmConditionStatus = ChildConditionStatus<ApmConditionSpec>;

/// Which child resource kind a condition maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Nrql,
    Apm,
}

impl ConditionKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::Nrql => "nrql",
            ConditionKind::Apm => "apm",
        }
    }

    /// Kubernetes kind of the child resource
    #[must_use]
    pub fn resource_kind(&self) -> &'static str {
        match self {
            ConditionKind::Nrql => "AlertsNrqlCondition",
            ConditionKind::Apm => "AlertsApmCondition",
        }
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A condition as declared inside an `AlertsPolicy`, tagged by kind
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(tag = "type")]
pub enum ConditionSpec {
    #[serde(rename = "NRQL")]
    Nrql(NrqlConditionSpec),
    #[serde(rename = "APM")]
    Apm(ApmConditionSpec),
}

impl ConditionSpec {
    #[must_use]
    pub fn kind(&self) -> ConditionKind {
        match self {
            ConditionSpec::Nrql(_) => ConditionKind::Nrql,
            ConditionSpec::Apm(_) => ConditionKind::Apm,
        }
    }

    #[must_use]
    pub fn base(&self) -> &ConditionBase {
        match self {
            ConditionSpec::Nrql(spec) => &spec.base,
            ConditionSpec::Apm(spec) => &spec.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut ConditionBase {
        match self {
            ConditionSpec::Nrql(spec) => &mut spec.base,
            ConditionSpec::Apm(spec) => &mut spec.base,
        }
    }

    /// Semantic name of the condition
    #[must_use]
    pub fn name(&self) -> &str {
        &self.base().name
    }
}

/// Entry of `AlertsPolicy.spec.conditions`
///
/// `resource_name`/`resource_namespace` identify the child resource created for
/// this entry. They start empty and are back-filled by the reconciler; callers
/// cannot choose the child's name.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCondition {
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub resource_namespace: Option<String>,
    pub spec: ConditionSpec,
}

impl PolicyCondition {
    #[must_use]
    pub fn new(spec: ConditionSpec) -> Self {
        Self {
            resource_name: None,
            resource_namespace: None,
            spec,
        }
    }

    /// Identity pair of the child resource, if it has been resolved
    #[must_use]
    pub fn identity(&self) -> Option<crate::crd::ResourceKey> {
        match (&self.resource_name, &self.resource_namespace) {
            (Some(name), Some(namespace)) if !name.is_empty() && !namespace.is_empty() => {
                Some(crate::crd::ResourceKey::new(namespace, name))
            }
            _ => None,
        }
    }

    pub fn set_identity(&mut self, key: &crate::crd::ResourceKey) {
        self.resource_name = Some(key.name.clone());
        self.resource_namespace = Some(key.namespace.clone());
    }
}

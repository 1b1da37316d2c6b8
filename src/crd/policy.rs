//! # AlertsPolicy Spec
//!
//! The desired-state document: a New Relic alert policy that owns a list of
//! conditions and a set of notification channel attachments.

use crate::crd::common::{Condition, Region, SecretReference};
use crate::crd::condition::PolicyCondition;
use serde::{Deserialize, Serialize};

/// AlertsPolicy Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: nr.k8s.newrelic.com/v1
/// kind: AlertsPolicy
/// metadata:
///   name: checkout-alerts
///   namespace: default
/// spec:
///   name: Checkout alerts
///   region: US
///   incidentPreference: PER_POLICY
///   apiKeySecret:
///     name: newrelic-api-key
///     keyName: api-key
///   conditions:
///     - spec:
///         type: NRQL
///         name: NRQL Condition
///         nrql:
///           query: SELECT count(*) FROM Transaction WHERE error IS true
///           sinceValue: "5"
///         terms:
///           - duration: "5"
///             operator: above
///             priority: critical
///             threshold: "5"
///             timeFunction: all
///   channelIds: [1234]
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[kube(
    kind = "AlertsPolicy",
    group = "nr.k8s.newrelic.com",
    version = "v1",
    namespaced,
    status = "AlertsPolicyStatus",
    shortname = "alertspolicy",
    printcolumn = r#"{"name":"Policy ID", "type":"integer", "jsonPath":".status.policyId"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AlertsPolicySpec {
    /// Policy name in New Relic. Used to adopt an existing remote policy.
    pub name: String,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub incident_preference: IncidentPreference,
    /// Inline API key. Takes precedence over `apiKeySecret`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_secret: Option<SecretReference>,
    #[serde(default)]
    pub conditions: Vec<PolicyCondition>,
    /// Notification channel IDs to attach to the policy
    #[serde(default)]
    pub channel_ids: Vec<i64>,
    /// Notification channel names, resolved to IDs through the channel listing
    #[serde(default)]
    pub channel_names: Vec<String>,
}

impl AlertsPolicySpec {
    /// Whether the fields sent to the remote policy endpoint differ
    ///
    /// Conditions and channels are deliberately ignored: they have their own
    /// change detection.
    #[must_use]
    pub fn policy_fields_differ(&self, other: &AlertsPolicySpec) -> bool {
        self.name != other.name || self.incident_preference != other.incident_preference
    }

    #[must_use]
    pub fn effective_region(&self) -> Region {
        self.region.unwrap_or_default()
    }
}

/// How New Relic groups violations into incidents
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentPreference {
    #[default]
    PerPolicy,
    PerCondition,
    PerConditionAndTarget,
}

impl IncidentPreference {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentPreference::PerPolicy => "PER_POLICY",
            IncidentPreference::PerCondition => "PER_CONDITION",
            IncidentPreference::PerConditionAndTarget => "PER_CONDITION_AND_TARGET",
        }
    }

    /// Parse the API representation, falling back to the default for unknown values
    #[must_use]
    pub fn from_api(value: &str) -> Self {
        match value {
            "PER_CONDITION" => IncidentPreference::PerCondition,
            "PER_CONDITION_AND_TARGET" => IncidentPreference::PerConditionAndTarget,
            _ => IncidentPreference::PerPolicy,
        }
    }
}

/// Status of the AlertsPolicy resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertsPolicyStatus {
    /// Snapshot of the spec at the end of the last fully converged pass.
    /// Every diff on the next pass is computed against it.
    #[serde(default)]
    pub applied_spec: Option<AlertsPolicySpec>,
    /// Remote policy ID assigned by New Relic
    #[serde(default)]
    pub policy_id: Option<i64>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
}

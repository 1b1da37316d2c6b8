//! # Shared CRD Types
//!
//! Types embedded in more than one custom resource: credential references,
//! regions and alert terms.

use serde::{Deserialize, Serialize};

/// Reference to a Kubernetes Secret holding a New Relic API key
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,
    /// Secret namespace. Defaults to the namespace of the referencing resource.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Key inside the secret's `data` map that holds the API key
    pub key_name: String,
}

/// New Relic data center region
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, schemars::JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Eu => "EU",
        }
    }
}

/// Threshold operator of an alert term
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TermOperator {
    #[default]
    Above,
    Below,
    Equal,
}

impl TermOperator {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TermOperator::Above => "above",
            TermOperator::Below => "below",
            TermOperator::Equal => "equal",
        }
    }
}

/// Priority of an alert term
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TermPriority {
    #[default]
    Critical,
    Warning,
}

impl TermPriority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TermPriority::Critical => "critical",
            TermPriority::Warning => "warning",
        }
    }
}

/// Whether every data point or any data point in the window must breach
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimeFunction {
    #[default]
    All,
    Any,
}

impl TimeFunction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFunction::All => "all",
            TimeFunction::Any => "any",
        }
    }
}

/// A single threshold/operator/priority tuple
///
/// Terms are compared positionally: the same terms in a different order make a
/// different condition as far as fingerprinting is concerned.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertTerm {
    /// Evaluation window in minutes (e.g. "5")
    pub duration: String,
    #[serde(default)]
    pub operator: TermOperator,
    #[serde(default)]
    pub priority: TermPriority,
    /// Threshold value as accepted by the API (e.g. "5", "0.75")
    pub threshold: String,
    #[serde(default)]
    pub time_function: TimeFunction,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// Build a `Ready` condition stamped with the current time
    #[must_use]
    pub fn ready(ready: bool, reason: &str, message: Option<String>) -> Self {
        Self {
            r#type: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message,
        }
    }
}

/// Default value for boolean true
#[must_use]
pub fn default_true() -> bool {
    true
}

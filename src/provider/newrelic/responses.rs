//! # Response Bodies
//!
//! Only the fields the reconcilers consume are decoded.

use crate::crd::IncidentPreference;
use crate::provider::{RemoteChannel, RemoteCondition, RemotePolicy};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct PolicyEnvelope {
    pub policy: PolicyResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PoliciesEnvelope {
    #[serde(default)]
    pub policies: Vec<PolicyResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PolicyResponse {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub incident_preference: Option<String>,
}

impl From<PolicyResponse> for RemotePolicy {
    fn from(policy: PolicyResponse) -> Self {
        RemotePolicy {
            id: policy.id,
            name: policy.name,
            incident_preference: policy
                .incident_preference
                .as_deref()
                .map(IncidentPreference::from_api)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConditionResponse {
    pub id: i64,
    pub name: String,
}

impl From<ConditionResponse> for RemoteCondition {
    fn from(condition: ConditionResponse) -> Self {
        RemoteCondition {
            id: condition.id,
            name: condition.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct NrqlConditionEnvelope {
    pub nrql_condition: ConditionResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NrqlConditionsEnvelope {
    #[serde(default)]
    pub nrql_conditions: Vec<ConditionResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApmConditionEnvelope {
    pub condition: ConditionResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApmConditionsEnvelope {
    #[serde(default)]
    pub conditions: Vec<ConditionResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelsEnvelope {
    #[serde(default)]
    pub channels: Vec<ChannelResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelResponse {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub channel_type: String,
}

impl From<ChannelResponse> for RemoteChannel {
    fn from(channel: ChannelResponse) -> Self {
        RemoteChannel {
            id: channel.id,
            name: channel.name,
            channel_type: channel.channel_type,
        }
    }
}

/// Error body: `{"error": {"title": "..."}}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub title: String,
}

//! # Request Bodies
//!
//! Wire representations of the request payloads, built from the CRD types by
//! explicit field-by-field mapping. Inherited fields (credentials, region,
//! target policy) never reach the wire.

use crate::crd::{AlertTerm, AlertsPolicySpec, ApmConditionSpec, NrqlConditionSpec};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct PolicyRequest {
    pub policy: PolicyBody,
}

#[derive(Debug, Serialize)]
pub(crate) struct PolicyBody {
    pub name: String,
    pub incident_preference: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct TermBody {
    pub duration: String,
    pub operator: &'static str,
    pub priority: &'static str,
    pub threshold: String,
    pub time_function: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct NrqlConditionRequest {
    pub nrql_condition: NrqlConditionBody,
}

#[derive(Debug, Serialize)]
pub(crate) struct NrqlConditionBody {
    pub name: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runbook_url: Option<String>,
    pub terms: Vec<TermBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_time_limit_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_groups: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_overlap: Option<bool>,
    pub nrql: NrqlBody,
}

#[derive(Debug, Serialize)]
pub(crate) struct NrqlBody {
    pub query: String,
    pub since_value: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApmConditionRequest {
    pub condition: ApmConditionBody,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApmConditionBody {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub name: String,
    pub enabled: bool,
    pub entities: Vec<String>,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runbook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_close_timer: Option<i64>,
    pub terms: Vec<TermBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_defined: Option<UserDefinedBody>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserDefinedBody {
    pub metric: String,
    pub value_function: String,
}

pub(crate) fn policy_request(spec: &AlertsPolicySpec) -> PolicyRequest {
    PolicyRequest {
        policy: PolicyBody {
            name: spec.name.clone(),
            incident_preference: spec.incident_preference.as_str(),
        },
    }
}

fn term_body(term: &AlertTerm) -> TermBody {
    TermBody {
        duration: term.duration.clone(),
        operator: term.operator.as_str(),
        priority: term.priority.as_str(),
        threshold: term.threshold.clone(),
        time_function: term.time_function.as_str(),
    }
}

pub(crate) fn nrql_condition_request(spec: &NrqlConditionSpec) -> NrqlConditionRequest {
    NrqlConditionRequest {
        nrql_condition: NrqlConditionBody {
            name: spec.base.name.clone(),
            enabled: spec.base.enabled,
            runbook_url: spec.base.runbook_url.clone(),
            terms: spec.base.terms.iter().map(term_body).collect(),
            value_function: spec.value_function.clone(),
            violation_time_limit_seconds: spec.violation_time_limit_seconds,
            expected_groups: spec.expected_groups,
            ignore_overlap: spec.ignore_overlap,
            nrql: NrqlBody {
                query: spec.nrql.query.clone(),
                since_value: spec.nrql.since_value.clone(),
            },
        },
    }
}

pub(crate) fn apm_condition_request(spec: &ApmConditionSpec) -> ApmConditionRequest {
    ApmConditionRequest {
        condition: ApmConditionBody {
            condition_type: spec.condition_type.clone(),
            name: spec.base.name.clone(),
            enabled: spec.base.enabled,
            entities: spec.entities.clone(),
            metric: spec.metric.clone(),
            runbook_url: spec.base.runbook_url.clone(),
            condition_scope: spec.condition_scope.clone(),
            violation_close_timer: spec.violation_close_timer,
            terms: spec.base.terms.iter().map(term_body).collect(),
            user_defined: spec.user_defined.as_ref().map(|u| UserDefinedBody {
                metric: u.metric.clone(),
                value_function: u.value_function.clone(),
            }),
        },
    }
}

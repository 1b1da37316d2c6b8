//! # Provider Modules
//!
//! The remote alerting system, seen through the `AlertsClient` trait.
//!
//! The reconcilers never construct clients themselves: an `AlertsClientFactory`
//! is handed to the reconciler context and builds a client bound to the
//! credentials and region resolved for each pass.
//!
//! - `newrelic`: REST API v2 implementation over `reqwest`

use crate::crd::{ApmConditionSpec, IncidentPreference, NrqlConditionSpec, AlertsPolicySpec, Region};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

pub mod newrelic;

pub use newrelic::{NewRelicClient, NewRelicClientFactory};

/// Errors returned by remote calls
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("New Relic API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("request to New Relic failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode New Relic response: {0}")]
    Decode(String),
    #[error("invalid client configuration: {0}")]
    Configuration(String),
    #[error("listing {subject} still had more results after {pages} pages")]
    TooManyPages { subject: String, pages: u32 },
}

impl ClientError {
    /// Whether the remote object is already gone
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Remote policy as returned by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePolicy {
    pub id: i64,
    pub name: String,
    pub incident_preference: IncidentPreference,
}

/// Remote condition (either kind) as returned by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCondition {
    pub id: i64,
    pub name: String,
}

/// Notification channel as returned by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChannel {
    pub id: i64,
    pub name: String,
    pub channel_type: String,
}

/// Credentials and location a client is bound to
#[derive(Clone)]
pub struct ClientCredentials {
    pub api_key: Zeroizing<String>,
    pub region: Region,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("api_key", &"***")
            .field("region", &self.region)
            .finish()
    }
}

/// Remote alerting API
///
/// Additions are batched (`attach_channels`) while removals take a single
/// channel (`detach_channel`), mirroring the REST API.
#[async_trait]
pub trait AlertsClient: Send + Sync {
    async fn create_policy(&self, spec: &AlertsPolicySpec) -> Result<RemotePolicy, ClientError>;

    async fn update_policy(
        &self,
        policy_id: i64,
        spec: &AlertsPolicySpec,
    ) -> Result<RemotePolicy, ClientError>;

    async fn delete_policy(&self, policy_id: i64) -> Result<(), ClientError>;

    /// Policies whose name matches exactly
    async fn find_policies_by_name(&self, name: &str) -> Result<Vec<RemotePolicy>, ClientError>;

    async fn create_nrql_condition(
        &self,
        policy_id: i64,
        spec: &NrqlConditionSpec,
    ) -> Result<RemoteCondition, ClientError>;

    async fn update_nrql_condition(
        &self,
        condition_id: i64,
        spec: &NrqlConditionSpec,
    ) -> Result<RemoteCondition, ClientError>;

    async fn delete_nrql_condition(&self, condition_id: i64) -> Result<(), ClientError>;

    async fn list_nrql_conditions(
        &self,
        policy_id: i64,
    ) -> Result<Vec<RemoteCondition>, ClientError>;

    async fn create_apm_condition(
        &self,
        policy_id: i64,
        spec: &ApmConditionSpec,
    ) -> Result<RemoteCondition, ClientError>;

    async fn update_apm_condition(
        &self,
        condition_id: i64,
        spec: &ApmConditionSpec,
    ) -> Result<RemoteCondition, ClientError>;

    async fn delete_apm_condition(&self, condition_id: i64) -> Result<(), ClientError>;

    async fn list_apm_conditions(
        &self,
        policy_id: i64,
    ) -> Result<Vec<RemoteCondition>, ClientError>;

    async fn attach_channels(&self, policy_id: i64, channel_ids: &[i64])
        -> Result<(), ClientError>;

    async fn detach_channel(&self, policy_id: i64, channel_id: i64) -> Result<(), ClientError>;

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ClientError>;
}

/// Builds clients bound to resolved credentials
pub trait AlertsClientFactory: Send + Sync {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built
    fn build(&self, credentials: &ClientCredentials) -> Result<Arc<dyn AlertsClient>, ClientError>;
}

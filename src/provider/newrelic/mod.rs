//! # New Relic REST Client
//!
//! `AlertsClient` implementation against the New Relic REST API v2.
//!
//! Uses reqwest (rustls) with the `X-Api-Key` header. The regional base URL is
//! chosen from the policy's region; `NEW_RELIC_API_ENDPOINT` overrides it so
//! tests can point the client at a local mock server.

mod requests;
mod responses;

use crate::config::ControllerConfig;
use crate::constants::{NEW_RELIC_EU_ENDPOINT, NEW_RELIC_US_ENDPOINT};
use crate::crd::{AlertsPolicySpec, ApmConditionSpec, NrqlConditionSpec, Region};
use crate::observability::metrics;
use crate::provider::{
    AlertsClient, AlertsClientFactory, ClientCredentials, ClientError, RemoteChannel,
    RemoteCondition, RemotePolicy,
};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use requests::{apm_condition_request, nrql_condition_request, policy_request};
use responses::{
    ApmConditionEnvelope, ApmConditionsEnvelope, ChannelsEnvelope, ErrorEnvelope,
    NrqlConditionEnvelope, NrqlConditionsEnvelope, PoliciesEnvelope, PolicyEnvelope,
};

/// Upper bound on followed `Link: rel="next"` pages for one listing
const MAX_PAGES: u32 = 100;

/// New Relic REST API v2 client
pub struct NewRelicClient {
    http_client: Client,
    base_url: String,
    api_key: Zeroizing<String>,
}

impl std::fmt::Debug for NewRelicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewRelicClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Regional base URL, unless an override is configured
fn base_url_for(region: Region, endpoint_override: Option<&str>) -> String {
    match endpoint_override {
        Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
        _ => match region {
            Region::Us => NEW_RELIC_US_ENDPOINT.to_string(),
            Region::Eu => NEW_RELIC_EU_ENDPOINT.to_string(),
        },
    }
}

/// Whether the `Link` header advertises another page
fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get_all(reqwest::header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("rel=\"next\""))
}

impl NewRelicClient {
    /// Create a client bound to the given credentials
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(
        credentials: &ClientCredentials,
        endpoint_override: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        if credentials.api_key.trim().is_empty() {
            return Err(ClientError::Configuration("API key is empty".to_string()));
        }

        let base_url = base_url_for(credentials.region, endpoint_override);
        debug!(
            "Initializing New Relic client for region {} at {}",
            credentials.region.as_str(),
            base_url
        );

        // Create HTTP client with rustls (already configured in Cargo.toml)
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            api_key: credentials.api_key.clone(),
        })
    }

    /// Build HTTP request with authentication headers
    fn make_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http_client
            .request(method, url)
            .header("X-Api-Key", self.api_key.as_str())
            .header("Accept", "application/json")
    }

    /// Map a non-success response to a typed error
    fn handle_error_response(status: StatusCode, error_text: &str, subject: &str) -> ClientError {
        if status == StatusCode::NOT_FOUND {
            return ClientError::NotFound(subject.to_string());
        }

        let message = serde_json::from_str::<ErrorEnvelope>(error_text)
            .map(|envelope| envelope.error.title)
            .unwrap_or_else(|_| error_text.to_string());
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Send a request and check its status, recording the outcome
    async fn send(
        &self,
        operation: &'static str,
        subject: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_remote_operation(operation, "error");
                warn!("New Relic {} request failed: {}", operation, e);
                return Err(ClientError::Transport(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            metrics::record_remote_operation(operation, "success");
            debug!("New Relic {} for {} returned {}", operation, subject, status);
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let error = Self::handle_error_response(status, &error_text, subject);
        if error.is_not_found() {
            metrics::record_remote_operation(operation, "not_found");
            debug!("New Relic {}: {} not found", operation, subject);
        } else {
            metrics::record_remote_operation(operation, "error");
            warn!("New Relic {} for {} failed: {}", operation, subject, error);
        }
        Err(error)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        subject: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = self.send(operation, subject, request).await?;
        Self::decode(response).await
    }

    /// Fetch every page of a listing, following `Link: rel="next"`
    async fn get_all_pages<E, T>(
        &self,
        operation: &'static str,
        subject: &str,
        path: &str,
        query: &[(&str, String)],
        extract: impl Fn(E) -> Vec<T>,
    ) -> Result<Vec<T>, ClientError>
    where
        E: DeserializeOwned,
    {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let request = self
                .make_request(Method::GET, path)
                .query(query)
                .query(&[("page", page)]);
            let response = self.send(operation, subject, request).await?;
            let next = has_next_page(response.headers());
            let envelope: E = Self::decode(response).await?;
            items.extend(extract(envelope));
            if !next {
                return Ok(items);
            }
        }
        // A partial listing could hide a policy or condition we must adopt
        warn!(
            "Listing {} exceeded {} pages, refusing a truncated result",
            subject, MAX_PAGES
        );
        Err(ClientError::TooManyPages {
            subject: subject.to_string(),
            pages: MAX_PAGES,
        })
    }
}

#[async_trait]
impl AlertsClient for NewRelicClient {
    async fn create_policy(&self, spec: &AlertsPolicySpec) -> Result<RemotePolicy, ClientError> {
        info!("Creating New Relic policy '{}'", spec.name);
        let request = self
            .make_request(Method::POST, "/v2/alerts_policies.json")
            .json(&policy_request(spec));
        let envelope: PolicyEnvelope = self
            .execute("create_policy", &format!("policy '{}'", spec.name), request)
            .await?;
        Ok(envelope.policy.into())
    }

    async fn update_policy(
        &self,
        policy_id: i64,
        spec: &AlertsPolicySpec,
    ) -> Result<RemotePolicy, ClientError> {
        info!("Updating New Relic policy {} ('{}')", policy_id, spec.name);
        let request = self
            .make_request(
                Method::PUT,
                &format!("/v2/alerts_policies/{policy_id}.json"),
            )
            .json(&policy_request(spec));
        let envelope: PolicyEnvelope = self
            .execute("update_policy", &format!("policy {policy_id}"), request)
            .await?;
        Ok(envelope.policy.into())
    }

    async fn delete_policy(&self, policy_id: i64) -> Result<(), ClientError> {
        info!("Deleting New Relic policy {}", policy_id);
        let request = self.make_request(
            Method::DELETE,
            &format!("/v2/alerts_policies/{policy_id}.json"),
        );
        self.send("delete_policy", &format!("policy {policy_id}"), request)
            .await
            .map(|_| ())
    }

    async fn find_policies_by_name(&self, name: &str) -> Result<Vec<RemotePolicy>, ClientError> {
        // filter[name] is a partial match; keep exact matches only
        let policies = self
            .get_all_pages(
                "list_policies",
                &format!("policies named '{name}'"),
                "/v2/alerts_policies.json",
                &[("filter[name]", name.to_string())],
                |envelope: PoliciesEnvelope| envelope.policies,
            )
            .await?;
        Ok(policies
            .into_iter()
            .filter(|policy| policy.name == name)
            .map(RemotePolicy::from)
            .collect())
    }

    async fn create_nrql_condition(
        &self,
        policy_id: i64,
        spec: &NrqlConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        info!(
            "Creating NRQL condition '{}' in policy {}",
            spec.base.name, policy_id
        );
        let request = self
            .make_request(
                Method::POST,
                &format!("/v2/alerts_nrql_conditions/policies/{policy_id}.json"),
            )
            .json(&nrql_condition_request(spec));
        let envelope: NrqlConditionEnvelope = self
            .execute(
                "create_nrql_condition",
                &format!("policy {policy_id}"),
                request,
            )
            .await?;
        Ok(envelope.nrql_condition.into())
    }

    async fn update_nrql_condition(
        &self,
        condition_id: i64,
        spec: &NrqlConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        info!(
            "Updating NRQL condition {} ('{}')",
            condition_id, spec.base.name
        );
        let request = self
            .make_request(
                Method::PUT,
                &format!("/v2/alerts_nrql_conditions/{condition_id}.json"),
            )
            .json(&nrql_condition_request(spec));
        let envelope: NrqlConditionEnvelope = self
            .execute(
                "update_nrql_condition",
                &format!("NRQL condition {condition_id}"),
                request,
            )
            .await?;
        Ok(envelope.nrql_condition.into())
    }

    async fn delete_nrql_condition(&self, condition_id: i64) -> Result<(), ClientError> {
        info!("Deleting NRQL condition {}", condition_id);
        let request = self.make_request(
            Method::DELETE,
            &format!("/v2/alerts_nrql_conditions/{condition_id}.json"),
        );
        self.send(
            "delete_nrql_condition",
            &format!("NRQL condition {condition_id}"),
            request,
        )
        .await
        .map(|_| ())
    }

    async fn list_nrql_conditions(
        &self,
        policy_id: i64,
    ) -> Result<Vec<RemoteCondition>, ClientError> {
        let conditions = self
            .get_all_pages(
                "list_nrql_conditions",
                &format!("policy {policy_id}"),
                &format!("/v2/alerts_nrql_conditions/policies/{policy_id}.json"),
                &[],
                |envelope: NrqlConditionsEnvelope| envelope.nrql_conditions,
            )
            .await?;
        Ok(conditions.into_iter().map(RemoteCondition::from).collect())
    }

    async fn create_apm_condition(
        &self,
        policy_id: i64,
        spec: &ApmConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        info!(
            "Creating APM condition '{}' in policy {}",
            spec.base.name, policy_id
        );
        let request = self
            .make_request(
                Method::POST,
                &format!("/v2/alerts_conditions/policies/{policy_id}.json"),
            )
            .json(&apm_condition_request(spec));
        let envelope: ApmConditionEnvelope = self
            .execute(
                "create_apm_condition",
                &format!("policy {policy_id}"),
                request,
            )
            .await?;
        Ok(envelope.condition.into())
    }

    async fn update_apm_condition(
        &self,
        condition_id: i64,
        spec: &ApmConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        info!(
            "Updating APM condition {} ('{}')",
            condition_id, spec.base.name
        );
        let request = self
            .make_request(
                Method::PUT,
                &format!("/v2/alerts_conditions/{condition_id}.json"),
            )
            .json(&apm_condition_request(spec));
        let envelope: ApmConditionEnvelope = self
            .execute(
                "update_apm_condition",
                &format!("APM condition {condition_id}"),
                request,
            )
            .await?;
        Ok(envelope.condition.into())
    }

    async fn delete_apm_condition(&self, condition_id: i64) -> Result<(), ClientError> {
        info!("Deleting APM condition {}", condition_id);
        let request = self.make_request(
            Method::DELETE,
            &format!("/v2/alerts_conditions/{condition_id}.json"),
        );
        self.send(
            "delete_apm_condition",
            &format!("APM condition {condition_id}"),
            request,
        )
        .await
        .map(|_| ())
    }

    async fn list_apm_conditions(
        &self,
        policy_id: i64,
    ) -> Result<Vec<RemoteCondition>, ClientError> {
        let conditions = self
            .get_all_pages(
                "list_apm_conditions",
                &format!("policy {policy_id}"),
                &format!("/v2/alerts_conditions/policies/{policy_id}.json"),
                &[],
                |envelope: ApmConditionsEnvelope| envelope.conditions,
            )
            .await?;
        Ok(conditions.into_iter().map(RemoteCondition::from).collect())
    }

    async fn attach_channels(
        &self,
        policy_id: i64,
        channel_ids: &[i64],
    ) -> Result<(), ClientError> {
        let ids = channel_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        info!("Attaching channels [{}] to policy {}", ids, policy_id);
        let request = self
            .make_request(Method::PUT, "/v2/alerts_policy_channels.json")
            .query(&[("policy_id", policy_id.to_string()), ("channel_ids", ids)]);
        self.send("attach_channels", &format!("policy {policy_id}"), request)
            .await
            .map(|_| ())
    }

    async fn detach_channel(&self, policy_id: i64, channel_id: i64) -> Result<(), ClientError> {
        info!("Detaching channel {} from policy {}", channel_id, policy_id);
        let request = self
            .make_request(Method::DELETE, "/v2/alerts_policy_channels.json")
            .query(&[("policy_id", policy_id), ("channel_id", channel_id)]);
        self.send(
            "detach_channel",
            &format!("channel {channel_id} on policy {policy_id}"),
            request,
        )
        .await
        .map(|_| ())
    }

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ClientError> {
        let channels = self
            .get_all_pages(
                "list_channels",
                "channels",
                "/v2/alerts_channels.json",
                &[],
                |envelope: ChannelsEnvelope| envelope.channels,
            )
            .await?;
        Ok(channels.into_iter().map(RemoteChannel::from).collect())
    }
}

/// Builds `NewRelicClient`s for the reconcilers
#[derive(Debug, Clone)]
pub struct NewRelicClientFactory {
    endpoint_override: Option<String>,
    timeout: Duration,
}

impl NewRelicClientFactory {
    #[must_use]
    pub fn new(endpoint_override: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint_override,
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.new_relic_api_endpoint.clone(), config.remote_timeout())
    }
}

impl AlertsClientFactory for NewRelicClientFactory {
    fn build(&self, credentials: &ClientCredentials) -> Result<Arc<dyn AlertsClient>, ClientError> {
        let client = NewRelicClient::new(
            credentials,
            self.endpoint_override.as_deref(),
            self.timeout,
        )?;
        Ok(Arc::new(client))
    }
}

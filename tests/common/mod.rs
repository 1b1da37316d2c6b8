//! Shared fixtures for the integration tests
//!
//! - `FakeAlertsClient`: records every remote call and keeps remote state in memory
//! - `InMemoryStore`: `PolicyStore` + `ConditionStore` + `SecretSource` with
//!   finalizer, `generateName` and status-subresource semantics
//! - builders for policies and conditions

#![allow(dead_code, reason = "each test binary uses a different subset")]

use alerts_policy_controller::config::ControllerConfig;
use alerts_policy_controller::constants::POLICY_LABEL;
use alerts_policy_controller::controller::reconciler::Reconciler;
use alerts_policy_controller::crd::{
    AlertTerm, AlertsPolicy, AlertsPolicySpec, AlertsPolicyStatus, ApmConditionSpec,
    ConditionBase, ConditionKind, ConditionSpec, IncidentPreference, NrqlConditionSpec, NrqlQuery,
    PolicyCondition, ResourceKey, SecretReference, TermOperator, TermPriority, TimeFunction,
};
use alerts_policy_controller::provider::{
    AlertsClient, AlertsClientFactory, ClientCredentials, ClientError, RemoteChannel,
    RemoteCondition, RemotePolicy,
};
use alerts_policy_controller::store::{
    ChildCondition, ConditionStore, PolicyStore, SecretSource, StoreError,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "default";
pub const API_KEY: &str = "NRAK-TEST";

// ---------------------------------------------------------------------------
// Remote side
// ---------------------------------------------------------------------------

/// One recorded remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreatePolicy(String),
    UpdatePolicy(i64),
    DeletePolicy(i64),
    FindPolicies(String),
    CreateCondition {
        kind: ConditionKind,
        policy_id: i64,
        name: String,
    },
    UpdateCondition {
        kind: ConditionKind,
        condition_id: i64,
    },
    DeleteCondition {
        kind: ConditionKind,
        condition_id: i64,
    },
    ListConditions {
        kind: ConditionKind,
        policy_id: i64,
    },
    AttachChannels(i64, Vec<i64>),
    DetachChannel(i64, i64),
    ListChannels,
}

impl Call {
    /// Calls that change remote state
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Call::FindPolicies(_) | Call::ListConditions { .. } | Call::ListChannels
        )
    }
}

/// Injected failure for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    ServerError,
}

impl Failure {
    fn error(self, subject: &str) -> ClientError {
        match self {
            Failure::NotFound => ClientError::NotFound(subject.to_string()),
            Failure::ServerError => ClientError::Api {
                status: 500,
                message: format!("injected failure for {subject}"),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredCondition {
    pub kind: ConditionKind,
    pub policy_id: i64,
    pub name: String,
    pub spec: ConditionSpec,
}

#[derive(Debug, Default)]
struct RemoteState {
    next_id: i64,
    calls: Vec<Call>,
    policies: BTreeMap<i64, RemotePolicy>,
    conditions: BTreeMap<i64, StoredCondition>,
    channels: Vec<RemoteChannel>,
    attachments: BTreeMap<i64, BTreeSet<i64>>,
    failures: HashMap<&'static str, Failure>,
}

impl RemoteState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn check(&self, operation: &'static str, subject: &str) -> Result<(), ClientError> {
        match self.failures.get(operation) {
            Some(failure) => Err(failure.error(subject)),
            None => Ok(()),
        }
    }
}

/// In-memory New Relic account
#[derive(Debug, Default)]
pub struct FakeAlertsClient {
    state: Mutex<RemoteState>,
}

impl FakeAlertsClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().expect("fake client state poisoned")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Make every call of `operation` fail until `heal` is called
    pub fn fail(&self, operation: &'static str, failure: Failure) {
        self.state().failures.insert(operation, failure);
    }

    pub fn heal(&self, operation: &'static str) {
        self.state().failures.remove(operation);
    }

    pub fn add_channel(&self, id: i64, name: &str) {
        self.state().channels.push(RemoteChannel {
            id,
            name: name.to_string(),
            channel_type: "email".to_string(),
        });
    }

    /// Create a remote policy behind the controller's back
    pub fn seed_policy(&self, name: &str, incident_preference: IncidentPreference) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state.policies.insert(
            id,
            RemotePolicy {
                id,
                name: name.to_string(),
                incident_preference,
            },
        );
        id
    }

    /// Create a remote condition behind the controller's back
    pub fn seed_condition(&self, policy_id: i64, spec: ConditionSpec) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state.conditions.insert(
            id,
            StoredCondition {
                kind: spec.kind(),
                policy_id,
                name: spec.name().to_string(),
                spec,
            },
        );
        id
    }

    /// Remove a remote policy behind the controller's back
    pub fn remove_policy(&self, policy_id: i64) {
        let mut state = self.state();
        state.policies.remove(&policy_id);
        state
            .conditions
            .retain(|_, condition| condition.policy_id != policy_id);
        state.attachments.remove(&policy_id);
    }

    pub fn policies(&self) -> Vec<RemotePolicy> {
        self.state().policies.values().cloned().collect()
    }

    pub fn conditions(&self) -> Vec<(i64, StoredCondition)> {
        self.state()
            .conditions
            .iter()
            .map(|(id, condition)| (*id, condition.clone()))
            .collect()
    }

    pub fn attached(&self, policy_id: i64) -> Vec<i64> {
        self.state()
            .attachments
            .get(&policy_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn create_condition(
        &self,
        operation: &'static str,
        policy_id: i64,
        spec: ConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        let mut state = self.state();
        let name = spec.name().to_string();
        state.calls.push(Call::CreateCondition {
            kind: spec.kind(),
            policy_id,
            name: name.clone(),
        });
        state.check(operation, &format!("condition '{name}'"))?;
        if !state.policies.contains_key(&policy_id) {
            return Err(ClientError::NotFound(format!("policy {policy_id}")));
        }
        let id = state.allocate_id();
        state.conditions.insert(
            id,
            StoredCondition {
                kind: spec.kind(),
                policy_id,
                name: name.clone(),
                spec,
            },
        );
        Ok(RemoteCondition { id, name })
    }

    fn update_condition(
        &self,
        operation: &'static str,
        condition_id: i64,
        spec: ConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        let mut state = self.state();
        state.calls.push(Call::UpdateCondition {
            kind: spec.kind(),
            condition_id,
        });
        state.check(operation, &format!("condition {condition_id}"))?;
        let stored = state
            .conditions
            .get_mut(&condition_id)
            .filter(|stored| stored.kind == spec.kind())
            .ok_or_else(|| ClientError::NotFound(format!("condition {condition_id}")))?;
        stored.name = spec.name().to_string();
        stored.spec = spec;
        Ok(RemoteCondition {
            id: condition_id,
            name: stored.name.clone(),
        })
    }

    fn delete_condition(
        &self,
        operation: &'static str,
        kind: ConditionKind,
        condition_id: i64,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.calls.push(Call::DeleteCondition { kind, condition_id });
        state.check(operation, &format!("condition {condition_id}"))?;
        state
            .conditions
            .remove(&condition_id)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(format!("condition {condition_id}")))
    }

    fn list_conditions(
        &self,
        operation: &'static str,
        kind: ConditionKind,
        policy_id: i64,
    ) -> Result<Vec<RemoteCondition>, ClientError> {
        let mut state = self.state();
        state.calls.push(Call::ListConditions { kind, policy_id });
        state.check(operation, &format!("conditions of policy {policy_id}"))?;
        Ok(state
            .conditions
            .iter()
            .filter(|(_, condition)| condition.kind == kind && condition.policy_id == policy_id)
            .map(|(id, condition)| RemoteCondition {
                id: *id,
                name: condition.name.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl AlertsClient for FakeAlertsClient {
    async fn create_policy(&self, spec: &AlertsPolicySpec) -> Result<RemotePolicy, ClientError> {
        let mut state = self.state();
        state.calls.push(Call::CreatePolicy(spec.name.clone()));
        state.check("create_policy", &spec.name)?;
        let id = state.allocate_id();
        let policy = RemotePolicy {
            id,
            name: spec.name.clone(),
            incident_preference: spec.incident_preference,
        };
        state.policies.insert(id, policy.clone());
        Ok(policy)
    }

    async fn update_policy(
        &self,
        policy_id: i64,
        spec: &AlertsPolicySpec,
    ) -> Result<RemotePolicy, ClientError> {
        let mut state = self.state();
        state.calls.push(Call::UpdatePolicy(policy_id));
        state.check("update_policy", &format!("policy {policy_id}"))?;
        let policy = state
            .policies
            .get_mut(&policy_id)
            .ok_or_else(|| ClientError::NotFound(format!("policy {policy_id}")))?;
        policy.name.clone_from(&spec.name);
        policy.incident_preference = spec.incident_preference;
        Ok(policy.clone())
    }

    async fn delete_policy(&self, policy_id: i64) -> Result<(), ClientError> {
        {
            let mut state = self.state();
            state.calls.push(Call::DeletePolicy(policy_id));
            state.check("delete_policy", &format!("policy {policy_id}"))?;
            if !state.policies.contains_key(&policy_id) {
                return Err(ClientError::NotFound(format!("policy {policy_id}")));
            }
        }
        self.remove_policy(policy_id);
        Ok(())
    }

    async fn find_policies_by_name(&self, name: &str) -> Result<Vec<RemotePolicy>, ClientError> {
        let mut state = self.state();
        state.calls.push(Call::FindPolicies(name.to_string()));
        state.check("find_policies_by_name", name)?;
        Ok(state
            .policies
            .values()
            .filter(|policy| policy.name == name)
            .cloned()
            .collect())
    }

    async fn create_nrql_condition(
        &self,
        policy_id: i64,
        spec: &NrqlConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        self.create_condition(
            "create_nrql_condition",
            policy_id,
            ConditionSpec::Nrql(spec.clone()),
        )
    }

    async fn update_nrql_condition(
        &self,
        condition_id: i64,
        spec: &NrqlConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        self.update_condition(
            "update_nrql_condition",
            condition_id,
            ConditionSpec::Nrql(spec.clone()),
        )
    }

    async fn delete_nrql_condition(&self, condition_id: i64) -> Result<(), ClientError> {
        self.delete_condition("delete_nrql_condition", ConditionKind::Nrql, condition_id)
    }

    async fn list_nrql_conditions(
        &self,
        policy_id: i64,
    ) -> Result<Vec<RemoteCondition>, ClientError> {
        self.list_conditions("list_nrql_conditions", ConditionKind::Nrql, policy_id)
    }

    async fn create_apm_condition(
        &self,
        policy_id: i64,
        spec: &ApmConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        self.create_condition(
            "create_apm_condition",
            policy_id,
            ConditionSpec::Apm(spec.clone()),
        )
    }

    async fn update_apm_condition(
        &self,
        condition_id: i64,
        spec: &ApmConditionSpec,
    ) -> Result<RemoteCondition, ClientError> {
        self.update_condition(
            "update_apm_condition",
            condition_id,
            ConditionSpec::Apm(spec.clone()),
        )
    }

    async fn delete_apm_condition(&self, condition_id: i64) -> Result<(), ClientError> {
        self.delete_condition("delete_apm_condition", ConditionKind::Apm, condition_id)
    }

    async fn list_apm_conditions(
        &self,
        policy_id: i64,
    ) -> Result<Vec<RemoteCondition>, ClientError> {
        self.list_conditions("list_apm_conditions", ConditionKind::Apm, policy_id)
    }

    async fn attach_channels(
        &self,
        policy_id: i64,
        channel_ids: &[i64],
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state
            .calls
            .push(Call::AttachChannels(policy_id, channel_ids.to_vec()));
        state.check("attach_channels", &format!("policy {policy_id}"))?;
        state
            .attachments
            .entry(policy_id)
            .or_default()
            .extend(channel_ids.iter().copied());
        Ok(())
    }

    async fn detach_channel(&self, policy_id: i64, channel_id: i64) -> Result<(), ClientError> {
        let mut state = self.state();
        state.calls.push(Call::DetachChannel(policy_id, channel_id));
        state.check("detach_channel", &format!("channel {channel_id}"))?;
        if let Some(attached) = state.attachments.get_mut(&policy_id) {
            attached.remove(&channel_id);
        }
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ClientError> {
        let mut state = self.state();
        state.calls.push(Call::ListChannels);
        state.check("list_channels", "channels")?;
        Ok(state.channels.clone())
    }
}

/// Hands out the shared fake and records the credentials it was asked for
#[derive(Debug)]
pub struct FakeClientFactory {
    pub client: Arc<FakeAlertsClient>,
    credentials: Mutex<Vec<ClientCredentials>>,
}

impl FakeClientFactory {
    pub fn new(client: Arc<FakeAlertsClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            credentials: Mutex::new(Vec::new()),
        })
    }

    /// API keys of every client built so far
    pub fn api_keys(&self) -> Vec<String> {
        self.credentials
            .lock()
            .expect("factory state poisoned")
            .iter()
            .map(|credentials| credentials.api_key.as_str().to_owned())
            .collect()
    }
}

impl AlertsClientFactory for FakeClientFactory {
    fn build(&self, credentials: &ClientCredentials) -> Result<Arc<dyn AlertsClient>, ClientError> {
        self.credentials
            .lock()
            .expect("factory state poisoned")
            .push(credentials.clone());
        Ok(Arc::clone(&self.client) as Arc<dyn AlertsClient>)
    }
}

// ---------------------------------------------------------------------------
// Cluster side
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClusterState {
    counter: u64,
    policies: BTreeMap<ResourceKey, AlertsPolicy>,
    conditions: HashMap<(ConditionKind, ResourceKey), ChildCondition>,
    secrets: BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>,
    fail_condition_creates: bool,
    failing_condition_names: BTreeSet<String>,
    fail_policy_updates: bool,
}

impl ClusterState {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

/// In-memory API server for the three custom resources and secrets
///
/// Writes through `update_*` ignore status (status subresource semantics);
/// deleting an object with finalizers only marks it; removing the last
/// finalizer of a marked object removes it.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<ClusterState>,
}

fn deletion_timestamp() -> Time {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z"))
        .expect("valid RFC 3339 timestamp")
}

fn has_finalizers(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> bool {
    meta.finalizers.as_ref().is_some_and(|f| !f.is_empty())
}

fn keep_status(mut incoming: ChildCondition, stored: &ChildCondition) -> ChildCondition {
    match (&mut incoming, stored) {
        (ChildCondition::Nrql(new), ChildCondition::Nrql(old)) => new.status.clone_from(&old.status),
        (ChildCondition::Apm(new), ChildCondition::Apm(old)) => new.status.clone_from(&old.status),
        _ => {}
    }
    incoming
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        self.state.lock().expect("store state poisoned")
    }

    /// `kubectl apply`: create or replace the spec, bumping generation on change
    pub fn apply_policy(&self, name: &str, spec: AlertsPolicySpec) -> ResourceKey {
        let key = ResourceKey::new(NAMESPACE, name);
        let mut state = self.state();
        let counter = state.next();
        match state.policies.get_mut(&key) {
            Some(existing) => {
                if existing.spec != spec {
                    existing.spec = spec;
                    existing.metadata.generation = existing.metadata.generation.map(|g| g + 1);
                }
                existing.metadata.resource_version = Some(counter.to_string());
            }
            None => {
                let mut policy = AlertsPolicy::new(name, spec);
                policy.metadata.namespace = Some(NAMESPACE.to_string());
                policy.metadata.uid = Some(format!("uid-{name}"));
                policy.metadata.generation = Some(1);
                policy.metadata.resource_version = Some(counter.to_string());
                state.policies.insert(key.clone(), policy);
            }
        }
        key
    }

    /// `kubectl delete`
    pub fn delete_policy(&self, key: &ResourceKey) {
        let mut state = self.state();
        let remove = match state.policies.get_mut(key) {
            Some(policy) if has_finalizers(&policy.metadata) => {
                policy
                    .metadata
                    .deletion_timestamp
                    .get_or_insert_with(deletion_timestamp);
                false
            }
            Some(_) => true,
            None => false,
        };
        if remove {
            state.policies.remove(key);
        }
    }

    pub fn policy(&self, key: &ResourceKey) -> Option<AlertsPolicy> {
        self.state().policies.get(key).cloned()
    }

    pub fn status(&self, key: &ResourceKey) -> AlertsPolicyStatus {
        self.policy(key)
            .and_then(|policy| policy.status)
            .unwrap_or_default()
    }

    /// Child objects currently stored (including ones marked for deletion)
    pub fn children(&self) -> Vec<ChildCondition> {
        let mut children: Vec<ChildCondition> = self.state().conditions.values().cloned().collect();
        children.sort_by_key(ChildCondition::key);
        children
    }

    /// Keys of children that are marked for deletion
    pub fn deleting_children(&self) -> Vec<(ConditionKind, ResourceKey)> {
        self.children()
            .into_iter()
            .filter(|child| child.metadata().deletion_timestamp.is_some())
            .map(|child| (child.kind(), child.key()))
            .collect()
    }

    /// Remove a child object out of band (finalizers ignored)
    pub fn purge_child(&self, kind: ConditionKind, key: &ResourceKey) {
        self.state().conditions.remove(&(kind, key.clone()));
    }

    pub fn put_child(&self, child: ChildCondition) {
        self.state()
            .conditions
            .insert((child.kind(), child.key()), child);
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, key: &str, value: &str) {
        self.state()
            .secrets
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .insert(key.to_string(), value.as_bytes().to_vec());
    }

    pub fn fail_condition_creates(&self, fail: bool) {
        self.state().fail_condition_creates = fail;
    }

    /// Fail creates of children whose condition carries `name`
    pub fn fail_condition_create_named(&self, name: &str) {
        self.state().failing_condition_names.insert(name.to_string());
    }

    pub fn fail_policy_updates(&self, fail: bool) {
        self.state().fail_policy_updates = fail;
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn get_policy(&self, key: &ResourceKey) -> Result<Option<AlertsPolicy>, StoreError> {
        Ok(self.state().policies.get(key).cloned())
    }

    async fn update_policy(&self, policy: &AlertsPolicy) -> Result<AlertsPolicy, StoreError> {
        let key = ResourceKey::of(policy);
        let mut state = self.state();
        if state.fail_policy_updates {
            return Err(StoreError::Invalid(format!(
                "injected update failure for AlertsPolicy {key}"
            )));
        }
        let counter = state.next();
        let stored = state
            .policies
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("AlertsPolicy {key}")))?;

        if stored.spec != policy.spec {
            stored.spec = policy.spec.clone();
            stored.metadata.generation = stored.metadata.generation.map(|g| g + 1);
        }
        stored.metadata.finalizers.clone_from(&policy.metadata.finalizers);
        stored.metadata.resource_version = Some(counter.to_string());

        let updated = stored.clone();
        if updated.metadata.deletion_timestamp.is_some() && !has_finalizers(&updated.metadata) {
            state.policies.remove(&key);
        }
        Ok(updated)
    }

    async fn update_policy_status(
        &self,
        key: &ResourceKey,
        status: &AlertsPolicyStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let stored = state
            .policies
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("AlertsPolicy {key}")))?;
        stored.status = Some(status.clone());
        Ok(())
    }
}

#[async_trait]
impl ConditionStore for InMemoryStore {
    async fn get_condition(
        &self,
        kind: ConditionKind,
        key: &ResourceKey,
    ) -> Result<Option<ChildCondition>, StoreError> {
        Ok(self.state().conditions.get(&(kind, key.clone())).cloned())
    }

    async fn list_policy_conditions(
        &self,
        kind: ConditionKind,
        namespace: &str,
        policy: &str,
    ) -> Result<Vec<ChildCondition>, StoreError> {
        Ok(self
            .children()
            .into_iter()
            .filter(|child| child.kind() == kind && child.key().namespace == namespace)
            .filter(|child| {
                child
                    .metadata()
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(POLICY_LABEL))
                    .is_some_and(|value| value == policy)
            })
            .collect())
    }

    async fn create_condition(
        &self,
        condition: &ChildCondition,
    ) -> Result<ChildCondition, StoreError> {
        let mut state = self.state();
        let name = condition.spec().name().to_string();
        if state.fail_condition_creates || state.failing_condition_names.contains(&name) {
            return Err(StoreError::Invalid(format!(
                "injected create failure for '{name}'"
            )));
        }
        let counter = state.next();
        let mut created = condition.clone();
        let meta = created.metadata_mut();
        let prefix = meta
            .generate_name
            .clone()
            .ok_or_else(|| StoreError::Invalid("generateName is required".to_string()))?;
        meta.name = Some(format!("{prefix}{counter}"));
        meta.uid = Some(format!("uid-child-{counter}"));
        meta.generation = Some(1);
        meta.resource_version = Some(counter.to_string());
        match &mut created {
            ChildCondition::Nrql(object) => object.status = None,
            ChildCondition::Apm(object) => object.status = None,
        }
        state
            .conditions
            .insert((created.kind(), created.key()), created.clone());
        Ok(created)
    }

    async fn update_condition(
        &self,
        condition: &ChildCondition,
    ) -> Result<ChildCondition, StoreError> {
        let id = (condition.kind(), condition.key());
        let mut state = self.state();
        let counter = state.next();
        let stored = state
            .conditions
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", id.0.resource_kind(), id.1)))?;

        let mut updated = keep_status(condition.clone(), stored);
        let deletion = stored.metadata().deletion_timestamp.clone();
        let generation = stored.metadata().generation;
        let spec_changed = stored.spec() != updated.spec();
        let meta = updated.metadata_mut();
        meta.deletion_timestamp = deletion;
        meta.generation = if spec_changed {
            generation.map(|g| g + 1)
        } else {
            generation
        };
        meta.resource_version = Some(counter.to_string());

        if updated.metadata().deletion_timestamp.is_some() && !has_finalizers(updated.metadata()) {
            state.conditions.remove(&id);
        } else {
            state.conditions.insert(id, updated.clone());
        }
        Ok(updated)
    }

    async fn update_condition_status(&self, condition: &ChildCondition) -> Result<(), StoreError> {
        let id = (condition.kind(), condition.key());
        let mut state = self.state();
        let stored = state
            .conditions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", id.0.resource_kind(), id.1)))?;
        match (stored, condition) {
            (ChildCondition::Nrql(stored), ChildCondition::Nrql(new)) => {
                stored.status.clone_from(&new.status);
            }
            (ChildCondition::Apm(stored), ChildCondition::Apm(new)) => {
                stored.status.clone_from(&new.status);
            }
            _ => return Err(StoreError::Invalid("kind mismatch".to_string())),
        }
        Ok(())
    }

    async fn delete_condition(
        &self,
        kind: ConditionKind,
        key: &ResourceKey,
    ) -> Result<(), StoreError> {
        let id = (kind, key.clone());
        let mut state = self.state();
        let remove = match state.conditions.get_mut(&id) {
            Some(child) if has_finalizers(child.metadata()) => {
                child
                    .metadata_mut()
                    .deletion_timestamp
                    .get_or_insert_with(deletion_timestamp);
                false
            }
            Some(_) => true,
            None => false,
        };
        if remove {
            state.conditions.remove(&id);
        }
        Ok(())
    }
}

#[async_trait]
impl SecretSource for InMemoryStore {
    async fn read_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError> {
        Ok(self
            .state()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Wiring and builders
// ---------------------------------------------------------------------------

/// Everything one test needs
#[derive(Debug)]
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub remote: Arc<FakeAlertsClient>,
    pub factory: Arc<FakeClientFactory>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let remote = FakeAlertsClient::new();
        let factory = FakeClientFactory::new(Arc::clone(&remote));
        let reconciler = Reconciler::new(
            Arc::clone(&store) as Arc<dyn PolicyStore>,
            Arc::clone(&store) as Arc<dyn ConditionStore>,
            Arc::clone(&store) as Arc<dyn SecretSource>,
            Arc::clone(&factory) as Arc<dyn AlertsClientFactory>,
            Arc::new(ControllerConfig::default()),
        );
        Self {
            store,
            remote,
            factory,
            reconciler,
        }
    }

    /// Reconcile every child object once, like the child controllers would
    pub async fn reconcile_children(&self) {
        for child in self.store.children() {
            alerts_policy_controller::controller::reconciler::reconcile_condition(
                &self.reconciler,
                child.kind(),
                &child.key(),
            )
            .await
            .expect("child reconcile failed");
        }
    }

    /// Policy pass followed by one pass over every child
    pub async fn converge(&self, key: &ResourceKey) {
        alerts_policy_controller::controller::reconciler::reconcile_policy(&self.reconciler, key)
            .await
            .expect("policy reconcile failed");
        self.reconcile_children().await;
    }
}

pub fn term(threshold: &str) -> AlertTerm {
    AlertTerm {
        duration: "5".to_string(),
        operator: TermOperator::Above,
        priority: TermPriority::Critical,
        threshold: threshold.to_string(),
        time_function: TimeFunction::All,
    }
}

pub fn base(name: &str, threshold: &str) -> ConditionBase {
    ConditionBase {
        name: name.to_string(),
        enabled: true,
        terms: vec![term(threshold)],
        ..ConditionBase::default()
    }
}

pub fn nrql(name: &str, threshold: &str) -> PolicyCondition {
    PolicyCondition::new(ConditionSpec::Nrql(NrqlConditionSpec {
        base: base(name, threshold),
        nrql: NrqlQuery {
            query: "SELECT count(*) FROM Transaction WHERE error IS true".to_string(),
            since_value: "3".to_string(),
        },
        value_function: Some("single_value".to_string()),
        ..NrqlConditionSpec::default()
    }))
}

pub fn apm(name: &str, threshold: &str) -> PolicyCondition {
    PolicyCondition::new(ConditionSpec::Apm(ApmConditionSpec {
        base: base(name, threshold),
        condition_type: "apm_app_metric".to_string(),
        entities: vec!["5678".to_string()],
        metric: "apdex".to_string(),
        condition_scope: Some("application".to_string()),
        ..ApmConditionSpec::default()
    }))
}

pub fn policy_spec(name: &str, conditions: Vec<PolicyCondition>) -> AlertsPolicySpec {
    AlertsPolicySpec {
        name: name.to_string(),
        api_key: Some(API_KEY.to_string()),
        conditions,
        ..AlertsPolicySpec::default()
    }
}

pub fn secret_ref(name: &str, key_name: &str) -> SecretReference {
    SecretReference {
        name: name.to_string(),
        namespace: None,
        key_name: key_name.to_string(),
    }
}

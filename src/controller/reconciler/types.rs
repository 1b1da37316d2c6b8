//! # Types
//!
//! Reconciler context and the error taxonomy surfaced to the controllers.

use crate::config::SharedControllerConfig;
use crate::controller::backoff::BackoffTracker;
use crate::controller::reconciler::errors::CollectedErrors;
use crate::provider::{AlertsClientFactory, ClientError, NewRelicClientFactory};
use crate::store::{ConditionStore, KubeStore, PolicyStore, SecretSource, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Errors of one reconcile pass
///
/// Every variant is retryable: the error policy requeues with backoff.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("credential resolution failed: {0}")]
    Credentials(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("failed to create {what}: {source}")]
    RemoteCreate {
        what: String,
        #[source]
        source: ClientError,
    },
    #[error("failed to update {what}: {source}")]
    RemoteUpdate {
        what: String,
        #[source]
        source: ClientError,
    },
    #[error("failed to delete {what}: {source}")]
    RemoteDelete {
        what: String,
        #[source]
        source: ClientError,
    },
    #[error("failed to look up {what}: {source}")]
    RemoteLookup {
        what: String,
        #[source]
        source: ClientError,
    },
    #[error("condition synchronization failed:\n{0}")]
    ConditionSync(CollectedErrors),
    #[error("channel synchronization failed:\n{0}")]
    ChannelSync(CollectedErrors),
    #[error("condition '{condition}': {source}")]
    Child {
        condition: String,
        #[source]
        source: StoreError,
    },
    #[error("teardown incomplete:\n{0}")]
    Teardown(CollectedErrors),
    #[error("resource store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcilerError {
    /// Reason recorded on the `Ready=False` status condition
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Credentials(_) => "CredentialsUnavailable",
            ReconcilerError::Configuration(_) => "InvalidConfiguration",
            ReconcilerError::RemoteCreate { .. } => "RemoteCreateFailed",
            ReconcilerError::RemoteUpdate { .. } => "RemoteUpdateFailed",
            ReconcilerError::RemoteDelete { .. } => "RemoteDeleteFailed",
            ReconcilerError::RemoteLookup { .. } => "RemoteLookupFailed",
            ReconcilerError::ConditionSync(_) => "ConditionSyncFailed",
            ReconcilerError::ChannelSync(_) => "ChannelSyncFailed",
            ReconcilerError::Child { .. } => "ChildObjectFailed",
            ReconcilerError::Teardown(_) => "TeardownFailed",
            ReconcilerError::Store(_) => "StoreError",
        }
    }

    pub(crate) fn create(what: impl Into<String>, source: ClientError) -> Self {
        ReconcilerError::RemoteCreate {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn update(what: impl Into<String>, source: ClientError) -> Self {
        ReconcilerError::RemoteUpdate {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn delete(what: impl Into<String>, source: ClientError) -> Self {
        ReconcilerError::RemoteDelete {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn lookup(what: impl Into<String>, source: ClientError) -> Self {
        ReconcilerError::RemoteLookup {
            what: what.into(),
            source,
        }
    }
}

/// Shared context of the three controllers
///
/// Holds no per-resource data besides the backoff tracker; every remote
/// client is built per pass from the factory.
#[derive(Clone)]
pub struct Reconciler {
    pub policies: Arc<dyn PolicyStore>,
    pub conditions: Arc<dyn ConditionStore>,
    pub secrets: Arc<dyn SecretSource>,
    pub clients: Arc<dyn AlertsClientFactory>,
    pub config: SharedControllerConfig,
    // Backoff state per resource (identified by kind:namespace/name)
    pub backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        conditions: Arc<dyn ConditionStore>,
        secrets: Arc<dyn SecretSource>,
        clients: Arc<dyn AlertsClientFactory>,
        config: SharedControllerConfig,
    ) -> Self {
        let backoff = BackoffTracker::new(config.backoff_min_minutes, config.backoff_max_minutes);
        Self {
            policies,
            conditions,
            secrets,
            clients,
            config,
            backoff,
        }
    }

    /// Context wired to the cluster and the New Relic REST API
    #[must_use]
    pub fn from_kube(client: kube::Client, config: SharedControllerConfig) -> Self {
        let store = Arc::new(KubeStore::new(client));
        let clients = Arc::new(NewRelicClientFactory::from_config(&config));
        Self::new(
            Arc::clone(&store) as Arc<dyn PolicyStore>,
            Arc::clone(&store) as Arc<dyn ConditionStore>,
            store,
            clients,
            config,
        )
    }
}

//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use alerts_policy_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (`AlertsPolicy`, `ConditionSpec`, etc.)
//! - The remote client and store traits
//! - Reconciler entry points and error types
//! - Config types

// CRD types - most commonly used
pub use crate::crd::*;

// Remote client seam
pub use crate::provider::{
    AlertsClient, AlertsClientFactory, ClientCredentials, ClientError, NewRelicClientFactory,
    RemoteChannel, RemoteCondition, RemotePolicy,
};

// Resource store seam
pub use crate::store::{
    ChildCondition, ConditionStore, KubeStore, PolicyStore, SecretSource, StoreError,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile_condition, reconcile_policy, ConditionOutcome, PolicyOutcome, Reconciler,
    ReconcilerError,
};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, ServerConfig, SharedControllerConfig};

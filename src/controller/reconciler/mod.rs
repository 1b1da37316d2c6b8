//! # Reconciler
//!
//! Reconciliation logic for `AlertsPolicy` resources and their child conditions.
//!
//! The policy reconciler:
//! - Resolves the New Relic API key (inline or from a Secret)
//! - Adopts, creates or updates the remote alert policy
//! - Converges child `AlertsNrqlCondition` / `AlertsApmCondition` objects
//! - Attaches and detaches notification channels
//! - Records the converged spec as the baseline for the next pass
//!
//! The child reconciler pushes each child object to New Relic and deletes
//! the remote condition when the child is deleted.

pub mod channels;
pub mod child;
pub mod conditions;
pub mod credentials;
pub mod errors;
pub mod fingerprint;
pub mod reconcile;
pub mod status;
pub mod teardown;
pub mod types;

pub use channels::{diff_channels, reconcile_channels, ChannelDiff, ChannelDirectory};
pub use child::{reconcile_condition, ConditionOutcome};
pub use conditions::{ConditionSynchronizer, InheritedFields};
pub use credentials::resolve_api_key;
pub use errors::{CollectedErrors, ErrorCollector};
pub use fingerprint::{find_duplicates, fingerprint, Fingerprint};
pub use reconcile::{reconcile_policy, PolicyOutcome};
pub use types::{Reconciler, ReconcilerError};

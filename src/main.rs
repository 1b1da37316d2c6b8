//! # Alerts Policy Controller
//!
//! A Kubernetes controller that syncs `AlertsPolicy` resources to New Relic.
//!
//! ## Overview
//!
//! 1. **Policies** - creates, adopts or updates the remote alert policy
//! 2. **Conditions** - materializes each declared condition as an `AlertsNrqlCondition`
//!    or `AlertsApmCondition` child object, which is pushed to New Relic by its own controller
//! 3. **Channels** - attaches and detaches notification channels
//! 4. **Teardown** - finalizers remove remote objects when resources are deleted
//!
//! ## Features
//!
//! - **Multi-namespace**: Watches resources across all namespaces
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use alerts_policy_controller::runtime::{initialize, run_watch_loop};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init).await
}

//! Alerts Policy Controller Library
//!
//! Kubernetes operator that keeps New Relic alert policies, their conditions
//! and notification channel attachments in sync with `AlertsPolicy` resources.
//!
//! ## Quick Start
//!
//! ```rust
//! use alerts_policy_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod store;

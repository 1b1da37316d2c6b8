//! # Controller
//!
//! Core controller modules for the Alerts Policy Controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `reconciler`: Policy and child condition reconciliation
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;

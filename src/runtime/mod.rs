//! # Runtime
//!
//! Process startup and the controller watch loops.
//!
//! - `initialization`: crypto provider, tracing, metrics, probe server, Kubernetes client
//! - `watch_loop`: the three controllers (policies, NRQL conditions, APM conditions)
//! - `error_policy`: requeue with per-resource Fibonacci backoff

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;

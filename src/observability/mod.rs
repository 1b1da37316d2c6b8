//! # Observability
//!
//! Observability modules for metrics and tracing.
//!
//! - `metrics`: Prometheus metrics collection
//! - `tracing_setup`: subscriber initialization from `LOG_LEVEL` / `LOG_FORMAT`

pub mod metrics;
pub mod tracing_setup;

// Re-export for convenience
pub use metrics::*;
pub use tracing_setup::init_tracing;

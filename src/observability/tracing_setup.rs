//! # Tracing Setup
//!
//! Installs the global `tracing` subscriber.
//!
//! `RUST_LOG` wins when set; otherwise the filter is built from `LOG_LEVEL`.
//! `LOG_FORMAT=json` (default) emits one JSON object per line, `text` the
//! human-readable formatter.

use crate::config::{ControllerConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Build the env filter from `RUST_LOG`, falling back to `LOG_LEVEL`
fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = log_level.to_lowercase();
        EnvFilter::new(format!(
            "alerts_policy_controller={level},kube_runtime=warn,tower_http=warn,info"
        ))
    })
}

/// Initialize the global subscriber
///
/// Returns `false` if a subscriber was already installed (tests, repeated init).
pub fn init_tracing(config: &ControllerConfig) -> bool {
    let filter = build_filter(&config.log_level);
    let result = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    result.is_ok()
}

//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables (populated from ConfigMap).
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Environment variables are populated from a ConfigMap using `envFrom` in the deployment.

mod controller;
mod server;

pub use controller::{ControllerConfig, LogFormat};
pub use server::ServerConfig;

use std::sync::Arc;

/// Controller configuration shared between the watch loops and the reconcilers
pub type SharedControllerConfig = Arc<ControllerConfig>;

/// Load configuration from environment variables with defaults
#[must_use]
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read a variable through `lookup` or return the default value
pub(crate) fn var_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a variable through `lookup` as boolean or return default
pub(crate) fn var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read a variable through `lookup` as string or return default
pub(crate) fn var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Environment lookup used by the `from_env` constructors
pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_lookup, var_or_default, var_or_default_bool, var_or_default_str};
use crate::constants::{
    DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_MIN_MINUTES, DEFAULT_REMOTE_TIMEOUT_SECS,
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::time::Duration;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Fibonacci backoff floor for failed reconciliations (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff cap for failed reconciliations (minutes)
    pub backoff_max_minutes: u64,
    /// Requeue interval after a successful pass (seconds). 0 waits for the next change.
    pub resync_interval_secs: u64,
    /// Delay before restarting a watch stream that ended (seconds)
    pub watch_restart_delay_secs: u64,
    /// Maximum concurrent reconciliations per controller
    pub max_concurrent_reconciliations: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Enable metrics collection
    pub enable_metrics: bool,
    /// Overrides the regional New Relic endpoint (mock servers, proxies)
    pub new_relic_api_endpoint: Option<String>,
    /// Timeout for each New Relic API call (seconds)
    pub remote_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Load configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backoff_min_minutes =
            var_or_default(&lookup, "BACKOFF_MIN_MINUTES", DEFAULT_BACKOFF_MIN_MINUTES).max(1);
        let backoff_max_minutes =
            var_or_default(&lookup, "BACKOFF_MAX_MINUTES", DEFAULT_BACKOFF_MAX_MINUTES)
                .max(backoff_min_minutes);

        Self {
            backoff_min_minutes,
            backoff_max_minutes,
            resync_interval_secs: var_or_default(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            watch_restart_delay_secs: var_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            max_concurrent_reconciliations: var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                10,
            ),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: LogFormat::parse(&var_or_default_str(&lookup, "LOG_FORMAT", "json")),
            enable_metrics: var_or_default_bool(&lookup, "ENABLE_METRICS", true),
            new_relic_api_endpoint: lookup("NEW_RELIC_API_ENDPOINT")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),
            remote_timeout_secs: var_or_default(
                &lookup,
                "REMOTE_TIMEOUT_SECS",
                DEFAULT_REMOTE_TIMEOUT_SECS,
            ),
        }
    }

    /// Requeue interval after success, `None` meaning wait for the next change
    #[must_use]
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

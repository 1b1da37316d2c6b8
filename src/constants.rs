//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Field manager / controller name used for patches and owner references
pub const CONTROLLER_NAME: &str = "alerts-policy-controller";

/// Finalizer guarding remote policy teardown
pub const POLICY_FINALIZER: &str = "nr.k8s.newrelic.com/policy-cleanup";

/// Finalizer guarding remote condition teardown
pub const CONDITION_FINALIZER: &str = "nr.k8s.newrelic.com/condition-cleanup";

/// Label placed on child condition resources naming their parent policy
pub const POLICY_LABEL: &str = "nr.k8s.newrelic.com/policy";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default Fibonacci backoff floor (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Default Fibonacci backoff cap (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default periodic resync interval after a successful pass (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default timeout applied to every New Relic API call (seconds)
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// New Relic REST API base URL, US region
pub const NEW_RELIC_US_ENDPOINT: &str = "https://api.newrelic.com";

/// New Relic REST API base URL, EU region
pub const NEW_RELIC_EU_ENDPOINT: &str = "https://api.eu.newrelic.com";

//! # Fibonacci Backoff
//!
//! Requeue delays for failed reconciliations, tracked per resource.
//!
//! Delays grow along the Fibonacci sequence in whole minutes and are capped:
//! with the defaults (1, 10) a resource that keeps failing is retried after
//! 1m, 1m, 2m, 3m, 5m, 8m, then every 10m. A successful pass resets it.
//!
//! ```rust
//! use alerts_policy_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fibonacci backoff calculator working in minutes
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// `min_minutes` seeds the sequence, `max_minutes` caps it
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes: max_minutes.max(min_minutes),
        }
    }

    /// Return the current delay in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let seconds = self.current_minutes * 60;
        let next = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next.min(self.max_minutes);
        seconds
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Per-resource backoff states keyed by `kind:namespace/name`
///
/// Cloned handles share the same map.
#[derive(Debug, Clone)]
pub struct BackoffTracker {
    min_minutes: u64,
    max_minutes: u64,
    states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl BackoffTracker {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            max_minutes,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a failure and return the delay before the next attempt
    ///
    /// Also returns the number of consecutive failures so far.
    pub fn record_failure(&self, resource_key: &str) -> (Duration, u32) {
        let Ok(mut states) = self.states.lock() else {
            return (Duration::from_secs(self.min_minutes * 60), 1);
        };
        let state = states
            .entry(resource_key.to_string())
            .or_insert_with(|| BackoffState::new(self.min_minutes, self.max_minutes));
        state.error_count += 1;
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Clear the state after a successful pass
    ///
    /// Returns `true` if the resource was backing off.
    pub fn reset(&self, resource_key: &str) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };
        states
            .remove(resource_key)
            .is_some_and(|state| state.error_count > 0)
    }
}

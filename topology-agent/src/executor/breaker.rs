//! Per-tool circuit breaker registry.
//!
//! In-memory, process-local: tool name → (consecutive failures, tripped-at).
//! After `failure_threshold` consecutive failures the breaker opens and calls
//! are skipped for `recovery_timeout`; then one trial call is admitted
//! (half-open) with the failure count re-armed at threshold − 1, so a failed
//! trial re-opens immediately and a success closes the breaker.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, Default)]
struct BreakerRecord {
    failures: u32,
    tripped_at: Option<Instant>,
}

/// Breaker registry shared by all requests in the process.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: DashMap<String, BreakerRecord>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            state: DashMap::new(),
        }
    }

    /// Returns true if the circuit is open (calls must be skipped).
    ///
    /// After the recovery timeout this clears the trip record and admits one
    /// trial call; the failure count is left at threshold − 1.
    pub fn is_open(&self, tool_name: &str) -> bool {
        let Some(mut record) = self.state.get_mut(tool_name) else {
            return false;
        };
        let Some(tripped_at) = record.tripped_at else {
            return false;
        };
        if tripped_at.elapsed() > self.recovery_timeout {
            info!(tool = tool_name, "circuit_breaker_half_open");
            record.tripped_at = None;
            record.failures = self.failure_threshold - 1;
            return false;
        }
        true
    }

    /// Increments the failure count and trips the circuit at the threshold.
    pub fn record_failure(&self, tool_name: &str) {
        let mut record = self.state.entry(tool_name.to_string()).or_default();
        record.failures += 1;
        if record.failures >= self.failure_threshold {
            if record.tripped_at.is_none() {
                error!(
                    tool = tool_name,
                    failures = record.failures,
                    "circuit_breaker_tripped"
                );
            }
            record.tripped_at = Some(Instant::now());
        }
    }

    /// Resets the failure count; closes the breaker if it was open.
    pub fn record_success(&self, tool_name: &str) {
        if let Some(mut record) = self.state.get_mut(tool_name) {
            record.failures = 0;
            if record.tripped_at.take().is_some() {
                info!(tool = tool_name, "circuit_breaker_closed");
            }
        }
    }
}

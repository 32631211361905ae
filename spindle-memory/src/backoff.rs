use std::time::Duration;

/// Exponential delay applied before a retryable error is reported as
/// handled.
///
/// The attempt number counts `on_error` calls on one transaction, so the
/// delay grows while the same transaction keeps failing and starts over for
/// a fresh one. `Database::transact` creates a new transaction for every
/// attempt, so its retries always wait `initial_backoff_ms` and never grow.
/// Only callers that retry on the same transaction see the exponential
/// delay.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier applied to backoff after each retry
    pub backoff_multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64, backoff_multiplier: f64) -> Self {
        Self {
            initial_backoff_ms,
            max_backoff_ms,
            backoff_multiplier,
        }
    }

    /// Returns a policy that never waits.
    pub fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Returns a policy with short delays, suited to tests.
    pub fn fast() -> Self {
        Self {
            initial_backoff_ms: 1,
            max_backoff_ms: 20,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculates the backoff duration for a given attempt number (0-indexed).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt.min(64) as i32))
            .min(self.max_backoff_ms as f64) as u64;
        Duration::from_millis(backoff_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err("max_backoff_ms must not be below initial_backoff_ms".to_string());
        }
        Ok(())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 10,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

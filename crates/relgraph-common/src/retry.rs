//! Exponential-backoff retry configuration shared by every network-facing
//! adapter (source database, graph store).

use std::time::Duration;

/// Retry configuration for connection establishment.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (e.g. 2.0 doubles the delay each retry).
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A retry config with no retries (immediate failure).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(self.initial_delay_ms);
        }
        let delay_ms = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((delay_ms as u64).min(self.max_delay_ms))
    }
}

/// Mandatory per-operation timeouts: connection, statement, and query
/// timeouts must all be set and nonzero.
#[derive(Debug, Clone)]
pub struct OperationTimeouts {
    pub connect_secs: u64,
    pub statement_secs: u64,
    pub query_secs: u64,
}

impl OperationTimeouts {
    /// Validates that none of the timeouts are zero; a zero timeout is a
    /// fatal config error.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_secs == 0 || self.statement_secs == 0 || self.query_secs == 0 {
            return Err(
                "connection, statement, and query timeouts are mandatory and must be nonzero"
                    .to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_backs_off_and_caps() {
        let cfg = RetryConfig {
            max_retries: 6,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(cfg.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(cfg.delay_for_attempt(6), Duration::from_millis(5_000));
    }

    #[test]
    fn no_retry_has_zero_attempts() {
        assert_eq!(RetryConfig::no_retry().max_retries, 0);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let t = OperationTimeouts {
            connect_secs: 30,
            statement_secs: 0,
            query_secs: 30,
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn nonzero_timeouts_are_accepted() {
        let t = OperationTimeouts {
            connect_secs: 30,
            statement_secs: 30,
            query_secs: 30,
        };
        assert!(t.validate().is_ok());
    }
}

use std::time::Duration;

use rand::Rng;
use rusqlite::ErrorCode;

use crate::config::EngineConfig;

/// Bounded exponential backoff used while waiting for the write lock.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_write_attempts.max(1),
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Delay before retrying after `attempt` failures (1-indexed).
    ///
    /// `base * 2^(attempt - 1)`, capped at `max_delay`, with up to 50% jitter
    /// subtracted so competing writers spread out.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(1u32 << exponent);
        let capped = raw.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        capped.mul_f64(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::with_data_dir("."))
    }
}

/// True for lock contention errors that are worth retrying.
#[must_use]
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(60),
        }
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = policy();
        for attempt in 1..=10 {
            let delay = policy.delay_for(attempt);
            assert!(delay <= Duration::from_millis(60));
        }
        // attempt 3 is 40ms before jitter, so never below 20ms
        assert!(policy.delay_for(3) >= Duration::from_millis(20));
    }

    #[test]
    fn test_busy_classification() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(is_busy(&busy));
        assert!(!is_busy(&rusqlite::Error::QueryReturnedNoRows));
    }
}

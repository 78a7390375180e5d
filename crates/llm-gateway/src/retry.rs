//! Retry and circuit-breaker tuning for the gateway's request execution
//! loop.

use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_delays: Vec<Duration>,
    pub request_timeout: Duration,
    pub cb_failure_threshold: u32,
    pub cb_exclusion_duration: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_delays: vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)],
            request_timeout: Duration::from_secs(100),
            cb_failure_threshold: 3,
            cb_exclusion_duration: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn validated(self) -> Result<Self> {
        if self.request_timeout.is_zero() {
            return Err(Error::Message("request_timeout must be > 0".into()));
        }
        if self.cb_failure_threshold == 0 {
            return Err(Error::Message("cb_failure_threshold must be >= 1".into()));
        }
        if self.cb_exclusion_duration.is_zero() {
            return Err(Error::Message("cb_exclusion_duration must be > 0".into()));
        }
        Ok(self)
    }

    /// Delay before retry attempt `attempt` (0-indexed). Attempts past the
    /// configured delay list reuse the last delay.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_delays
            .get(attempt as usize)
            .copied()
            .or_else(|| self.backoff_delays.last().copied())
            .unwrap_or(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(RetryPolicy::default().validated().is_ok());
    }

    #[test]
    fn rejects_zero_timeout() {
        let policy = RetryPolicy { request_timeout: Duration::ZERO, ..RetryPolicy::default() };
        assert!(policy.validated().is_err());
    }

    #[test]
    fn backoff_reuses_last_delay_past_configured_list() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(4));
    }
}

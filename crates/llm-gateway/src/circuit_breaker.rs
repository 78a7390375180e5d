//! Per-model failure tracking. A model that fails
//! [`RetryPolicy::cb_failure_threshold`](crate::retry::RetryPolicy) times in a
//! row gets excluded by the router until the exclusion window elapses.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct CircuitBreaker {
    failure_threshold: u32,
    exclusion_duration: Duration,
    state: Mutex<HashMap<String, ModelState>>,
}

struct ModelState {
    failures: u32,
    excluded_until: Option<Instant>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, exclusion_duration: Duration) -> Self {
        Self { failure_threshold, exclusion_duration, state: Mutex::new(HashMap::new()) }
    }

    /// Records a failure for `model_name`, tripping the breaker if the
    /// threshold is reached. Returns `true` if this call tripped it.
    pub fn record_failure(&self, model_name: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let entry = state.entry(model_name.to_string()).or_insert(ModelState { failures: 0, excluded_until: None });
        entry.failures += 1;

        if entry.failures >= self.failure_threshold {
            entry.excluded_until = Some(Instant::now() + self.exclusion_duration);
            tracing::warn!(model = model_name, failures = entry.failures, "circuit_breaker_triggered");
            true
        } else {
            false
        }
    }

    pub fn record_success(&self, model_name: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = state.get_mut(model_name) {
            entry.failures = 0;
        }
    }

    #[must_use]
    pub fn is_excluded(&self, model_name: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = state.get_mut(model_name) else {
            return false;
        };
        let Some(excluded_until) = entry.excluded_until else {
            return false;
        };
        if Instant::now() >= excluded_until {
            entry.excluded_until = None;
            tracing::info!(model = model_name, "circuit_breaker_reset");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.record_failure("model-a"));
        assert!(!breaker.record_failure("model-a"));
        assert!(breaker.record_failure("model-a"));
        assert!(breaker.is_excluded("model-a"));
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure("model-a");
        breaker.record_failure("model-a");
        breaker.record_success("model-a");
        assert!(!breaker.record_failure("model-a"));
        assert!(!breaker.is_excluded("model-a"));
    }

    #[test]
    fn unknown_model_is_not_excluded() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.is_excluded("never-seen"));
    }

    #[test]
    fn exclusion_expires_after_window() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(5));
        breaker.record_failure("model-a");
        assert!(breaker.is_excluded("model-a"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(!breaker.is_excluded("model-a"));
    }
}

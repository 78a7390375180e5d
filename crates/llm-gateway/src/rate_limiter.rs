//! Token-bucket rate limiter shared across every request the gateway issues.
//!
//! One global limit applies across the whole swarm, not per-agent — refill
//! is a function of wall-clock time, not request count, so bursts up to
//! `burst` drain immediately and then trickle at `rpm / 60` tokens/sec.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    rpm: u32,
    burst: u32,
    bucket: Mutex<Bucket>,
    waiting_count: AtomicUsize,
}

impl RateLimiter {
    pub fn new(rpm: u32, burst: u32) -> Result<Self> {
        if rpm == 0 {
            return Err(Error::Message("rpm must be positive".into()));
        }
        if burst == 0 {
            return Err(Error::Message("burst must be at least 1".into()));
        }
        Ok(Self {
            rpm,
            burst,
            bucket: Mutex::new(Bucket { tokens: f64::from(burst), last_refill: Instant::now() }),
            waiting_count: AtomicUsize::new(0),
        })
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let tokens_to_add = elapsed * (f64::from(self.rpm) / 60.0);
        if tokens_to_add > 0.0 {
            bucket.tokens = (bucket.tokens + tokens_to_add).min(f64::from(self.burst));
            bucket.last_refill = now;
        }
    }

    /// Blocks until a token is available, or until `timeout` elapses. `None`
    /// blocks indefinitely. Returns `false` only on timeout expiry.
    pub async fn acquire(&self, timeout: Option<Duration>) -> bool {
        let start = Instant::now();
        let time_per_token = Duration::from_secs_f64(60.0 / f64::from(self.rpm));

        loop {
            {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return true;
                }
            }

            let sleep_for = match timeout {
                Some(timeout) => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        return false;
                    }
                    (timeout - elapsed).min(time_per_token)
                }
                None => time_per_token,
            };

            self.waiting_count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(sleep_for).await;
            self.waiting_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub async fn try_acquire(&self) -> bool {
        self.acquire(Some(Duration::ZERO)).await
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.waiting_count.load(Ordering::SeqCst)
    }

    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }

    #[must_use]
    pub fn requests_per_minute(&self) -> u32 {
        self.rpm
    }

    #[must_use]
    pub fn burst_limit(&self) -> u32 {
        self.burst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_tokens_acquire_immediately() {
        let limiter = RateLimiter::new(60, 3).expect("valid limiter");
        for _ in 0..3 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn rejects_non_positive_config() {
        assert!(RateLimiter::new(0, 5).is_err());
        assert!(RateLimiter::new(30, 0).is_err());
    }

    #[tokio::test]
    async fn acquire_times_out_when_exhausted() {
        let limiter = RateLimiter::new(60, 1).expect("valid limiter");
        assert!(limiter.try_acquire().await);
        assert!(!limiter.acquire(Some(Duration::from_millis(5))).await);
    }

    #[tokio::test]
    async fn available_tokens_refills_over_time() {
        let limiter = RateLimiter::new(6000, 1).expect("valid limiter");
        assert!(limiter.try_acquire().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(limiter.available_tokens().await >= 1.0);
    }
}

//! Top-level orchestration: every Director and Agent completion request in
//! the daemon flows through one [`LLMGateway`], which wires together the
//! rate limiter, priority queue, router, circuit breaker, and retry policy.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cyberred_metrics::llm_gateway as metric;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{Error, Result};
use crate::priority_queue::{LLMPriorityQueue, QueuedRequest};
use crate::provider::{LLMRequest, LLMResponse};
use crate::retry::RetryPolicy;
use crate::router::ModelRouter;
use crate::rate_limiter::RateLimiter;

#[derive(Default)]
struct Metrics {
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_retries: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Centralizes rate limiting, model routing, and priority queue management.
/// All agent and Director LLM requests flow through this gateway.
pub struct LLMGateway {
    rate_limiter: Arc<RateLimiter>,
    router: Arc<ModelRouter>,
    queue: Arc<LLMPriorityQueue>,
    retry_policy: RetryPolicy,
    circuit_breaker: Arc<CircuitBreaker>,
    metrics: Metrics,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LLMGateway {
    #[must_use]
    pub fn new(rate_limiter: Arc<RateLimiter>, router: Arc<ModelRouter>, queue: Arc<LLMPriorityQueue>, retry_policy: RetryPolicy) -> Arc<Self> {
        let circuit_breaker = Arc::new(CircuitBreaker::new(retry_policy.cb_failure_threshold, retry_policy.cb_exclusion_duration));
        let gateway = Arc::new(Self {
            rate_limiter,
            router: Arc::clone(&router),
            queue,
            retry_policy,
            circuit_breaker: Arc::clone(&circuit_breaker),
            metrics: Metrics::default(),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        });
        router.set_exclusion_checker(move |model| circuit_breaker.is_excluded(model));
        gateway
    }

    /// Submits a Director request, which drains ahead of all Agent requests.
    pub async fn director_complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        let rx = self.queue.enqueue_director(request).await;
        rx.await.map_err(|_| Error::Message("gateway worker dropped the request".into()))?
    }

    /// Submits an Agent request at normal priority.
    pub async fn agent_complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        let rx = self.queue.enqueue_agent(request).await;
        rx.await.map_err(|_| Error::Message("gateway worker dropped the request".into()))?
    }

    /// Bypasses the queue, retry policy, and circuit breaker entirely: calls
    /// the Standard-tier provider directly under a short fixed timeout, and
    /// falls back to a best-effort placeholder string on any failure rather
    /// than propagating an error. Never used for Director/Agent traffic —
    /// this is a separate path for callers that accept lower reliability in
    /// exchange for not waiting on the priority queue.
    pub async fn quick_complete(&self, prompt: impl Into<String>) -> String {
        const QUICK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
        const FALLBACK: &str = "quick_complete unavailable, try again";

        let prompt = prompt.into();
        let provider = match self.router.select_model(crate::router::TaskComplexity::Standard) {
            Ok(provider) => provider,
            Err(error) => {
                tracing::warn!(error = %error, "quick_complete_no_provider");
                return FALLBACK.to_string();
            }
        };

        let request = match LLMRequest::new(prompt, provider.model_name()) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(error = %error, "quick_complete_invalid_request");
                return FALLBACK.to_string();
            }
        };

        match tokio::time::timeout(QUICK_TIMEOUT, provider.complete(&request)).await {
            Ok(Ok(response)) => response.content,
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "quick_complete_failed");
                FALLBACK.to_string()
            }
            Err(_elapsed) => {
                tracing::warn!("quick_complete_timed_out");
                FALLBACK.to_string()
            }
        }
    }

    /// Starts the background worker that drains the priority queue. Safe to
    /// call once; a second call is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("gateway_already_running");
            return;
        }
        let gateway = Arc::clone(self);
        let handle = tokio::spawn(async move { gateway.process_requests().await });
        *self.worker.lock().await = Some(handle);
        tracing::info!("gateway_started");
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!("gateway_stopped");
    }

    async fn process_requests(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let queued = match self.queue.dequeue(std::time::Duration::from_secs(1)).await {
                Ok(queued) => queued,
                Err(_) => continue,
            };
            self.handle_one(queued).await;
        }
    }

    async fn handle_one(&self, queued: QueuedRequest) {
        let start = Instant::now();
        let request = queued.request.clone();

        cyberred_metrics::counter!(metric::REQUESTS_TOTAL).increment(1);
        cyberred_metrics::gauge!(metric::QUEUE_DEPTH).set(self.queue_depth() as f64);

        match self.execute_with_retry(&request).await {
            Ok(response) => {
                let elapsed = start.elapsed();
                self.metrics.total_requests.fetch_add(1, Ordering::SeqCst);
                self.metrics.total_successes.fetch_add(1, Ordering::SeqCst);
                self.metrics.total_latency_ms.fetch_add(elapsed.as_millis() as u64, Ordering::SeqCst);
                cyberred_metrics::histogram!(metric::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
                queued.complete(response);
            }
            Err(error) => {
                tracing::error!(error = %error, "gateway_request_failed");
                self.metrics.total_requests.fetch_add(1, Ordering::SeqCst);
                self.metrics.total_failures.fetch_add(1, Ordering::SeqCst);
                cyberred_metrics::counter!(metric::REQUEST_FAILURES_TOTAL).increment(1);

                let transience = if error.is_transient() { "transient" } else { "permanent" };
                let response = LLMResponse {
                    content: String::new(),
                    model: request.model.clone(),
                    usage: crate::provider::TokenUsage::default(),
                    latency_ms: start.elapsed().as_millis() as u64,
                    finish_reason: Some(format!("error:{transience}:{}", error.error_class())),
                    request_id: None,
                };
                queued.complete(response);
            }
        }
    }

    /// Executes `request` with rate limiting, routing, and exponential
    /// backoff across `retry_policy.max_retries` attempts.
    async fn execute_with_retry(&self, request: &LLMRequest) -> Result<LLMResponse> {
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.retry_policy.max_retries {
            if !self.rate_limiter.acquire(Some(std::time::Duration::from_secs(60))).await {
                last_error = Some(Error::RateLimitExceeded {
                    provider: "gateway".into(),
                    limit_rpm: self.rate_limiter.requests_per_minute(),
                    retry_after_secs: None,
                });
                cyberred_metrics::counter!(metric::RATE_LIMITED_TOTAL).increment(1);
                if attempt < self.retry_policy.max_retries {
                    self.metrics.total_retries.fetch_add(1, Ordering::SeqCst);
                    cyberred_metrics::counter!(metric::RETRIES_TOTAL).increment(1);
                }
                continue;
            }

            let complexity = ModelRouter::infer_complexity(&request.prompt);
            let provider = match self.router.select_model(complexity) {
                Ok(provider) => provider,
                Err(error) => {
                    last_error = Some(error);
                    if attempt < self.retry_policy.max_retries {
                        tokio::time::sleep(self.retry_policy.backoff_for(attempt)).await;
                        self.metrics.total_retries.fetch_add(1, Ordering::SeqCst);
                        cyberred_metrics::counter!(metric::RETRIES_TOTAL).increment(1);
                    }
                    continue;
                }
            };

            let model_name = provider.model_name().to_string();
            let outcome = tokio::time::timeout(self.retry_policy.request_timeout, provider.complete(request)).await;

            match outcome {
                Ok(Ok(response)) => {
                    self.circuit_breaker.record_success(&model_name);
                    return Ok(response);
                }
                Ok(Err(error)) => {
                    if matches!(error, Error::ProviderUnavailable { .. }) {
                        self.circuit_breaker.record_failure(&model_name);
                    }
                    last_error = Some(error);
                }
                Err(_elapsed) => {
                    self.circuit_breaker.record_failure(&model_name);
                    last_error = Some(Error::Timeout { provider: model_name, timeout_secs: self.retry_policy.request_timeout.as_secs_f64() });
                }
            }

            if self.circuit_breaker.is_excluded(&model_name) {
                cyberred_metrics::counter!(metric::CIRCUIT_BREAKER_TRIPS_TOTAL).increment(1);
            }

            if attempt < self.retry_policy.max_retries {
                tracing::warn!(attempt = attempt + 1, max_retries = self.retry_policy.max_retries, "gateway_retry");
                tokio::time::sleep(self.retry_policy.backoff_for(attempt)).await;
                self.metrics.total_retries.fetch_add(1, Ordering::SeqCst);
                cyberred_metrics::counter!(metric::RETRIES_TOTAL).increment(1);
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Message("all retries exhausted".into())))
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.metrics.total_requests.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total_successes(&self) -> u64 {
        self.metrics.total_successes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.metrics.total_failures.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total_retries(&self) -> u64 {
        self.metrics.total_retries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn avg_latency_ms(&self) -> f64 {
        let successes = self.metrics.total_successes.load(Ordering::SeqCst);
        if successes == 0 {
            return 0.0;
        }
        self.metrics.total_latency_ms.load(Ordering::SeqCst) as f64 / successes as f64
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.total_queue_depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{LLMProvider, MockLLMProvider};
    use crate::router::TaskComplexity;
    use std::collections::HashMap;

    fn fast_retry_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            backoff_delays: vec![std::time::Duration::from_millis(1)],
            ..RetryPolicy::default()
        }
    }

    fn gateway_with(provider: MockLLMProvider) -> Arc<LLMGateway> {
        gateway_with_policy(provider, fast_retry_policy())
    }

    fn gateway_with_policy(provider: MockLLMProvider, policy: RetryPolicy) -> Arc<LLMGateway> {
        let mut providers: HashMap<TaskComplexity, Arc<dyn LLMProvider>> = HashMap::new();
        providers.insert(TaskComplexity::Standard, Arc::new(provider));
        let router = Arc::new(ModelRouter::new(providers).expect("non-empty providers"));
        let rate_limiter = Arc::new(RateLimiter::new(600, 10).expect("valid limiter"));
        let queue = Arc::new(LLMPriorityQueue::new());
        LLMGateway::new(rate_limiter, router, queue, policy)
    }

    #[tokio::test]
    async fn director_complete_returns_provider_response() {
        let gateway = gateway_with(MockLLMProvider::new("standard-model", "hi there"));
        gateway.start().await;

        let request = LLMRequest::new("plan the next move", "standard-model").expect("valid request");
        let response = gateway.director_complete(request).await.expect("completes");
        assert_eq!(response.content, "hi there");
        assert_eq!(gateway.total_successes(), 1);

        gateway.stop().await;
    }

    #[tokio::test]
    async fn director_requests_are_served_before_agent_requests() {
        let gateway = gateway_with(MockLLMProvider::new("standard-model", "ok"));
        // Queue directly without starting the worker so both are pending.
        let agent_rx = gateway.queue.enqueue_agent(LLMRequest::new("agent task", "standard-model").expect("valid")).await;
        let director_rx = gateway.queue.enqueue_director(LLMRequest::new("director task", "standard-model").expect("valid")).await;

        gateway.start().await;
        let director_response = director_rx.await.expect("not dropped").expect("completes");
        let agent_response = agent_rx.await.expect("not dropped").expect("completes");
        assert_eq!(director_response.content, "ok");
        assert_eq!(agent_response.content, "ok");
        gateway.stop().await;
    }

    #[tokio::test]
    async fn unavailable_provider_resolves_with_synthetic_error_response_after_retries() {
        let gateway = gateway_with(MockLLMProvider::new("standard-model", "ok").unavailable());
        gateway.start().await;

        let request = LLMRequest::new("plan", "standard-model").expect("valid request");
        let response = gateway.agent_complete(request).await.expect("never raises back to the caller");
        assert_eq!(response.finish_reason.as_deref(), Some("error:transient:ProviderUnavailable"));
        assert_eq!(gateway.total_failures(), 1);

        gateway.stop().await;
    }

    #[tokio::test]
    async fn quick_complete_returns_provider_content_without_starting_worker() {
        let gateway = gateway_with(MockLLMProvider::new("standard-model", "fast answer"));
        // Never call gateway.start(): quick_complete must not go through the queue.
        assert_eq!(gateway.quick_complete("what's the status").await, "fast answer");
    }

    #[tokio::test]
    async fn quick_complete_falls_back_when_provider_unavailable() {
        let gateway = gateway_with(MockLLMProvider::new("standard-model", "fast answer").unavailable());
        assert_eq!(gateway.quick_complete("what's the status").await, "quick_complete unavailable, try again");
    }
}

//! The provider seam: every model call in the daemon goes through
//! [`LLMProvider`], never through a concrete SDK client directly.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub system_prompt: Option<String>,
    pub stop_sequences: Option<Vec<String>>,
}

impl LLMRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(Error::Message("prompt cannot be empty".into()));
        }
        Ok(Self {
            prompt,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 1.0,
            frequency_penalty: 0.0,
            system_prompt: None,
            stop_sequences: None,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Result<Self> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::Message("temperature must be between 0.0 and 2.0".into()));
        }
        self.temperature = temperature;
        Ok(self)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Result<Self> {
        if max_tokens == 0 || max_tokens > 32_768 {
            return Err(Error::Message("max_tokens must be between 1 and 32768".into()));
        }
        self.max_tokens = max_tokens;
        Ok(self)
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub finish_reason: Option<String>,
    pub request_id: Option<String>,
}

impl LLMResponse {
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.usage.total_tokens
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Every model call in the daemon flows through this trait. Rate limiting,
/// routing, retry, and the circuit breaker all wrap an `Arc<dyn LLMProvider>`
/// rather than a concrete client.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse>;
    async fn health_check(&self) -> HealthStatus;
    fn is_available(&self) -> bool;
    fn model_name(&self) -> &str;
    fn rate_limit_rpm(&self) -> u32;
    fn token_usage(&self) -> TokenUsage;
}

/// Fixture provider for tests and daemon bootstrap before a real backend is
/// wired in. Thread-safe, counts calls and accumulates token usage.
pub struct MockLLMProvider {
    model_name: String,
    default_response: String,
    available: bool,
    call_count: AtomicUsize,
    total_prompt_tokens: AtomicU64,
    total_completion_tokens: AtomicU64,
}

impl MockLLMProvider {
    #[must_use]
    pub fn new(model_name: impl Into<String>, default_response: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            default_response: default_response.into(),
            available: true,
            call_count: AtomicUsize::new(0),
            total_prompt_tokens: AtomicU64::new(0),
            total_completion_tokens: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse> {
        if !self.available {
            return Err(Error::ProviderUnavailable {
                provider: self.model_name.clone(),
                reason: "mock provider marked unavailable".into(),
            });
        }
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let prompt_tokens = request.prompt.split_whitespace().count() as u64;
        let completion_tokens = self.default_response.split_whitespace().count() as u64;
        self.total_prompt_tokens.fetch_add(prompt_tokens, Ordering::SeqCst);
        self.total_completion_tokens.fetch_add(completion_tokens, Ordering::SeqCst);

        Ok(LLMResponse {
            content: self.default_response.clone(),
            model: self.model_name.clone(),
            usage: TokenUsage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: completion_tokens as u32,
                total_tokens: (prompt_tokens + completion_tokens) as u32,
            },
            latency_ms: 10,
            finish_reason: Some("stop".into()),
            request_id: None,
        })
    }

    async fn health_check(&self) -> HealthStatus {
        if self.available {
            HealthStatus { healthy: true, latency_ms: Some(5), error: None }
        } else {
            HealthStatus { healthy: false, latency_ms: None, error: Some("provider unavailable".into()) }
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn rate_limit_rpm(&self) -> u32 {
        30
    }

    fn token_usage(&self) -> TokenUsage {
        let prompt = self.total_prompt_tokens.load(Ordering::SeqCst) as u32;
        let completion = self.total_completion_tokens.load(Ordering::SeqCst) as u32;
        TokenUsage { prompt_tokens: prompt, completion_tokens: completion, total_tokens: prompt + completion }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_empty_prompt() {
        assert!(LLMRequest::new("", "m").is_err());
    }

    #[tokio::test]
    async fn mock_provider_tracks_call_count_and_usage() {
        let provider = MockLLMProvider::new("mock-model", "hello there");
        let request = LLMRequest::new("what is the plan", "mock-model").expect("valid request");
        let response = provider.complete(&request).await.expect("mock completes");
        assert_eq!(response.model, "mock-model");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.token_usage().total_tokens, response.total_tokens());
    }

    #[tokio::test]
    async fn unavailable_mock_provider_errors() {
        let provider = MockLLMProvider::new("mock-model", "x").unavailable();
        let request = LLMRequest::new("prompt", "mock-model").expect("valid request");
        assert!(provider.complete(&request).await.is_err());
    }
}

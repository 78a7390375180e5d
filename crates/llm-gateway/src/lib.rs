//! Rate-limited, priority-queued, circuit-breaking front end for every LLM
//! call the daemon makes. Director requests always drain ahead of Agent
//! requests; a model tripping the circuit breaker routes around itself
//! until its exclusion window elapses.

pub mod circuit_breaker;
pub mod error;
pub mod gateway;
pub mod priority_queue;
pub mod provider;
pub mod rate_limiter;
pub mod retry;
pub mod router;

pub use circuit_breaker::CircuitBreaker;
pub use error::{Error, Result};
pub use gateway::LLMGateway;
pub use priority_queue::{LLMPriorityQueue, QueuedRequest, RequestPriority};
pub use provider::{HealthStatus, LLMProvider, LLMRequest, LLMResponse, MockLLMProvider, TokenUsage};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use router::{ModelRouter, TaskComplexity};

//! Metrics collection and export for the daemon.
//!
//! This crate provides a unified metrics interface using the `metrics` crate
//! facade. When the `prometheus` feature is enabled, metrics are exported in
//! Prometheus format.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cyberred_metrics::{counter, gauge, histogram};
//!
//! counter!("cyberred_llm_gateway_requests_total", "provider" => "anthropic").increment(1);
//! gauge!("cyberred_sessions_active").set(3.0);
//! histogram!("cyberred_llm_gateway_request_duration_seconds").record(0.42);
//! ```
//!
//! # Features
//!
//! - `prometheus`: Enable Prometheus metrics export via the daemon's status
//!   surface.
//! - `tracing`: Enable tracing span context propagation to metrics labels.

mod definitions;
mod error;
mod recorder;
pub mod tracing_integration;

pub use definitions::*;
pub use error::{Error, Result};
pub use recorder::{init_metrics, MetricsHandle, MetricsRecorderConfig};

// Re-export metrics macros for convenience.
pub use metrics::{counter, gauge, histogram};

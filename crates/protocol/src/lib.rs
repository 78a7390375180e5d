//! Wire protocol for the daemon's IPC socket.
//!
//! Framing is newline-delimited JSON over a Unix domain socket: one
//! [`Request`] or [`Response`] per line, UTF-8 encoded. A message over
//! [`MAX_MESSAGE_SOFT_BYTES`] is still accepted; one over
//! [`MAX_MESSAGE_HARD_BYTES`] gets the connection dropped.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Messages above this size are accepted but logged as oversized.
pub const MAX_MESSAGE_SOFT_BYTES: usize = 65_536;
/// Messages above this size cause the connection to be closed.
pub const MAX_MESSAGE_HARD_BYTES: usize = 131_072;
/// Time budget for reading a single complete message off the wire.
pub const READ_TIMEOUT_SECS: u64 = 30;
/// Maximum simultaneous client connections.
pub const MAX_CONNECTIONS: usize = 100;

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const SCOPE_VIOLATION: &str = "SCOPE_VIOLATION";
    pub const KILL_SWITCH_TRIGGERED: &str = "KILL_SWITCH_TRIGGERED";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const CHECKPOINT_INTEGRITY_ERROR: &str = "CHECKPOINT_INTEGRITY_ERROR";
    pub const INVALID_STATE_TRANSITION: &str = "INVALID_STATE_TRANSITION";
    pub const RESOURCE_LIMIT: &str = "RESOURCE_LIMIT";
    pub const ENGAGEMENT_NOT_FOUND: &str = "ENGAGEMENT_NOT_FOUND";
    pub const PRE_FLIGHT_FAILED: &str = "PRE_FLIGHT_FAILED";
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const INTERNAL: &str = "INTERNAL";
    pub const LLM_PROVIDER_UNAVAILABLE: &str = "LLM_PROVIDER_UNAVAILABLE";
    pub const LLM_TIMEOUT: &str = "LLM_TIMEOUT";
    pub const LLM_RATE_LIMIT_EXCEEDED: &str = "LLM_RATE_LIMIT_EXCEEDED";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// ── Request / response envelopes ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub request_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl Response {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status: Status::Ok,
            request_id: request_id.into(),
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn err(request_id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            status: Status::Error,
            request_id: request_id.into(),
            data: None,
            error: Some(error),
        }
    }
}

// ── Stream event types ──────────────────────────────────────────────────────

pub mod event_types {
    pub const STATE_CHANGE: &str = "STATE_CHANGE";
    pub const AGENT_STATUS: &str = "AGENT_STATUS";
    pub const FINDING: &str = "FINDING";
    pub const HEARTBEAT: &str = "HEARTBEAT";
    pub const DAEMON_SHUTDOWN: &str = "DAEMON_SHUTDOWN";
}

// ── Streamed events ──────────────────────────────────────────────────────────

/// Pushed to a connection that has an active subscription on an engagement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub subscription_id: String,
    pub engagement_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: String,
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = Request {
            command: "engagement.start".into(),
            params: serde_json::json!({"engagement_id": "acme-20260101-000000-abcdef"}),
            request_id: "r-1".into(),
        };
        let encoded = serde_json::to_string(&req).unwrap();
        let decoded: Request = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.command, "engagement.start");
        assert_eq!(decoded.request_id, "r-1");
    }

    #[test]
    fn error_response_serializes_without_data_field() {
        let resp = Response::err("r-2", ErrorShape::new(error_codes::ENGAGEMENT_NOT_FOUND, "no such engagement"));
        let encoded = serde_json::to_string(&resp).unwrap();
        assert!(!encoded.contains("\"data\""));
        assert!(encoded.contains("ENGAGEMENT_NOT_FOUND"));
    }
}

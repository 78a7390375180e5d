//! Metric name and label definitions.
//!
//! Centralizes every metric name and common label key the daemon emits, so
//! call sites never hand-roll a string and two modules never drift onto
//! slightly different spellings of the same metric.

/// LLM gateway metrics: requests routed to providers, retries, and circuit
/// breaker state.
pub mod llm_gateway {
    /// Total number of completion requests accepted by the gateway.
    pub const REQUESTS_TOTAL: &str = "cyberred_llm_gateway_requests_total";
    /// Duration of a completion request, from dispatch to response.
    pub const REQUEST_DURATION_SECONDS: &str = "cyberred_llm_gateway_request_duration_seconds";
    /// Requests that ultimately failed after exhausting retries.
    pub const REQUEST_FAILURES_TOTAL: &str = "cyberred_llm_gateway_request_failures_total";
    /// Retry attempts issued by the retry policy.
    pub const RETRIES_TOTAL: &str = "cyberred_llm_gateway_retries_total";
    /// Requests rejected by the rate limiter before reaching a provider.
    pub const RATE_LIMITED_TOTAL: &str = "cyberred_llm_gateway_rate_limited_total";
    /// Requests currently waiting in the priority queue.
    pub const QUEUE_DEPTH: &str = "cyberred_llm_gateway_queue_depth";
    /// Time a request spent queued before being dispatched to a provider.
    pub const QUEUE_WAIT_SECONDS: &str = "cyberred_llm_gateway_queue_wait_seconds";
    /// Circuit breaker trips (provider excluded from routing).
    pub const CIRCUIT_BREAKER_TRIPS_TOTAL: &str = "cyberred_llm_gateway_circuit_breaker_trips_total";
    /// Providers currently excluded by an open circuit breaker.
    pub const CIRCUIT_BREAKER_OPEN: &str = "cyberred_llm_gateway_circuit_breaker_open";
    /// Input tokens sent to a provider.
    pub const INPUT_TOKENS_TOTAL: &str = "cyberred_llm_gateway_input_tokens_total";
    /// Output tokens received from a provider.
    pub const OUTPUT_TOKENS_TOTAL: &str = "cyberred_llm_gateway_output_tokens_total";
}

/// Engagement lifecycle and session-manager metrics.
pub mod sessions {
    /// Engagements currently tracked (any state).
    pub const ACTIVE: &str = "cyberred_sessions_active";
    /// Total engagements started.
    pub const STARTED_TOTAL: &str = "cyberred_sessions_started_total";
    /// Total engagements that reached a terminal state (Stopped/Completed).
    pub const FINISHED_TOTAL: &str = "cyberred_sessions_finished_total";
    /// Engagements evicted from history to respect `max_history`.
    pub const HISTORY_EVICTIONS_TOTAL: &str = "cyberred_sessions_history_evictions_total";
    /// Engagement state transition rejections (invalid transition attempted).
    pub const INVALID_TRANSITIONS_TOTAL: &str = "cyberred_sessions_invalid_transitions_total";
}

/// Scope validator metrics.
pub mod scope {
    /// Total scope validations performed.
    pub const VALIDATIONS_TOTAL: &str = "cyberred_scope_validations_total";
    /// Validations that denied the requested target/command.
    pub const DENIALS_TOTAL: &str = "cyberred_scope_denials_total";
    /// Validations rejected for a detected injection attempt.
    pub const INJECTION_REJECTIONS_TOTAL: &str = "cyberred_scope_injection_rejections_total";
}

/// Kill switch metrics.
pub mod killswitch {
    /// Total number of times the kill switch was triggered.
    pub const TRIGGERS_TOTAL: &str = "cyberred_killswitch_triggers_total";
    /// Engagements forcibly stopped as a direct result of a trigger.
    pub const ENGAGEMENTS_STOPPED_TOTAL: &str = "cyberred_killswitch_engagements_stopped_total";
}

/// Checkpoint store metrics.
pub mod checkpoint {
    /// Total checkpoint save operations.
    pub const SAVES_TOTAL: &str = "cyberred_checkpoint_saves_total";
    /// Save operations that failed.
    pub const SAVE_ERRORS_TOTAL: &str = "cyberred_checkpoint_save_errors_total";
    /// Total checkpoint restore operations.
    pub const RESTORES_TOTAL: &str = "cyberred_checkpoint_restores_total";
    /// Restores that failed a signature check.
    pub const SIGNATURE_FAILURES_TOTAL: &str = "cyberred_checkpoint_signature_failures_total";
    /// Duration of a checkpoint save, in seconds.
    pub const SAVE_DURATION_SECONDS: &str = "cyberred_checkpoint_save_duration_seconds";
}

/// Audit trail metrics.
pub mod audit {
    /// Total audit records appended.
    pub const RECORDS_TOTAL: &str = "cyberred_audit_records_total";
    /// Audit writes that failed (logged but non-fatal to the caller).
    pub const WRITE_ERRORS_TOTAL: &str = "cyberred_audit_write_errors_total";
    /// Hash-chain verification failures detected.
    pub const CHAIN_VERIFICATION_FAILURES_TOTAL: &str =
        "cyberred_audit_chain_verification_failures_total";
}

/// IPC server metrics.
pub mod ipc {
    /// Total client connections accepted.
    pub const CONNECTIONS_TOTAL: &str = "cyberred_ipc_connections_total";
    /// Currently connected clients.
    pub const CONNECTIONS_ACTIVE: &str = "cyberred_ipc_connections_active";
    /// Connections rejected because `max_connections` was reached.
    pub const CONNECTIONS_REJECTED_TOTAL: &str = "cyberred_ipc_connections_rejected_total";
    /// Total commands dispatched.
    pub const COMMANDS_DISPATCHED_TOTAL: &str = "cyberred_ipc_commands_dispatched_total";
    /// Commands that returned a protocol or domain error.
    pub const COMMAND_ERRORS_TOTAL: &str = "cyberred_ipc_command_errors_total";
    /// Active engagement-event subscriptions being forwarded.
    pub const SUBSCRIPTIONS_ACTIVE: &str = "cyberred_ipc_subscriptions_active";
    /// Stream events forwarded to attached clients.
    pub const EVENTS_FORWARDED_TOTAL: &str = "cyberred_ipc_events_forwarded_total";
    /// Subscriber lagged and dropped buffered events.
    pub const EVENTS_DROPPED_TOTAL: &str = "cyberred_ipc_events_dropped_total";
}

/// Configuration loading/reload metrics.
pub mod config {
    /// Config reloads triggered (file watch or SIGHUP).
    pub const RELOADS_TOTAL: &str = "cyberred_config_reloads_total";
    /// Reloads rejected by validation.
    pub const RELOAD_REJECTIONS_TOTAL: &str = "cyberred_config_reload_rejections_total";
}

/// System/runtime metrics.
pub mod system {
    /// Process uptime in seconds.
    pub const UPTIME_SECONDS: &str = "cyberred_uptime_seconds";
    /// Build information (labels: version, commit, build_date).
    pub const BUILD_INFO: &str = "cyberred_build_info";
}

/// Common label keys used across metrics.
pub mod labels {
    pub const PROVIDER: &str = "provider";
    pub const MODEL: &str = "model";
    pub const ENGAGEMENT_ID: &str = "engagement_id";
    pub const ERROR_TYPE: &str = "error_type";
    pub const COMMAND: &str = "command";
    pub const STATE: &str = "state";
    pub const RULE: &str = "rule";
}

/// Standard histogram buckets for different metric types.
pub mod buckets {
    use once_cell::sync::Lazy;

    /// LLM gateway request duration buckets (in seconds). Covers 100ms to
    /// 5 minutes — provider calls can be slow.
    pub static LLM_GATEWAY_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 180.0, 300.0,
        ]
    });

    /// Queue wait time buckets (in seconds). Covers 1ms to 60s.
    pub static QUEUE_WAIT: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]
    });

    /// Checkpoint save duration buckets (in seconds). Covers 1ms to 10s.
    pub static CHECKPOINT_SAVE_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    });

    /// Token count buckets. Covers 1 to 200k tokens.
    pub static TOKEN_COUNT: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0, 32000.0,
            64000.0, 128000.0, 200000.0,
        ]
    });
}

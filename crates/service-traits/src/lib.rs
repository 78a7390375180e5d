//! Collaborator trait interfaces: the daemon core depends on these, not on
//! concrete implementations, so the safety-critical crates (scope, kill
//! switch, session manager) can be built and tested without pulling in a real
//! container runtime, event transport, or pre-flight checklist.
//!
//! Each trait has a `Noop` implementation so the daemon can start up with
//! collaborators unconfigured and fail individual calls loudly instead of
//! refusing to boot.

use async_trait::async_trait;
use serde_json::Value;

/// Error type returned by collaborator trait methods.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Message { message: String },
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl ServiceError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }
}

impl From<String> for ServiceError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for ServiceError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

impl From<ServiceError> for cyberred_protocol::ErrorShape {
    fn from(err: ServiceError) -> Self {
        Self::new(cyberred_protocol::error_codes::UNAVAILABLE, err.to_string())
    }
}

pub type ServiceResult<T = Value> = Result<T, ServiceError>;

// ── Pre-flight checks ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CheckPriority {
    P0,
    P1,
}

/// One named pre-flight check result, e.g. "scope file present" or
/// "disk space available".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub priority: CheckPriority,
    pub message: String,
}

impl CheckResult {
    #[must_use]
    pub fn pass(name: impl Into<String>, priority: CheckPriority, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pass,
            priority,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn warn(name: impl Into<String>, priority: CheckPriority, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            priority,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn fail(name: impl Into<String>, priority: CheckPriority, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Fail,
            priority,
            message: message.into(),
        }
    }
}

/// Runs the set of pre-flight checks before an engagement starts (scope file
/// readable, disk space, collaborator reachability, etc).
#[async_trait]
pub trait PreFlightRunner: Send + Sync {
    async fn run_all(&self, engagement_config_path: &std::path::Path) -> Vec<CheckResult>;
}

pub struct NoopPreFlightRunner;

#[async_trait]
impl PreFlightRunner for NoopPreFlightRunner {
    async fn run_all(&self, _engagement_config_path: &std::path::Path) -> Vec<CheckResult> {
        Vec::new()
    }
}

/// Any failing `P0` check aborts `start_engagement`; a failing `P1` check is a
/// warning that can be overridden with `ignore_warnings`.
#[must_use]
pub fn validate_results(results: &[CheckResult], ignore_warnings: bool) -> Result<(), String> {
    let failed: Vec<&CheckResult> = results.iter().filter(|r| r.status == CheckStatus::Fail).collect();
    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|r| r.name.as_str()).collect();
        return Err(format!("pre-flight checks failed: {}", names.join(", ")));
    }
    if !ignore_warnings {
        let warned: Vec<&CheckResult> = results.iter().filter(|r| r.status == CheckStatus::Warn).collect();
        if !warned.is_empty() {
            let names: Vec<&str> = warned.iter().map(|r| r.name.as_str()).collect();
            return Err(format!("pre-flight checks warned: {}", names.join(", ")));
        }
    }
    Ok(())
}

// ── Container control ────────────────────────────────────────────────────────

/// The kill switch's container path. Only the control surface (stop a
/// sandbox by engagement id) is in scope here — what runs inside the sandbox
/// is a separate concern.
#[async_trait]
pub trait ContainerExecutor: Send + Sync {
    /// Force-stop any sandbox associated with `engagement_id`. Returns `true`
    /// if a sandbox was found and stopped, `false` if none was running.
    async fn stop(&self, engagement_id: &str) -> ServiceResult<bool>;
}

pub struct NoopContainerExecutor;

#[async_trait]
impl ContainerExecutor for NoopContainerExecutor {
    async fn stop(&self, _engagement_id: &str) -> ServiceResult<bool> {
        Ok(false)
    }
}

// ── Checkpointing ────────────────────────────────────────────────────────────

/// The session manager's cold-state persistence surface. A real
/// implementation signs and writes a SQLite snapshot; tests and daemon
/// bootstrap without storage configured get the no-op.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist engagement state, returning an opaque checkpoint path/id.
    async fn save(&self, engagement_id: &str, scope_path: Option<&std::path::Path>) -> ServiceResult<String>;

    /// Remove any checkpoint associated with `engagement_id`. Safe to call
    /// when none exists.
    async fn delete(&self, engagement_id: &str) -> ServiceResult<()>;
}

pub struct NoopCheckpointer;

#[async_trait]
impl Checkpointer for NoopCheckpointer {
    async fn save(&self, engagement_id: &str, _scope_path: Option<&std::path::Path>) -> ServiceResult<String> {
        Ok(format!("noop-checkpoint-{engagement_id}"))
    }

    async fn delete(&self, _engagement_id: &str) -> ServiceResult<()> {
        Ok(())
    }
}

// ── Event bus ────────────────────────────────────────────────────────────────

/// Per-channel publish/subscribe used to fan engagement events out to IPC
/// subscribers. Any implementation that preserves per-channel FIFO ordering
/// is acceptable.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, event: Value);
}

pub struct NoopEventBus;

#[async_trait]
impl EventBus for NoopEventBus {
    async fn publish(&self, _channel: &str, _event: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_results_fails_closed_on_any_p0_or_p1_failure() {
        let results = vec![
            CheckResult::pass("scope_readable", CheckPriority::P0, "ok"),
            CheckResult::fail("disk_space", CheckPriority::P1, "low disk"),
        ];
        assert!(validate_results(&results, true).is_err());
    }

    #[test]
    fn validate_results_allows_warnings_when_ignored() {
        let results = vec![CheckResult::warn("disk_space", CheckPriority::P1, "low disk")];
        assert!(validate_results(&results, true).is_ok());
        assert!(validate_results(&results, false).is_err());
    }

    #[tokio::test]
    async fn noop_container_executor_reports_nothing_running() {
        let exec = NoopContainerExecutor;
        assert_eq!(exec.stop("eng-1").await.unwrap(), false);
    }
}

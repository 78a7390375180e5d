//! Daemon configuration schema: scope, session limits, storage paths, IPC
//! limits, and LLM gateway policy. Every section has sane defaults so a
//! brand-new `config.yaml` can be as small as `{}`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_base_dir() -> PathBuf {
    PathBuf::from("~/.cyber-red")
}

/// Root configuration, loaded from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Root directory for the socket, PID file, checkpoints, and audit log.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    pub sessions: SessionLimits,
    pub checkpoint: CheckpointSettings,
    pub ipc: IpcSettings,
    pub llm_gateway: LlmGatewaySettings,
    pub logging: LoggingSettings,
    /// Path to the scope configuration YAML that gates every engagement
    /// started without an explicit per-engagement override.
    pub scope_config_path: Option<PathBuf>,
    /// Wall-clock budget for the graceful shutdown sequence, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            sessions: SessionLimits::default(),
            checkpoint: CheckpointSettings::default(),
            ipc: IpcSettings::default(),
            llm_gateway: LlmGatewaySettings::default(),
            logging: LoggingSettings::default(),
            scope_config_path: None,
            shutdown_timeout_secs: 30,
        }
    }
}

impl DaemonConfig {
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.ipc.socket_path.clone().unwrap_or_else(|| self.base_dir.join("daemon.sock"))
    }

    #[must_use]
    pub fn pid_path(&self) -> PathBuf {
        self.ipc.pid_path.clone().unwrap_or_else(|| self.base_dir.join("daemon.pid"))
    }

    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.base_path.clone().unwrap_or_else(|| self.base_dir.join("engagements"))
    }

    #[must_use]
    pub fn audit_path(&self) -> PathBuf {
        self.checkpoint.audit_path.clone().unwrap_or_else(|| self.base_dir.join("audit.sqlite"))
    }
}

/// `max_engagements`/`max_history` caps handed straight to `SessionManager::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    pub max_engagements: usize,
    pub max_history: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self { max_engagements: 10, max_history: 50 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Defaults to `{base_dir}/engagements` when unset.
    pub base_path: Option<PathBuf>,
    /// Defaults to `{base_dir}/audit.sqlite` when unset. Deliberately
    /// separate from `base_path`, matching the audit table's own store
    /// being kept apart from per-engagement checkpoint data.
    pub audit_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcSettings {
    /// Defaults to `{base_dir}/daemon.sock` when unset.
    pub socket_path: Option<PathBuf>,
    /// Defaults to `{base_dir}/daemon.pid` when unset.
    pub pid_path: Option<PathBuf>,
    /// Overrides `cyberred_protocol::MAX_CONNECTIONS` when set.
    pub max_connections: Option<usize>,
}

/// Mirrors `cyberred_llm_gateway::RetryPolicy` plus the rate limiter's
/// tunables, kept here as plain numbers so this crate has no dependency on
/// the gateway crate; the daemon bootstrap converts this into the gateway's
/// own types when it constructs the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmGatewaySettings {
    pub max_retries: u32,
    pub backoff_delays_ms: Vec<u64>,
    pub request_timeout_secs: u64,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_exclusion_secs: u64,
    pub rate_limit_rpm: u32,
    pub rate_limit_burst: u32,
}

impl Default for LlmGatewaySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_delays_ms: vec![1_000, 2_000, 4_000],
            request_timeout_secs: 100,
            circuit_breaker_failure_threshold: 3,
            circuit_breaker_exclusion_secs: 60,
            rate_limit_rpm: 60,
            rate_limit_burst: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".into(), json: false }
    }
}

mod preflight;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cyberred_audit::{AuditStore, AuditedValidator};
use cyberred_config::{ConfigHandle, ConfigWatcher};
use cyberred_ipc::{ChannelEventBus, DaemonServer};
use cyberred_killswitch::KillSwitch;
use cyberred_llm_gateway::{LLMGateway, LLMPriorityQueue, MockLLMProvider, ModelRouter, RateLimiter, RetryPolicy, TaskComplexity};
use cyberred_scope::{ScopeConfig, ScopeValidator};
use cyberred_sessions::SessionManager;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use preflight::ScopePreFlightRunner;

#[derive(Parser)]
#[command(name = "cyberred-daemon", about = "Operator-supervised red-team automation daemon")]
struct Cli {
    /// Root directory for the socket, PID file, checkpoints, audit log, and
    /// `config.yaml`. Overrides the config file's own `base_dir`.
    #[arg(long, env = "CYBERRED_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CYBERRED_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false, env = "CYBERRED_JSON_LOGS")]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry.with(fmt::layer().json().with_target(true).with_thread_ids(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true)).init();
    }
}

fn default_base_dir() -> PathBuf {
    dirs_or_home().join(".cyber-red")
}

fn dirs_or_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

// Single-threaded cooperative scheduler, not the default multi-threaded
// runtime: every suspension point in the daemon (socket I/O, queue
// get/put, rate-limiter wait) is an explicit await, and container control /
// signal handling / large-file hashing are the only work pushed onto
// `spawn_blocking`'s separate pool. See DESIGN.md's open-question record.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "cyberred-daemon starting");

    let base_dir = cli.base_dir.unwrap_or_else(default_base_dir);
    std::fs::create_dir_all(&base_dir)?;

    let config_handle = ConfigHandle::new(base_dir.clone());
    let config = config_handle.load().clone();
    let _config_watcher = ConfigWatcher::start(config_handle.clone())?;

    cyberred_metrics::init_metrics(cyberred_metrics::MetricsRecorderConfig {
        enabled: true,
        prefix: Some("cyberred".into()),
        global_labels: Vec::new(),
    })?;

    let scope_config = match &config.scope_config_path {
        Some(path) => ScopeConfig::from_file(path)?,
        None => ScopeConfig::default(),
    };
    let audit_store = AuditStore::open(&config.audit_path()).await?;
    let audited_validator = AuditedValidator::new(ScopeValidator::new(scope_config), audit_store, "cyberred-daemon");
    let preflight = Arc::new(ScopePreFlightRunner::new(audited_validator));

    let event_bus = Arc::new(ChannelEventBus::new());
    let checkpointer = Arc::new(cyberred_checkpoint::CheckpointStore::new(config.checkpoint_path()));

    let sessions = Arc::new(SessionManager::new(
        config.sessions.max_engagements,
        config.sessions.max_history,
        event_bus.clone(),
        checkpointer,
        preflight,
    ));

    let gateway = build_llm_gateway(&config.llm_gateway)?;
    gateway.start().await;

    let server = Arc::new(DaemonServer::new(config.socket_path(), config.pid_path(), sessions.clone(), event_bus.clone(), config_handle.clone()));
    let listener = server.bind().await?;

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let serve_server = server.clone();
    let serve_handle = tokio::spawn(async move { serve_server.serve(listener).await });

    let uptime_handle = tokio::spawn(report_uptime());

    wait_for_shutdown_signal(&config_handle).await;

    info!("shutdown requested, triggering kill switch for active engagements");
    trigger_kill_switches(&sessions, event_bus.as_ref()).await;

    let shutdown_failed = match tokio::time::timeout(shutdown_timeout, server.stop()).await {
        Ok(Ok(())) => {
            info!("daemon stopped cleanly");
            false
        }
        Ok(Err(e)) => {
            error!(error = %e, "error during daemon shutdown");
            true
        }
        Err(_) => {
            warn!(timeout_secs = shutdown_timeout.as_secs(), "graceful shutdown exceeded budget, exiting anyway");
            true
        }
    };

    gateway.stop().await;
    serve_handle.abort();
    uptime_handle.abort();

    if shutdown_failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Emits `cyberred_uptime_seconds` once a minute.
async fn report_uptime() {
    let start = tokio::time::Instant::now();
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        cyberred_metrics::gauge!(cyberred_metrics::system::UPTIME_SECONDS).set(start.elapsed().as_secs_f64());
    }
}

/// Builds the gateway with one [`MockLLMProvider`] per complexity tier, since
/// wiring a real provider's request/response semantics is out of scope here.
fn build_llm_gateway(settings: &cyberred_config::LlmGatewaySettings) -> anyhow::Result<Arc<LLMGateway>> {
    let mut providers: HashMap<TaskComplexity, Arc<dyn cyberred_llm_gateway::LLMProvider>> = HashMap::new();
    providers.insert(TaskComplexity::Fast, Arc::new(MockLLMProvider::new("mock-fast", "{}")));
    providers.insert(TaskComplexity::Standard, Arc::new(MockLLMProvider::new("mock-standard", "{}")));
    providers.insert(TaskComplexity::Complex, Arc::new(MockLLMProvider::new("mock-complex", "{}")));

    let router = Arc::new(ModelRouter::new(providers)?);
    let rate_limiter = Arc::new(RateLimiter::new(settings.rate_limit_rpm, settings.rate_limit_burst)?);
    let queue = Arc::new(LLMPriorityQueue::new());
    let retry_policy = RetryPolicy {
        max_retries: settings.max_retries,
        backoff_delays: settings.backoff_delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        request_timeout: Duration::from_secs(settings.request_timeout_secs),
        cb_failure_threshold: settings.circuit_breaker_failure_threshold,
        cb_exclusion_duration: Duration::from_secs(settings.circuit_breaker_exclusion_secs),
    }
    .validated()?;

    Ok(LLMGateway::new(rate_limiter, router, queue, retry_policy))
}

/// Blocks until SIGTERM, SIGINT, or a second SIGHUP request a shutdown.
/// SIGHUP alone just reloads the config and keeps running.
async fn wait_for_shutdown_signal(config_handle: &Arc<ConfigHandle>) {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler");
            let _ = sigterm.recv().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                return;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT");
                return;
            }
            _ = sighup.recv() => {
                info!("received SIGHUP, reloading config");
                let result = config_handle.reload();
                if result.has_errors() {
                    warn!(diagnostics = ?result.diagnostics, "config reload rejected");
                }
            }
        }
    }
}

/// Fires a fresh [`KillSwitch`] for every engagement still running or paused,
/// as a defense-in-depth stop alongside the session manager's own
/// pause-and-checkpoint shutdown sequence. No process or container tracking
/// exists at this layer, so only the freeze and broadcast paths do anything;
/// signal and container remain no-ops with nothing to race.
async fn trigger_kill_switches(sessions: &Arc<SessionManager>, event_bus: &ChannelEventBus) {
    for summary in sessions.list_engagements().await {
        if !matches!(summary.state, cyberred_sessions::EngagementState::Running | cyberred_sessions::EngagementState::Paused) {
            continue;
        }
        let switch = KillSwitch::new(summary.id.clone());
        let report = switch
            .trigger("daemon_shutdown", "cyberred-daemon", &[], None, Some(event_bus))
            .await;
        if !report.fully_succeeded() {
            warn!(engagement_id = %summary.id, ?report, "kill switch did not fully succeed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_bootstrap_flags() {
        let cli = Cli::parse_from([
            "cyberred-daemon",
            "--base-dir",
            "/tmp/cyberred-test",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/cyberred-test")));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.json_logs);
    }

    #[test]
    fn cli_defaults_when_no_flags_given() {
        let cli = Cli::parse_from(["cyberred-daemon"]);
        assert_eq!(cli.base_dir, None);
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn build_llm_gateway_succeeds_with_default_settings() {
        let settings = cyberred_config::LlmGatewaySettings::default();
        assert!(build_llm_gateway(&settings).is_ok());
    }

    #[test]
    fn build_llm_gateway_rejects_zero_circuit_breaker_threshold() {
        let settings = cyberred_config::LlmGatewaySettings {
            circuit_breaker_failure_threshold: 0,
            ..cyberred_config::LlmGatewaySettings::default()
        };
        assert!(build_llm_gateway(&settings).is_err());
    }
}

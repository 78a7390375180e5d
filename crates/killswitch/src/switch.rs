//! Emergency-stop for a single engagement.
//!
//! Triggering fires four independent paths concurrently: setting the
//! in-process freeze flag (instant, always succeeds), delivering a
//! termination signal to any tracked OS processes, asking the container
//! collaborator to stop the sandbox, and publishing a shutdown notice on the
//! pub/sub bus. Each path has its own soft timeout; the whole operation is
//! additionally wrapped in a hard 1-second deadline so a wedged collaborator
//! can never block the caller indefinitely.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cyberred_collab::{ContainerExecutor, EventBus};
use sysinfo::{Pid, Signal, System};

use crate::error::{Error, Result};

const OVERALL_BUDGET: Duration = Duration::from_millis(1_000);
const SIGNAL_PATH_BUDGET: Duration = Duration::from_millis(500);
const CONTAINER_PATH_BUDGET: Duration = Duration::from_millis(600);
const BROADCAST_PATH_BUDGET: Duration = Duration::from_millis(500);

/// Channel the broadcast path publishes the shutdown notice on.
pub fn kill_switch_channel(engagement_id: &str) -> String {
    format!("engagement:{engagement_id}:events")
}

/// Outcome of a single path within a trigger, for the audit record.
#[derive(Debug, Clone)]
pub struct PathOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    pub detail: String,
}

impl PathOutcome {
    fn skipped() -> Self {
        Self {
            attempted: false,
            succeeded: true,
            detail: "no target".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KillReport {
    pub engagement_id: String,
    pub triggered_by: String,
    pub reason: String,
    pub freeze: PathOutcome,
    pub signal: PathOutcome,
    pub container: PathOutcome,
    pub broadcast: PathOutcome,
    pub elapsed: Duration,
    pub within_budget: bool,
}

impl KillReport {
    #[must_use]
    pub fn fully_succeeded(&self) -> bool {
        self.freeze.succeeded && self.signal.succeeded && self.container.succeeded && self.broadcast.succeeded
    }
}

pub struct KillSwitch {
    engagement_id: String,
    frozen: Arc<AtomicBool>,
}

impl KillSwitch {
    #[must_use]
    pub fn new(engagement_id: impl Into<String>) -> Self {
        Self {
            engagement_id: engagement_id.into(),
            frozen: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Lock-free check meant to be polled from hot loops (the agent tick,
    /// a tool dispatch site) without touching any mutex.
    pub fn check_frozen(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::Triggered {
                engagement_id: self.engagement_id.clone(),
                triggered_by: "unknown".into(),
                reason: "engagement frozen".into(),
            });
        }
        Ok(())
    }

    pub async fn trigger(
        &self,
        reason: impl Into<String>,
        triggered_by: impl Into<String>,
        pids: &[u32],
        container: Option<&(dyn ContainerExecutor)>,
        event_bus: Option<&(dyn EventBus)>,
    ) -> KillReport {
        let reason = reason.into();
        let triggered_by = triggered_by.into();
        let start = tokio::time::Instant::now();

        self.frozen.store(true, Ordering::SeqCst);
        let freeze = PathOutcome {
            attempted: true,
            succeeded: true,
            detail: "freeze flag set".into(),
        };

        let engagement_id = self.engagement_id.clone();
        let signal_fut = tokio::time::timeout(SIGNAL_PATH_BUDGET, signal_processes(pids));
        let container_fut = tokio::time::timeout(
            CONTAINER_PATH_BUDGET,
            stop_container(container, &engagement_id),
        );
        let broadcast_fut = tokio::time::timeout(
            BROADCAST_PATH_BUDGET,
            broadcast_shutdown(event_bus, &engagement_id, &reason, &triggered_by),
        );

        let overall = tokio::time::timeout(OVERALL_BUDGET, async {
            tokio::join!(signal_fut, container_fut, broadcast_fut)
        })
        .await;

        let (signal, container, broadcast) = match overall {
            Ok((signal_res, container_res, broadcast_res)) => (
                signal_res.unwrap_or_else(|_| PathOutcome {
                    attempted: !pids.is_empty(),
                    succeeded: false,
                    detail: "signal path timed out".into(),
                }),
                container_res.unwrap_or_else(|_| PathOutcome {
                    attempted: container.is_some(),
                    succeeded: false,
                    detail: "container path timed out".into(),
                }),
                broadcast_res.unwrap_or_else(|_| PathOutcome {
                    attempted: event_bus.is_some(),
                    succeeded: false,
                    detail: "broadcast path timed out".into(),
                }),
            ),
            Err(_) => (
                PathOutcome {
                    attempted: !pids.is_empty(),
                    succeeded: false,
                    detail: "overall budget exceeded".into(),
                },
                PathOutcome {
                    attempted: container.is_some(),
                    succeeded: false,
                    detail: "overall budget exceeded".into(),
                },
                PathOutcome {
                    attempted: event_bus.is_some(),
                    succeeded: false,
                    detail: "overall budget exceeded".into(),
                },
            ),
        };

        let elapsed = start.elapsed();
        let within_budget = elapsed <= OVERALL_BUDGET;

        tracing::warn!(
            engagement_id = %engagement_id,
            %triggered_by,
            %reason,
            signal_ok = signal.succeeded,
            container_ok = container.succeeded,
            broadcast_ok = broadcast.succeeded,
            elapsed_ms = elapsed.as_millis() as u64,
            "kill_switch_triggered"
        );

        KillReport {
            engagement_id,
            triggered_by,
            reason,
            freeze,
            signal,
            container,
            broadcast,
            elapsed,
            within_budget,
        }
    }
}

/// Deliver a termination signal to each tracked pid. A process that has
/// already exited (not found by the time we signal it) counts as a success —
/// the goal, "this process is not running", already holds.
async fn signal_processes(pids: &[u32]) -> PathOutcome {
    if pids.is_empty() {
        return PathOutcome::skipped();
    }
    let mut system = System::new();
    system.refresh_all();
    let mut all_ok = true;
    let mut detail = String::new();
    for &pid in pids {
        match system.process(Pid::from_u32(pid)) {
            None => {
                detail.push_str(&format!("pid {pid} already gone; "));
            }
            Some(process) => match process.kill_with(Signal::Term) {
                Some(true) => detail.push_str(&format!("pid {pid} signaled; ")),
                Some(false) | None => {
                    all_ok = false;
                    detail.push_str(&format!("pid {pid} signal failed; "));
                }
            },
        }
    }
    PathOutcome {
        attempted: true,
        succeeded: all_ok,
        detail,
    }
}

async fn stop_container(container: Option<&(dyn ContainerExecutor)>, engagement_id: &str) -> PathOutcome {
    let Some(container) = container else {
        return PathOutcome::skipped();
    };
    match container.stop(engagement_id).await {
        Ok(stopped) => PathOutcome {
            attempted: true,
            succeeded: true,
            detail: if stopped { "sandbox stopped".into() } else { "no sandbox running".into() },
        },
        Err(e) => PathOutcome {
            attempted: true,
            succeeded: false,
            detail: format!("sandbox stop failed: {e}"),
        },
    }
}

async fn broadcast_shutdown(
    event_bus: Option<&(dyn EventBus)>,
    engagement_id: &str,
    reason: &str,
    triggered_by: &str,
) -> PathOutcome {
    let Some(event_bus) = event_bus else {
        return PathOutcome::skipped();
    };
    event_bus
        .publish(
            &kill_switch_channel(engagement_id),
            serde_json::json!({
                "event_type": cyberred_protocol::event_types::DAEMON_SHUTDOWN,
                "data": {
                    "engagement_id": engagement_id,
                    "reason": reason,
                    "triggered_by": triggered_by,
                },
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        )
        .await;
    PathOutcome {
        attempted: true,
        succeeded: true,
        detail: "shutdown notice published".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cyberred_collab::ServiceResult;

    struct AlwaysStops;

    #[async_trait]
    impl ContainerExecutor for AlwaysStops {
        async fn stop(&self, _engagement_id: &str) -> ServiceResult<bool> {
            Ok(true)
        }
    }

    struct StalledBus;

    #[async_trait]
    impl EventBus for StalledBus {
        async fn publish(&self, _channel: &str, _event: serde_json::Value) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    #[tokio::test]
    async fn trigger_sets_frozen_flag_immediately() {
        let switch = KillSwitch::new("acme-20260101-000000-abcdef");
        assert!(!switch.is_frozen());
        let report = switch
            .trigger("operator abort", "operator", &[], None, None)
            .await;
        assert!(switch.is_frozen());
        assert!(switch.check_frozen().is_err());
        assert!(report.freeze.succeeded);
    }

    #[tokio::test]
    async fn trigger_completes_within_overall_budget() {
        let switch = KillSwitch::new("acme-20260101-000000-abcdef");
        let container = AlwaysStops;
        let report = switch
            .trigger("operator abort", "operator", &[], Some(&container), None)
            .await;
        assert!(report.within_budget);
        assert!(report.container.succeeded);
        assert!(report.elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn check_frozen_ok_before_trigger() {
        let switch = KillSwitch::new("eng-1");
        assert!(switch.check_frozen().is_ok());
    }

    #[tokio::test]
    async fn trigger_survives_a_stalled_broadcast_path() {
        let switch = KillSwitch::new("acme-20260101-000000-abcdef");
        let container = AlwaysStops;
        let bus = StalledBus;
        let report = switch
            .trigger(
                "operator abort",
                "operator",
                &[],
                Some(&container),
                Some(&bus),
            )
            .await;
        assert!(report.within_budget);
        assert!(report.container.succeeded);
        assert!(!report.broadcast.succeeded);
        assert!(!report.fully_succeeded());
        assert!(report.elapsed < Duration::from_secs(1));
    }
}

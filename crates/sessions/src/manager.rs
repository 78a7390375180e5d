//! Orchestrates the lifecycle of every engagement the daemon is tracking.
//!
//! Isolation between engagements is structural: each has its own
//! [`EngagementStateMachine`][crate::state_machine::EngagementStateMachine] and
//! config path, and no operation here reaches across engagement boundaries
//! except the bulk shutdown helpers.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use cyberred_collab::{CheckPriority, Checkpointer, EventBus, PreFlightRunner};
use serde_json::json;
use tokio::sync::Mutex;

use crate::context::{AgentRecord, EngagementContext, EngagementSummary, FindingRecord};
use crate::error::{Error, Result};
use crate::state_machine::EngagementState;

fn validate_engagement_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    if bytes.len() == 1 {
        return bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit();
    }
    let first_ok = bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit();
    let last_ok = {
        let b = bytes[bytes.len() - 1];
        b.is_ascii_lowercase() || b.is_ascii_digit()
    };
    let middle_ok = bytes[1..bytes.len() - 1]
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
    first_ok && last_ok && middle_ok
}

#[derive(Debug, Default, Clone)]
pub struct ShutdownResult {
    pub paused_ids: Vec<String>,
    pub checkpoint_paths: HashMap<String, Option<String>>,
    pub errors: Vec<String>,
}

struct Inner {
    engagements: HashMap<String, EngagementContext>,
    subscriptions: HashMap<String, HashSet<String>>,
}

pub struct SessionManager {
    max_engagements: usize,
    max_history: usize,
    event_bus: Arc<dyn EventBus>,
    checkpointer: Arc<dyn Checkpointer>,
    preflight: Arc<dyn PreFlightRunner>,
    inner: Mutex<Inner>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        max_engagements: usize,
        max_history: usize,
        event_bus: Arc<dyn EventBus>,
        checkpointer: Arc<dyn Checkpointer>,
        preflight: Arc<dyn PreFlightRunner>,
    ) -> Self {
        Self {
            max_engagements,
            max_history,
            event_bus,
            checkpointer,
            preflight,
            inner: Mutex::new(Inner {
                engagements: HashMap::new(),
                subscriptions: HashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn max_engagements(&self) -> usize {
        self.max_engagements
    }

    #[must_use]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.engagements.values().filter(|e| e.is_active()).count()
    }

    pub async fn remaining_capacity(&self) -> usize {
        self.max_engagements.saturating_sub(self.active_count().await)
    }

    fn prune_history(inner: &mut Inner, max_history: usize) {
        if inner.engagements.len() < max_history {
            return;
        }
        let mut candidates: Vec<(String, chrono::DateTime<Utc>)> = inner
            .engagements
            .values()
            .filter(|e| !e.is_active())
            .map(|e| (e.id.clone(), e.created_at))
            .collect();
        candidates.sort_by_key(|(_, created_at)| *created_at);

        let num_to_remove = inner.engagements.len().saturating_sub(max_history) + 1;
        for (id, _) in candidates.into_iter().take(num_to_remove) {
            inner.engagements.remove(&id);
            tracing::info!(engagement_id = %id, "engagement_pruned");
        }
    }

    /// Create a new engagement from a YAML config file. The engagement name
    /// comes from the config's `name` key, falling back to the file stem.
    pub async fn create_engagement(&self, config_path: PathBuf) -> Result<String> {
        let mut inner = self.inner.lock().await;

        if inner.engagements.values().filter(|e| e.is_active()).count() >= self.max_engagements {
            return Err(Error::ResourceLimit {
                limit_type: "max_engagements".into(),
                current_value: inner.engagements.values().filter(|e| e.is_active()).count(),
                max_value: self.max_engagements,
            });
        }

        Self::prune_history(&mut inner, self.max_history);

        if inner.engagements.len() >= self.max_history {
            return Err(Error::ResourceLimit {
                limit_type: "max_history".into(),
                current_value: inner.engagements.len(),
                max_value: self.max_history,
            });
        }

        if !config_path.exists() {
            return Err(Error::Configuration {
                config_path: config_path.display().to_string(),
                reason: "config file not found".into(),
            });
        }

        let raw = std::fs::read_to_string(&config_path).map_err(|e| Error::Configuration {
            config_path: config_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let parsed: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(|e| Error::Configuration {
            config_path: config_path.display().to_string(),
            reason: format!("invalid YAML: {e}"),
        })?;
        let stem = config_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("engagement");
        let name = parsed
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(stem)
            .to_lowercase();

        if !validate_engagement_name(&name) {
            return Err(Error::Configuration {
                config_path: config_path.display().to_string(),
                reason: format!(
                    "invalid engagement name '{name}': must contain only lowercase letters, \
                     numbers, and hyphens, and start/end with a letter or number"
                ),
            });
        }

        let now = Utc::now();
        let engagement_id = cyberred_common::ids::engagement_id(&name, now);
        let context = EngagementContext::new(engagement_id.clone(), config_path, now);

        inner.engagements.insert(engagement_id.clone(), context);

        tracing::info!(engagement_id = %engagement_id, "engagement_created");
        Ok(engagement_id)
    }

    pub async fn list_engagements(&self) -> Vec<EngagementSummary> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<EngagementSummary> = inner.engagements.values().map(EngagementSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    pub async fn get_summary(&self, engagement_id: &str) -> Result<EngagementSummary> {
        let inner = self.inner.lock().await;
        inner
            .engagements
            .get(engagement_id)
            .map(EngagementSummary::from)
            .ok_or_else(|| Error::NotFound {
                engagement_id: engagement_id.to_string(),
            })
    }

    async fn publish_state_change(&self, engagement_id: &str, old: EngagementState, new: EngagementState) {
        let event = json!({
            "event_type": cyberred_protocol::event_types::STATE_CHANGE,
            "data": {
                "engagement_id": engagement_id,
                "old_state": old.to_string(),
                "new_state": new.to_string(),
            },
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.broadcast_event(engagement_id, event).await;
    }

    /// Start an engagement: runs pre-flight checks, then INITIALIZING -> RUNNING.
    pub async fn start_engagement(&self, engagement_id: &str, ignore_warnings: bool) -> Result<EngagementState> {
        let config_path = {
            let inner = self.inner.lock().await;
            inner
                .engagements
                .get(engagement_id)
                .map(|c| c.config_path.clone())
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?
        };

        let results = self.preflight.run_all(&config_path).await;
        cyberred_collab::validate_results(&results, ignore_warnings).map_err(Error::PreFlightFailed)?;

        tracing::info!(
            engagement_id,
            checks = results.len(),
            p0_failures = results
                .iter()
                .filter(|r| matches!(r.priority, CheckPriority::P0) && matches!(r.status, cyberred_collab::CheckStatus::Fail))
                .count(),
            "preflight_checks_completed"
        );

        let (old, new) = {
            let mut inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get_mut(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            let old = ctx.state();
            let new = ctx.state_machine.start()?;
            (old, new)
        };
        self.publish_state_change(engagement_id, old, new).await;
        tracing::info!(engagement_id, state = %new, "engagement_started");
        Ok(new)
    }

    /// Pause is a hot-state transition: RAM only, no I/O, completes immediately.
    pub async fn pause_engagement(&self, engagement_id: &str) -> Result<EngagementState> {
        let (old, new) = {
            let mut inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get_mut(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            let old = ctx.state();
            (old, ctx.state_machine.pause()?)
        };
        self.publish_state_change(engagement_id, old, new).await;
        tracing::info!(engagement_id, state = %new, "engagement_paused");
        Ok(new)
    }

    pub async fn resume_engagement(&self, engagement_id: &str) -> Result<EngagementState> {
        let (old, new) = {
            let mut inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get_mut(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            let old = ctx.state();
            (old, ctx.state_machine.resume()?)
        };
        self.publish_state_change(engagement_id, old, new).await;
        tracing::info!(engagement_id, state = %new, "engagement_resumed");
        Ok(new)
    }

    /// Stop is a cold-state transition: a checkpoint is written before the
    /// state machine transitions, so a crash mid-stop never loses state that
    /// was never persisted.
    pub async fn stop_engagement(&self, engagement_id: &str) -> Result<(EngagementState, Option<String>)> {
        let (config_path, current_state) = {
            let inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            (ctx.config_path.clone(), ctx.state())
        };

        if !crate::state_machine::is_valid_transition(current_state, EngagementState::Stopped) {
            return Err(Error::InvalidTransition {
                engagement_id: engagement_id.to_string(),
                from: current_state.to_string(),
                to: EngagementState::Stopped.to_string(),
            });
        }

        let scope_path = read_scope_path(&config_path);
        let checkpoint_path = self
            .checkpointer
            .save(engagement_id, scope_path.as_deref())
            .await
            .map_err(|e| Error::Message(format!("checkpoint failed: {e}")))?;

        let (old, new) = {
            let mut inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get_mut(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            let old = ctx.state();
            (old, ctx.state_machine.stop()?)
        };
        self.publish_state_change(engagement_id, old, new).await;
        tracing::info!(engagement_id, state = %new, checkpoint_path, "engagement_stopped");
        Ok((new, Some(checkpoint_path)))
    }

    pub async fn complete_engagement(&self, engagement_id: &str) -> Result<EngagementState> {
        let (old, new) = {
            let mut inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get_mut(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            let old = ctx.state();
            (old, ctx.state_machine.complete()?)
        };
        self.publish_state_change(engagement_id, old, new).await;
        tracing::info!(engagement_id, state = %new, "engagement_completed");
        Ok(new)
    }

    /// Removes a STOPPED or COMPLETED engagement from tracking and deletes
    /// its checkpoint. Returns `false` if the engagement was never tracked.
    pub async fn remove_engagement(&self, engagement_id: &str) -> Result<bool> {
        let state = {
            let inner = self.inner.lock().await;
            match inner.engagements.get(engagement_id) {
                None => return Ok(false),
                Some(ctx) => ctx.state(),
            }
        };

        if !matches!(state, EngagementState::Stopped | EngagementState::Completed) {
            return Err(Error::InvalidTransition {
                engagement_id: engagement_id.to_string(),
                from: state.to_string(),
                to: "REMOVED".into(),
            });
        }

        self.checkpointer
            .delete(engagement_id)
            .await
            .map_err(|e| Error::Message(format!("checkpoint delete failed: {e}")))?;

        let mut inner = self.inner.lock().await;
        inner.engagements.remove(engagement_id);
        inner.subscriptions.remove(engagement_id);
        tracing::info!(engagement_id, "engagement_removed");
        Ok(true)
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    /// Subscribe to an engagement's event stream. Only RUNNING or PAUSED
    /// engagements can be subscribed to; the caller fans delivery out over
    /// the event bus channel `engagement:{id}:events`.
    pub async fn subscribe_to_engagement(&self, engagement_id: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .engagements
            .get(engagement_id)
            .ok_or_else(|| Error::NotFound {
                engagement_id: engagement_id.to_string(),
            })?
            .state();

        if !matches!(state, EngagementState::Running | EngagementState::Paused) {
            return Err(Error::InvalidTransition {
                engagement_id: engagement_id.to_string(),
                from: state.to_string(),
                to: "SUBSCRIBED".into(),
            });
        }

        let subscription_id = cyberred_common::ids::subscription_id();
        inner
            .subscriptions
            .entry(engagement_id.to_string())
            .or_default()
            .insert(subscription_id.clone());

        tracing::info!(engagement_id, subscription_id = %subscription_id, "subscription_created");
        Ok(subscription_id)
    }

    /// Safe to call even if the subscription doesn't exist.
    pub async fn unsubscribe(&self, subscription_id: &str) {
        let mut inner = self.inner.lock().await;
        let mut found_in: Option<String> = None;
        for (engagement_id, subs) in inner.subscriptions.iter_mut() {
            if subs.remove(subscription_id) {
                found_in = Some(engagement_id.clone());
                break;
            }
        }
        if let Some(engagement_id) = found_in {
            if inner.subscriptions.get(&engagement_id).is_some_and(HashSet::is_empty) {
                inner.subscriptions.remove(&engagement_id);
            }
            tracing::info!(engagement_id, subscription_id, "subscription_removed");
        } else {
            tracing::debug!(subscription_id, "subscription_not_found");
        }
    }

    pub async fn subscription_count(&self, engagement_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .subscriptions
            .get(engagement_id)
            .map_or(0, HashSet::len)
    }

    /// Publish an event to everything subscribed to `engagement_id`. Returns
    /// the subscriber count at time of publish.
    pub async fn broadcast_event(&self, engagement_id: &str, event: serde_json::Value) -> usize {
        let count = self.subscription_count(engagement_id).await;
        if count > 0 {
            self.event_bus.publish(&format!("engagement:{engagement_id}:events"), event).await;
        }
        count
    }

    /// Record (or replace) an agent's hot-state status and publish
    /// `AGENT_STATUS` to any attached subscribers.
    pub async fn record_agent(&self, engagement_id: &str, record: AgentRecord) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get_mut(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            ctx.record_agent(record.clone());
        }
        let event = json!({
            "event_type": cyberred_protocol::event_types::AGENT_STATUS,
            "data": record,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.broadcast_event(engagement_id, event).await;
        Ok(())
    }

    /// Record a finding and publish `FINDING` to any attached subscribers.
    pub async fn record_finding(&self, engagement_id: &str, record: FindingRecord) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            let ctx = inner
                .engagements
                .get_mut(engagement_id)
                .ok_or_else(|| Error::NotFound {
                    engagement_id: engagement_id.to_string(),
                })?;
            ctx.record_finding(record.clone());
        }
        let event = json!({
            "event_type": cyberred_protocol::event_types::FINDING,
            "data": record,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.broadcast_event(engagement_id, event).await;
        Ok(())
    }

    // ── Graceful shutdown ────────────────────────────────────────────────

    /// Pause every RUNNING engagement. Continues past individual failures so
    /// one misbehaving engagement can't block state preservation for others.
    pub async fn pause_all_engagements(&self) -> Vec<String> {
        let running: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .engagements
                .values()
                .filter(|e| e.state() == EngagementState::Running)
                .map(|e| e.id.clone())
                .collect()
        };

        let mut paused_ids = Vec::new();
        for engagement_id in running {
            match self.pause_engagement(&engagement_id).await {
                Ok(_) => paused_ids.push(engagement_id),
                Err(e) => tracing::error!(engagement_id, error = %e, "pause_all_engagement_failed"),
            }
        }
        tracing::info!(paused_count = paused_ids.len(), "pause_all_completed");
        paused_ids
    }

    /// Checkpoint (stop) every PAUSED engagement.
    pub async fn checkpoint_all_engagements(&self) -> (HashMap<String, Option<String>>, Vec<String>) {
        let paused: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .engagements
                .values()
                .filter(|e| e.state() == EngagementState::Paused)
                .map(|e| e.id.clone())
                .collect()
        };

        let mut checkpoint_paths = HashMap::new();
        let mut errors = Vec::new();
        for engagement_id in paused {
            match self.stop_engagement(&engagement_id).await {
                Ok((_, path)) => {
                    checkpoint_paths.insert(engagement_id, path);
                }
                Err(e) => errors.push(format!("checkpoint failed for {engagement_id}: {e}")),
            }
        }
        tracing::info!(
            checkpoint_count = checkpoint_paths.len(),
            error_count = errors.len(),
            "checkpoint_all_completed"
        );
        (checkpoint_paths, errors)
    }

    pub async fn graceful_shutdown(&self) -> ShutdownResult {
        let paused_ids = self.pause_all_engagements().await;
        let (checkpoint_paths, errors) = self.checkpoint_all_engagements().await;
        tracing::info!(
            paused_count = paused_ids.len(),
            checkpoint_count = checkpoint_paths.len(),
            error_count = errors.len(),
            "graceful_shutdown_complete"
        );
        ShutdownResult {
            paused_ids,
            checkpoint_paths,
            errors,
        }
    }

    /// Publish a single event to every engagement channel with at least one
    /// subscriber (used to tell clients a shutdown is imminent).
    pub async fn notify_all_clients(&self, event: serde_json::Value) -> usize {
        let channels: Vec<(String, usize)> = {
            let inner = self.inner.lock().await;
            inner
                .subscriptions
                .iter()
                .map(|(id, subs)| (id.clone(), subs.len()))
                .collect()
        };
        let mut total = 0;
        for (engagement_id, count) in channels {
            self.event_bus.publish(&format!("engagement:{engagement_id}:events"), event.clone()).await;
            total += count;
        }
        tracing::info!(notifications_sent = total, "notify_all_clients_complete");
        total
    }

    pub async fn disconnect_all_clients(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let total: usize = inner.subscriptions.values().map(HashSet::len).sum();
        inner.subscriptions.clear();
        tracing::info!(subscriptions_cleared = total, "disconnect_all_clients_complete");
        total
    }
}

fn read_scope_path(config_path: &Path) -> Option<PathBuf> {
    let raw = std::fs::read_to_string(config_path).ok()?;
    let parsed: serde_yaml::Value = serde_yaml::from_str(&raw).ok()?;
    let scope_path = parsed.get("scope_path").and_then(|v| v.as_str());
    match scope_path {
        Some(p) => Some(PathBuf::from(p)),
        None => config_path.parent().map(|dir| dir.join("scope.yaml")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyberred_collab::{NoopCheckpointer, NoopEventBus, NoopPreFlightRunner};

    fn manager(max_engagements: usize, max_history: usize) -> SessionManager {
        SessionManager::new(
            max_engagements,
            max_history,
            Arc::new(NoopEventBus),
            Arc::new(NoopCheckpointer),
            Arc::new(NoopPreFlightRunner),
        )
    }

    fn write_config(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(format!("{name}.yaml"));
        std::fs::write(&path, format!("name: {name}\n")).unwrap();
        path
    }

    #[tokio::test]
    async fn create_then_start_then_pause_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(10, 50);
        let config = write_config(&dir, "acme");

        let id = mgr.create_engagement(config).await.unwrap();
        assert_eq!(mgr.get_summary(&id).await.unwrap().state, EngagementState::Initializing);

        mgr.start_engagement(&id, false).await.unwrap();
        assert_eq!(mgr.get_summary(&id).await.unwrap().state, EngagementState::Running);

        mgr.pause_engagement(&id).await.unwrap();
        assert_eq!(mgr.get_summary(&id).await.unwrap().state, EngagementState::Paused);

        mgr.resume_engagement(&id).await.unwrap();
        assert_eq!(mgr.get_summary(&id).await.unwrap().state, EngagementState::Running);
    }

    #[tokio::test]
    async fn stop_then_complete_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(10, 50);
        let config = write_config(&dir, "acme");
        let id = mgr.create_engagement(config).await.unwrap();
        mgr.start_engagement(&id, false).await.unwrap();

        let (state, checkpoint) = mgr.stop_engagement(&id).await.unwrap();
        assert_eq!(state, EngagementState::Stopped);
        assert!(checkpoint.is_some());

        mgr.complete_engagement(&id).await.unwrap();
        assert!(mgr.remove_engagement(&id).await.unwrap());
        assert!(mgr.get_summary(&id).await.is_err());
    }

    #[tokio::test]
    async fn cannot_remove_active_engagement() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(10, 50);
        let config = write_config(&dir, "acme");
        let id = mgr.create_engagement(config).await.unwrap();

        assert!(mgr.remove_engagement(&id).await.is_err());
    }

    #[tokio::test]
    async fn resource_limit_blocks_new_active_engagement() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(1, 50);
        let config1 = write_config(&dir, "acme-one");
        mgr.create_engagement(config1).await.unwrap();

        let config2 = write_config(&dir, "acme-two");
        let err = mgr.create_engagement(config2).await.unwrap_err();
        assert!(matches!(err, Error::ResourceLimit { .. }));
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "name: Not_Valid!\n").unwrap();
        let mgr = manager(10, 50);
        assert!(mgr.create_engagement(path).await.is_err());
    }

    #[tokio::test]
    async fn subscribe_requires_running_or_paused() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(10, 50);
        let config = write_config(&dir, "acme");
        let id = mgr.create_engagement(config).await.unwrap();

        assert!(mgr.subscribe_to_engagement(&id).await.is_err());
        mgr.start_engagement(&id, false).await.unwrap();
        let sub = mgr.subscribe_to_engagement(&id).await.unwrap();
        assert_eq!(mgr.subscription_count(&id).await, 1);

        mgr.unsubscribe(&sub).await;
        assert_eq!(mgr.subscription_count(&id).await, 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_pauses_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(10, 50);
        let config = write_config(&dir, "acme");
        let id = mgr.create_engagement(config).await.unwrap();
        mgr.start_engagement(&id, false).await.unwrap();

        let result = mgr.graceful_shutdown().await;
        assert_eq!(result.paused_ids, vec![id.clone()]);
        assert!(result.checkpoint_paths.contains_key(&id));
        assert!(result.errors.is_empty());
        assert_eq!(mgr.get_summary(&id).await.unwrap().state, EngagementState::Stopped);
    }
}

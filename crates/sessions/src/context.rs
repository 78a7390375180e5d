use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::state_machine::{EngagementState, EngagementStateMachine};

/// Hot-state record of one agent's last-known status, kept in RAM for the
/// life of the engagement. Distinct from the checkpoint store's persisted
/// agent snapshot: this is what `engagement.attach` hands back to a client
/// that just joined, not what survives a restart.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub agent_type: String,
    pub state: Value,
    pub last_action_id: Option<String>,
    pub decision_context: Option<Value>,
}

/// Hot-state record of one finding, kept in RAM alongside the agent that
/// raised it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FindingRecord {
    pub finding_id: String,
    pub data: Value,
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Everything the manager tracks for one engagement.
pub struct EngagementContext {
    pub id: String,
    pub state_machine: EngagementStateMachine,
    pub config_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub agents: Vec<AgentRecord>,
    pub findings: Vec<FindingRecord>,
}

impl EngagementContext {
    pub fn new(id: impl Into<String>, config_path: PathBuf, created_at: DateTime<Utc>) -> Self {
        let id = id.into();
        Self {
            state_machine: EngagementStateMachine::new(id.clone()),
            id,
            config_path,
            created_at,
            agents: Vec::new(),
            findings: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> EngagementState {
        self.state_machine.current_state()
    }

    /// Active engagements count against `max_engagements`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            EngagementState::Initializing | EngagementState::Running | EngagementState::Paused
        )
    }

    /// Insert or replace an agent's hot-state record by id.
    pub fn record_agent(&mut self, record: AgentRecord) {
        match self.agents.iter_mut().find(|a| a.agent_id == record.agent_id) {
            Some(existing) => *existing = record,
            None => self.agents.push(record),
        }
    }

    pub fn record_finding(&mut self, record: FindingRecord) {
        self.findings.push(record);
    }
}

/// Immutable snapshot of an engagement for external consumption (IPC list and attach).
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngagementSummary {
    pub id: String,
    pub state: EngagementState,
    pub agent_count: u32,
    pub finding_count: u32,
    pub created_at: DateTime<Utc>,
    pub agents: Vec<AgentRecord>,
    pub findings: Vec<FindingRecord>,
}

impl From<&EngagementContext> for EngagementSummary {
    fn from(ctx: &EngagementContext) -> Self {
        Self {
            id: ctx.id.clone(),
            state: ctx.state(),
            agent_count: ctx.agents.len() as u32,
            finding_count: ctx.findings.len() as u32,
            created_at: ctx.created_at,
            agents: ctx.agents.clone(),
            findings: ctx.findings.clone(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub agent_type: String,
    pub state: Value,
    pub last_action_id: Option<String>,
    pub decision_context: Option<Value>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Finding {
    pub finding_id: String,
    pub data: Value,
    pub agent_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CheckpointData {
    pub engagement_id: String,
    pub scope_hash: String,
    pub created_at: DateTime<Utc>,
    pub schema_version: String,
    pub agents: Vec<AgentState>,
    pub findings: Vec<Finding>,
}

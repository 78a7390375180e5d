//! Shape of one audit record: a lifecycle or scope-decision event, bound to
//! whatever came before it by a hash chain (see [`crate::signature`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
        }
    }
}

/// A single entry appended to the audit trail. `id` and `signature` are
/// assigned by the store; everything else is supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub engagement_id: Option<String>,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(
        engagement_id: Option<String>,
        event_type: impl Into<String>,
        event_data: serde_json::Value,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            engagement_id,
            event_type: event_type.into(),
            event_data,
            actor: actor.into(),
            timestamp,
            signature: None,
        }
    }

    /// A scope-decision record: `event_type` is always `"scope_validation"`
    /// and `event_data` carries the decision, target, and reason.
    #[must_use]
    pub fn scope_decision(
        engagement_id: Option<String>,
        decision: Decision,
        target: Option<&str>,
        command: Option<&str>,
        reason: &str,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            engagement_id,
            "scope_validation",
            serde_json::json!({
                "decision": decision.as_str(),
                "target": target,
                "command": command,
                "reason": reason,
            }),
            actor,
            timestamp,
        )
    }
}

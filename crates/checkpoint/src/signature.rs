//! Content-based integrity signature.
//!
//! Hashing the logical content (not the SQLite file bytes) means the
//! signature survives VACUUM, page reordering, or any other byte-level
//! change that doesn't alter what the checkpoint actually says.

use sha2::{Digest, Sha256};

use crate::model::{AgentState, Finding};

pub fn calculate_content_signature(
    engagement_id: &str,
    scope_hash: &str,
    created_at: &str,
    agents: &[AgentState],
    findings: &[Finding],
) -> String {
    let mut agents_sorted = agents.to_vec();
    agents_sorted.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    let mut findings_sorted = findings.to_vec();
    findings_sorted.sort_by(|a, b| a.finding_id.cmp(&b.finding_id));

    let agents_json: Vec<serde_json::Value> = agents_sorted
        .iter()
        .map(|a| {
            serde_json::json!({
                "id": a.agent_id,
                "type": a.agent_type,
                "state": canonical(&a.state),
                "context": a.decision_context.as_ref().map(canonical),
                "action": a.last_action_id,
            })
        })
        .collect();

    let findings_json: Vec<serde_json::Value> = findings_sorted
        .iter()
        .map(|f| {
            serde_json::json!({
                "id": f.finding_id,
                "json": canonical(&f.data),
                "agent": f.agent_id,
                "ts": f.timestamp.map(|t| t.to_rfc3339()).unwrap_or_else(|| created_at.to_string()),
            })
        })
        .collect();

    let data = serde_json::json!({
        "engagement_id": engagement_id,
        "scope_hash": scope_hash,
        "created_at": created_at,
        "agents": agents_json,
        "findings": findings_json,
    });

    let canonical_bytes = canonical(&data).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sorts object keys recursively so two semantically-equal JSON values
/// always serialize to the same bytes.
fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_across_key_order() {
        let agent_a = AgentState {
            agent_id: "a1".into(),
            agent_type: "recon".into(),
            state: serde_json::json!({"b": 2, "a": 1}),
            last_action_id: None,
            decision_context: None,
        };
        let agent_b = AgentState {
            state: serde_json::json!({"a": 1, "b": 2}),
            ..agent_a.clone()
        };

        let sig_a = calculate_content_signature("eng-1", "hash", "2026-01-01T00:00:00Z", &[agent_a], &[]);
        let sig_b = calculate_content_signature("eng-1", "hash", "2026-01-01T00:00:00Z", &[agent_b], &[]);
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn signature_changes_with_content() {
        let base = calculate_content_signature("eng-1", "hash", "2026-01-01T00:00:00Z", &[], &[]);
        let changed = calculate_content_signature("eng-1", "different-hash", "2026-01-01T00:00:00Z", &[], &[]);
        assert_ne!(base, changed);
    }
}

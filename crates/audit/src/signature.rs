//! Hash-chained signature: each record's signature covers its own content
//! plus the previous record's signature, so altering or deleting any entry
//! invalidates every signature after it.

use sha2::{Digest, Sha256};

use crate::model::AuditRecord;

/// Signature used as the chain head before any record has been written.
pub const GENESIS_SIGNATURE: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[must_use]
pub fn calculate_record_signature(record: &AuditRecord, previous_signature: &str) -> String {
    let data = serde_json::json!({
        "engagement_id": record.engagement_id,
        "event_type": record.event_type,
        "event_data": canonical(&record.event_data),
        "actor": record.actor,
        "timestamp": record.timestamp.to_rfc3339(),
        "previous_signature": previous_signature,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical(&data).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

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
    use chrono::Utc;

    fn record() -> AuditRecord {
        AuditRecord::new(Some("eng-1".into()), "scope_validation", serde_json::json!({"b": 2, "a": 1}), "daemon", Utc::now())
    }

    #[test]
    fn signature_is_stable_across_key_order() {
        let mut a = record();
        let mut b = record();
        a.event_data = serde_json::json!({"a": 1, "b": 2});
        b.event_data = serde_json::json!({"b": 2, "a": 1});
        a.timestamp = b.timestamp;

        assert_eq!(
            calculate_record_signature(&a, GENESIS_SIGNATURE),
            calculate_record_signature(&b, GENESIS_SIGNATURE)
        );
    }

    #[test]
    fn signature_depends_on_previous_signature() {
        let record = record();
        let sig_a = calculate_record_signature(&record, GENESIS_SIGNATURE);
        let sig_b = calculate_record_signature(&record, "some-other-previous-signature");
        assert_ne!(sig_a, sig_b);
    }
}

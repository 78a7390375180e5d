//! Append-only, hash-chained audit trail backed by its own SQLite file
//! (kept separate from engagement checkpoint data, per architecture).

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::model::AuditRecord;
use crate::signature::{calculate_record_signature, GENESIS_SIGNATURE};

pub struct AuditStore {
    pool: SqlitePool,
}

impl AuditStore {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                engagement_id    TEXT,
                event_type       TEXT NOT NULL,
                event_data       TEXT,
                actor            TEXT NOT NULL,
                timestamp        TEXT NOT NULL,
                signature        TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_engagement_ts ON audit (engagement_id, timestamp)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:")).await
    }

    async fn last_signature(&self) -> Result<String> {
        let row = sqlx::query("SELECT signature FROM audit ORDER BY id DESC LIMIT 1").fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get::<String, _>("signature")).unwrap_or_else(|| GENESIS_SIGNATURE.to_string()))
    }

    /// Appends `record`, stamping it with a signature chained off the most
    /// recently written record. Returns the record's assigned id.
    pub async fn append(&self, mut record: AuditRecord) -> Result<i64> {
        let previous = self.last_signature().await?;
        let signature = calculate_record_signature(&record, &previous);
        record.signature = Some(signature.clone());

        let result = sqlx::query(
            "INSERT INTO audit (engagement_id, event_type, event_data, actor, timestamp, signature)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.engagement_id)
        .bind(&record.event_type)
        .bind(record.event_data.to_string())
        .bind(&record.actor)
        .bind(record.timestamp.to_rfc3339())
        .bind(&signature)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::info!(id, event_type = %record.event_type, engagement_id = ?record.engagement_id, "audit_record_appended");
        Ok(id)
    }

    /// Total number of records ever appended, across all engagements.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM audit").fetch_one(&self.pool).await?;
        Ok(row.get("n"))
    }

    pub async fn for_engagement(&self, engagement_id: &str) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            "SELECT id, engagement_id, event_type, event_data, actor, timestamp, signature
             FROM audit WHERE engagement_id = ? ORDER BY id ASC",
        )
        .bind(engagement_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_record).collect()
    }

    /// Walks every record in id order, recomputing the chain and reporting
    /// the id of the first one whose signature doesn't match.
    pub async fn verify_chain(&self) -> Result<Option<i64>> {
        let rows = sqlx::query("SELECT id, engagement_id, event_type, event_data, actor, timestamp, signature FROM audit ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut previous = GENESIS_SIGNATURE.to_string();
        for row in rows {
            let record = row_to_record(row)?;
            let expected = calculate_record_signature(&record, &previous);
            let actual = record.signature.clone().unwrap_or_default();
            if expected != actual {
                return Ok(record.id);
            }
            previous = actual;
        }
        Ok(None)
    }
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<AuditRecord> {
    let event_data_raw: Option<String> = row.get("event_data");
    let event_data = event_data_raw
        .map(|raw| serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null))
        .unwrap_or(serde_json::Value::Null);
    let timestamp_raw: String = row.get("timestamp");
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(AuditRecord {
        id: Some(row.get("id")),
        engagement_id: row.get("engagement_id"),
        event_type: row.get("event_type"),
        event_data,
        actor: row.get("actor"),
        timestamp,
        signature: row.get("signature"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Decision;

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = AuditStore::open_in_memory().await.unwrap();
        let id1 = store
            .append(AuditRecord::scope_decision(Some("eng-1".into()), Decision::Allow, Some("10.0.0.5"), None, "in_scope", "daemon", Utc::now()))
            .await
            .unwrap();
        let id2 = store
            .append(AuditRecord::scope_decision(Some("eng-1".into()), Decision::Deny, Some("10.0.1.5"), None, "ip_out_of_scope", "daemon", Utc::now()))
            .await
            .unwrap();
        assert!(id2 > id1);
    }

    #[tokio::test]
    async fn chain_verifies_clean_after_appends() {
        let store = AuditStore::open_in_memory().await.unwrap();
        for i in 0..5 {
            store
                .append(AuditRecord::new(Some("eng-1".into()), "scope_validation", serde_json::json!({"i": i}), "daemon", Utc::now()))
                .await
                .unwrap();
        }
        assert_eq!(store.verify_chain().await.unwrap(), None);
    }

    #[tokio::test]
    async fn chain_detects_tampering() {
        let store = AuditStore::open_in_memory().await.unwrap();
        store
            .append(AuditRecord::new(Some("eng-1".into()), "scope_validation", serde_json::json!({"n": 1}), "daemon", Utc::now()))
            .await
            .unwrap();
        store
            .append(AuditRecord::new(Some("eng-1".into()), "scope_validation", serde_json::json!({"n": 2}), "daemon", Utc::now()))
            .await
            .unwrap();

        sqlx::query("UPDATE audit SET event_data = '{\"n\": 999}' WHERE id = 1").execute(&store.pool).await.unwrap();

        assert_eq!(store.verify_chain().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn for_engagement_filters_and_orders_by_id() {
        let store = AuditStore::open_in_memory().await.unwrap();
        store
            .append(AuditRecord::new(Some("eng-1".into()), "a", serde_json::json!({}), "daemon", Utc::now()))
            .await
            .unwrap();
        store
            .append(AuditRecord::new(Some("eng-2".into()), "b", serde_json::json!({}), "daemon", Utc::now()))
            .await
            .unwrap();
        store
            .append(AuditRecord::new(Some("eng-1".into()), "c", serde_json::json!({}), "daemon", Utc::now()))
            .await
            .unwrap();

        let records = store.for_engagement("eng-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "a");
        assert_eq!(records[1].event_type, "c");
    }
}

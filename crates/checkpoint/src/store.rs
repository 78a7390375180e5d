//! Cold-state persistence: one SQLite file per engagement, written
//! atomically and signed so tampering or partial writes are detectable on
//! load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use cyberred_collab::{Checkpointer, ServiceError, ServiceResult};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::model::{AgentState, CheckpointData, Finding};
use crate::schema::{self, CURRENT_SCHEMA_VERSION};
use crate::signature::calculate_content_signature;

pub struct CheckpointStore {
    engagements_dir: PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            engagements_dir: base_path.into().join("engagements"),
        }
    }

    fn checkpoint_path(&self, engagement_id: &str) -> PathBuf {
        self.engagements_dir.join(engagement_id).join("checkpoint.sqlite")
    }

    async fn open_pool(path: &Path) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true).foreign_keys(true);
        Ok(SqlitePoolOptions::new().max_connections(1).connect_with(options).await?)
    }

    async fn set_metadata(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn get_metadata(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Save engagement state. Writes to a temp file, signs it, then
    /// atomically renames into place so a crash mid-write never leaves a
    /// half-written checkpoint at the canonical path.
    pub async fn save(
        &self,
        engagement_id: &str,
        scope_path: Option<&Path>,
        agents: &[AgentState],
        findings: &[Finding],
    ) -> Result<PathBuf> {
        let final_path = self.checkpoint_path(engagement_id);
        let temp_path = final_path.with_extension("sqlite.tmp");

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if tokio::fs::try_exists(&temp_path).await.unwrap_or(false) {
            tokio::fs::remove_file(&temp_path).await?;
        }

        let result = self.write_checkpoint(&temp_path, engagement_id, scope_path, agents, findings, &final_path).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return result.map(|()| final_path);
        }

        tokio::fs::rename(&temp_path, &final_path).await?;
        tracing::info!(
            engagement_id,
            checkpoint_path = %final_path.display(),
            agent_count = agents.len(),
            finding_count = findings.len(),
            "checkpoint_saved"
        );
        Ok(final_path)
    }

    async fn write_checkpoint(
        &self,
        temp_path: &Path,
        engagement_id: &str,
        scope_path: Option<&Path>,
        agents: &[AgentState],
        findings: &[Finding],
        final_path: &Path,
    ) -> Result<()> {
        let pool = Self::open_pool(temp_path).await?;
        schema::initialize(&pool).await?;

        let scope_hash = match scope_path {
            Some(path) if path.exists() => hash_file(path).await?,
            _ => String::new(),
        };

        let created_at = Utc::now().to_rfc3339();
        Self::set_metadata(&pool, "engagement_id", engagement_id).await?;
        Self::set_metadata(&pool, "scope_hash", &scope_hash).await?;
        Self::set_metadata(&pool, "created_at", &created_at).await?;
        Self::set_metadata(&pool, "schema_version", CURRENT_SCHEMA_VERSION).await?;

        sqlx::query(
            "INSERT INTO engagements (id, name, scope_hash, state, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(engagement_id)
        .bind(format!("Engagement {engagement_id}"))
        .bind(&scope_hash)
        .bind("RUNNING")
        .bind(&created_at)
        .bind(&created_at)
        .execute(&pool)
        .await?;

        for agent in agents {
            sqlx::query(
                "INSERT INTO agents \
                 (agent_id, engagement_id, agent_type, state_json, last_action_id, decision_context, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&agent.agent_id)
            .bind(engagement_id)
            .bind(&agent.agent_type)
            .bind(serde_json::to_string(&agent.state)?)
            .bind(&agent.last_action_id)
            .bind(agent.decision_context.as_ref().map(serde_json::to_string).transpose()?)
            .bind(&created_at)
            .execute(&pool)
            .await?;
        }

        for finding in findings {
            let timestamp = finding.timestamp.map(|t| t.to_rfc3339()).unwrap_or_else(|| created_at.clone());
            sqlx::query(
                "INSERT INTO findings (finding_id, engagement_id, finding_json, agent_id, timestamp) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&finding.finding_id)
            .bind(engagement_id)
            .bind(serde_json::to_string(&finding.data)?)
            .bind(&finding.agent_id)
            .bind(timestamp)
            .execute(&pool)
            .await?;
        }

        let signature = calculate_content_signature(engagement_id, &scope_hash, &created_at, agents, findings);
        Self::set_metadata(&pool, "signature", &signature).await?;

        sqlx::query("INSERT INTO checkpoints (engagement_id, checkpoint_path, signature, created_at) VALUES (?, ?, ?, ?)")
            .bind(engagement_id)
            .bind(final_path.display().to_string())
            .bind(&signature)
            .bind(&created_at)
            .execute(&pool)
            .await?;

        pool.close().await;
        Ok(())
    }

    /// Load and verify a checkpoint. Signature mismatch and (when requested)
    /// scope-hash mismatch both fail closed.
    pub async fn load(&self, checkpoint_path: &Path, scope_path: Option<&Path>, verify_scope: bool) -> Result<CheckpointData> {
        if !checkpoint_path.exists() {
            return Err(Error::NotFound(checkpoint_path.display().to_string()));
        }

        let pool = Self::open_pool(checkpoint_path).await?;
        let engagement_id = Self::get_metadata(&pool, "engagement_id").await?.unwrap_or_default();
        let scope_hash = Self::get_metadata(&pool, "scope_hash").await?.unwrap_or_default();
        let created_at_str = Self::get_metadata(&pool, "created_at").await?.unwrap_or_default();
        let schema_version = Self::get_metadata(&pool, "schema_version").await?.unwrap_or_default();
        let signature = Self::get_metadata(&pool, "signature").await?.unwrap_or_default();

        if !schema_version.is_empty() && parse_version(&schema_version) > parse_version(CURRENT_SCHEMA_VERSION) {
            return Err(Error::IncompatibleSchema {
                checkpoint_version: schema_version,
                current_version: CURRENT_SCHEMA_VERSION.to_string(),
            });
        }

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let agent_rows = sqlx::query("SELECT * FROM agents").fetch_all(&pool).await?;
        let mut agents = Vec::with_capacity(agent_rows.len());
        for row in agent_rows {
            let decision_context: Option<String> = row.get("decision_context");
            agents.push(AgentState {
                agent_id: row.get("agent_id"),
                agent_type: row.get("agent_type"),
                state: serde_json::from_str(&row.get::<String, _>("state_json"))?,
                last_action_id: row.get("last_action_id"),
                decision_context: decision_context.map(|s| serde_json::from_str(&s)).transpose()?,
            });
        }

        let finding_rows = sqlx::query("SELECT * FROM findings").fetch_all(&pool).await?;
        let mut findings = Vec::with_capacity(finding_rows.len());
        for row in finding_rows {
            let timestamp: String = row.get("timestamp");
            findings.push(Finding {
                finding_id: row.get("finding_id"),
                data: serde_json::from_str(&row.get::<String, _>("finding_json"))?,
                agent_id: row.get("agent_id"),
                timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp).ok().map(|d| d.with_timezone(&Utc)),
            });
        }
        pool.close().await;

        let calculated = calculate_content_signature(&engagement_id, &scope_hash, &created_at_str, &agents, &findings);
        if signature != calculated {
            tracing::warn!(checkpoint_path = %checkpoint_path.display(), "checkpoint_signature_mismatch");
            return Err(Error::Integrity {
                checkpoint_path: checkpoint_path.display().to_string(),
                verification_type: "signature",
                detail: "checkpoint signature mismatch - content modified".into(),
            });
        }

        if verify_scope {
            if let Some(scope_path) = scope_path {
                if !scope_hash.is_empty() && scope_path.exists() {
                    let current_hash = hash_file(scope_path).await?;
                    if current_hash != scope_hash {
                        return Err(Error::Integrity {
                            checkpoint_path: checkpoint_path.display().to_string(),
                            verification_type: "scope",
                            detail: format!(
                                "scope file changed since checkpoint was created (expected {}..., got {}...)",
                                &scope_hash[..16.min(scope_hash.len())],
                                &current_hash[..16.min(current_hash.len())]
                            ),
                        });
                    }
                }
            }
        }

        tracing::info!(
            engagement_id,
            checkpoint_path = %checkpoint_path.display(),
            agent_count = agents.len(),
            finding_count = findings.len(),
            "checkpoint_loaded"
        );

        Ok(CheckpointData {
            engagement_id,
            scope_hash,
            created_at,
            schema_version,
            agents,
            findings,
        })
    }

    /// Verify a checkpoint's signature without scope validation.
    pub async fn verify(&self, checkpoint_path: &Path) -> bool {
        self.load(checkpoint_path, None, false).await.is_ok()
    }

    pub async fn delete(&self, engagement_id: &str) -> Result<bool> {
        let path = self.checkpoint_path(engagement_id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path).await?;
            tracing::info!(engagement_id, path = %path.display(), "checkpoint_deleted");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub async fn list_checkpoints(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut checkpoints = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.engagements_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(checkpoints),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let checkpoint_path = entry.path().join("checkpoint.sqlite");
            if checkpoint_path.exists() {
                checkpoints.push((entry.file_name().to_string_lossy().to_string(), checkpoint_path));
            }
        }
        Ok(checkpoints)
    }
}

/// Parses `"major.minor.patch"` into a tuple for ordering; malformed or
/// missing components fall back to zero rather than rejecting the checkpoint.
fn parse_version(version: &str) -> (u32, u32, u32) {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

async fn hash_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[async_trait]
impl Checkpointer for CheckpointStore {
    async fn save(&self, engagement_id: &str, scope_path: Option<&Path>) -> ServiceResult<String> {
        CheckpointStore::save(self, engagement_id, scope_path, &[], &[])
            .await
            .map(|path| path.display().to_string())
            .map_err(|e| ServiceError::message(e.to_string()))
    }

    async fn delete(&self, engagement_id: &str) -> ServiceResult<()> {
        CheckpointStore::delete(self, engagement_id)
            .await
            .map(|_| ())
            .map_err(|e| ServiceError::message(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let agent = AgentState {
            agent_id: "a1".into(),
            agent_type: "recon".into(),
            state: serde_json::json!({"step": 3}),
            last_action_id: Some("act-1".into()),
            decision_context: None,
        };
        let path = store.save("eng-1", None, &[agent], &[]).await.unwrap();
        assert!(path.exists());

        let data = store.load(&path, None, true).await.unwrap();
        assert_eq!(data.engagement_id, "eng-1");
        assert_eq!(data.agents.len(), 1);
        assert_eq!(data.agents[0].agent_id, "a1");
    }

    #[tokio::test]
    async fn tampered_checkpoint_fails_signature_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let path = store.save("eng-1", None, &[], &[]).await.unwrap();

        let pool = CheckpointStore::open_pool(&path).await.unwrap();
        CheckpointStore::set_metadata(&pool, "signature", "deadbeef").await.unwrap();
        pool.close().await;

        let err = store.load(&path, None, true).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { verification_type: "signature", .. }));
    }

    #[tokio::test]
    async fn scope_hash_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let scope_path = dir.path().join("scope.yaml");
        tokio::fs::write(&scope_path, b"targets: [10.0.0.0/8]").await.unwrap();

        let path = store.save("eng-1", Some(&scope_path), &[], &[]).await.unwrap();

        tokio::fs::write(&scope_path, b"targets: [10.0.0.0/24]").await.unwrap();
        let err = store.load(&path, Some(&scope_path), true).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { verification_type: "scope", .. }));
    }

    #[tokio::test]
    async fn delete_removes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save("eng-1", None, &[], &[]).await.unwrap();

        assert!(CheckpointStore::delete(&store, "eng-1").await.unwrap());
        assert!(!CheckpointStore::delete(&store, "eng-1").await.unwrap());
    }

    #[tokio::test]
    async fn list_checkpoints_finds_saved_engagements() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save("eng-1", None, &[], &[]).await.unwrap();
        store.save("eng-2", None, &[], &[]).await.unwrap();

        let mut listed = store.list_checkpoints().await.unwrap();
        listed.sort();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "eng-1");
        assert_eq!(listed[1].0, "eng-2");
    }
}

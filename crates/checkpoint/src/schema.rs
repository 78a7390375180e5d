//! SQLite schema for a checkpoint file.
//!
//! One checkpoint is one SQLite database. Bumping
//! [`CURRENT_SCHEMA_VERSION`] is only needed for changes that existing
//! readers would misinterpret; additive changes that old code safely
//! ignores don't need a bump.

pub const CURRENT_SCHEMA_VERSION: &str = "2.0.0";

pub async fn initialize(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS engagements (
            id         TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            scope_hash TEXT NOT NULL,
            state      TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS agents (
            agent_id          TEXT NOT NULL,
            engagement_id     TEXT NOT NULL REFERENCES engagements(id),
            agent_type        TEXT NOT NULL,
            state_json        TEXT NOT NULL,
            last_action_id    TEXT,
            decision_context  TEXT,
            updated_at        TEXT NOT NULL,
            PRIMARY KEY (agent_id, engagement_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS findings (
            finding_id    TEXT NOT NULL,
            engagement_id TEXT NOT NULL REFERENCES engagements(id),
            finding_json  TEXT NOT NULL,
            agent_id      TEXT,
            timestamp     TEXT NOT NULL,
            PRIMARY KEY (finding_id, engagement_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS checkpoints (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            engagement_id   TEXT NOT NULL REFERENCES engagements(id),
            checkpoint_path TEXT NOT NULL,
            signature       TEXT NOT NULL,
            created_at      TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS audit (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            engagement_id TEXT NOT NULL REFERENCES engagements(id),
            event_type    TEXT NOT NULL,
            event_data    TEXT,
            actor         TEXT NOT NULL,
            timestamp     TEXT NOT NULL,
            signature     TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_agents_engagement ON agents(engagement_id)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_agents_type ON agents(agent_type)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_findings_engagement ON findings(engagement_id)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_findings_agent ON findings(agent_id)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_findings_timestamp ON findings(timestamp)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_checkpoints_engagement ON checkpoints(engagement_id)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_engagement_ts ON audit(engagement_id, timestamp)").execute(pool).await?;

    Ok(())
}

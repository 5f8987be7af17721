//! SQLite-based build history store

use crate::persistence::{BuildRecord, BuildStatus, PersistenceBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS builds (
        id TEXT PRIMARY KEY,
        pipeline_name TEXT NOT NULL,
        status TEXT NOT NULL,
        model_count INTEGER NOT NULL DEFAULT 0,
        step_count INTEGER NOT NULL DEFAULT 0,
        edge_count INTEGER NOT NULL DEFAULT 0,
        definition_path TEXT,
        error TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pipeline_name ON builds(pipeline_name)",
    "CREATE INDEX IF NOT EXISTS idx_created_at ON builds(created_at)",
];

const SELECT_COLUMNS: &str = "SELECT id, pipeline_name, status, model_count, step_count, edge_count, \
     definition_path, error, created_at FROM builds";

/// SQLite build store
pub struct SqliteBuildStore {
    pool: SqlitePool,
}

impl SqliteBuildStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Database file under the user's local data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mlpipeline")
            .join("builds.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(db_dir) = db_path.parent() {
            std::fs::create_dir_all(db_dir)
                .with_context(|| format!("Failed to create {}", db_dir.display()))?;
        }
        Self::new(&db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize build history schema")?;
        }
        Ok(())
    }

    fn from_row(row: &SqliteRow) -> Result<BuildRecord> {
        let created_at: String = row.try_get("created_at")?;
        Ok(BuildRecord {
            build_id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            pipeline_name: row.try_get("pipeline_name")?,
            status: BuildStatus::parse(&row.try_get::<String, _>("status")?),
            model_count: row.try_get::<i64, _>("model_count")? as usize,
            step_count: row.try_get::<i64, _>("step_count")? as usize,
            edge_count: row.try_get::<i64, _>("edge_count")? as usize,
            definition_path: row.try_get("definition_path")?,
            error: row.try_get("error")?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .with_context(|| format!("Invalid build timestamp '{}'", created_at))?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteBuildStore {
    async fn save_build(&self, record: &BuildRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO builds
            (id, pipeline_name, status, model_count, step_count, edge_count, definition_path, error, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(record.build_id.to_string())
        .bind(&record.pipeline_name)
        .bind(record.status.as_str())
        .bind(record.model_count as i64)
        .bind(record.step_count as i64)
        .bind(record.edge_count as i64)
        .bind(&record.definition_path)
        .bind(&record.error)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save build")?;

        Ok(())
    }

    async fn load_build(&self, build_id: Uuid) -> Result<Option<BuildRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(build_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load build")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_builds(&self, pipeline_name: &str) -> Result<Vec<BuildRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE pipeline_name = ?1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list builds")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT pipeline_name FROM builds ORDER BY pipeline_name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;

        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("pipeline_name")?))
            .collect()
    }
}

//! # Database Schema
//!
//! The schema is small and embedded; every statement is idempotent so `run_all` is safe
//! to call on every startup.

use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA: &[(&str, &str)] = &[
    (
        "offline_queue",
        r#"
        CREATE TABLE IF NOT EXISTS offline_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_json TEXT NOT NULL,
            agent TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL DEFAULT '',
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            error TEXT NOT NULL DEFAULT ''
        )
        "#,
    ),
    (
        "idx_offline_queue_status",
        "CREATE INDEX IF NOT EXISTS idx_offline_queue_status ON offline_queue(status)",
    ),
    (
        "idx_offline_queue_claim",
        "CREATE INDEX IF NOT EXISTS idx_offline_queue_claim ON offline_queue(status, priority DESC, id)",
    ),
    (
        "job_runs",
        r#"
        CREATE TABLE IF NOT EXISTS job_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL DEFAULT '',
            agent TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            error TEXT NOT NULL DEFAULT '',
            output_summary TEXT NOT NULL DEFAULT '',
            output_file TEXT,
            task_json TEXT NOT NULL,
            result_json TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "idx_job_runs_job_id",
        "CREATE INDEX IF NOT EXISTS idx_job_runs_job_id ON job_runs(job_id)",
    ),
];

/// Applies the embedded schema
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Create all tables and indexes that do not exist yet
    pub async fn run_all(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        for (name, statement) in SCHEMA {
            debug!(object = name, "Applying schema statement");
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }
}

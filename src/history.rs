//! # Task History
//!
//! Audit trail of terminal task outcomes. The drainer writes a record for every queued
//! task that completes or fails on its own merits; availability requeues are not
//! recorded.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::Result;
use crate::execution::{Task, TaskResult};

const OUTPUT_SUMMARY_CHARS: usize = 1000;

/// One terminal execution of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub job_id: String,
    pub name: String,
    pub source: String,
    pub agent: String,
    pub task: Task,
    pub result: TaskResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output_file: Option<String>,
}

impl HistoryRecord {
    /// Build a record for a finished attempt, deriving the start time from its duration
    pub fn from_outcome(task: &Task, result: &TaskResult, agent: &str) -> Self {
        let finished_at = Utc::now();
        let started_at = finished_at - ChronoDuration::milliseconds(result.duration_ms.max(0));

        Self {
            job_id: task.id.clone(),
            name: task.name.clone(),
            source: task.source.clone(),
            agent: agent.to_string(),
            task: task.clone(),
            result: result.clone(),
            started_at,
            finished_at,
            output_file: (!result.output_file.is_empty()).then(|| result.output_file.clone()),
        }
    }

    pub fn output_summary(&self) -> String {
        self.result.output.chars().take(OUTPUT_SUMMARY_CHARS).collect()
    }
}

/// Destination for terminal outcomes
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, record: HistoryRecord) -> Result<()>;

    /// Session/activity tracking for successful runs; no-op unless a sink tracks it
    async fn record_activity(&self, _task: &Task, _result: &TaskResult, _agent: &str) -> Result<()> {
        Ok(())
    }
}

/// History sink writing to the `job_runs` table
#[derive(Debug, Clone)]
pub struct SqliteHistorySink {
    pool: SqlitePool,
}

impl SqliteHistorySink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent records first
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, name, source, agent, output_file, task_json, result_json,
                   started_at, finished_at
            FROM job_runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let task_json: String = row.try_get("task_json")?;
            let result_json: String = row.try_get("result_json")?;
            records.push(HistoryRecord {
                job_id: row.try_get("job_id")?,
                name: row.try_get("name")?,
                source: row.try_get("source")?,
                agent: row.try_get("agent")?,
                output_file: row.try_get("output_file")?,
                task: serde_json::from_str(&task_json)?,
                result: serde_json::from_str(&result_json)?,
                started_at: row.try_get("started_at")?,
                finished_at: row.try_get("finished_at")?,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl HistorySink for SqliteHistorySink {
    async fn record(&self, record: HistoryRecord) -> Result<()> {
        let task_json = serde_json::to_string(&record.task)?;
        let result_json = serde_json::to_string(&record.result)?;

        sqlx::query(
            r#"
            INSERT INTO job_runs
                (job_id, name, source, agent, status, error, output_summary, output_file,
                 task_json, result_json, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.job_id)
        .bind(&record.name)
        .bind(&record.source)
        .bind(&record.agent)
        .bind(record.result.status.to_string())
        .bind(&record.result.error)
        .bind(record.output_summary())
        .bind(&record.output_file)
        .bind(task_json)
        .bind(result_json)
        .bind(record.started_at)
        .bind(record.finished_at)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %record.job_id, status = %record.result.status, "Recorded history");
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::str::FromStr;

use crate::constants::QueueStatus;
use crate::database::millis_to_datetime;
use crate::execution::Task;

/// A unit of buffered work as stored in `offline_queue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: i64,
    /// Serialized task, opaque to the store
    pub task_json: String,
    pub agent: String,
    pub source: String,
    pub priority: i64,
    pub status: QueueStatus,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last failure message, empty on success
    pub error: String,
}

impl QueuedTask {
    pub fn decode_task(&self) -> Result<Task, serde_json::Error> {
        serde_json::from_str(&self.task_json)
    }
}

impl<'r> FromRow<'r, SqliteRow> for QueuedTask {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = QueueStatus::from_str(&status).map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: e.into(),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            task_json: row.try_get("task_json")?,
            agent: row.try_get("agent")?,
            source: row.try_get("source")?,
            priority: row.try_get("priority")?,
            status,
            retry_count: row.try_get("retry_count")?,
            created_at: millis_to_datetime(row.try_get("created_at")?),
            updated_at: millis_to_datetime(row.try_get("updated_at")?),
            error: row.try_get("error")?,
        })
    }
}

/// Insert payload for a new queue item
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueuedTask {
    pub task_json: String,
    pub agent: String,
    pub source: String,
    pub priority: i64,
}

impl NewQueuedTask {
    pub fn from_task(task: &Task, agent: &str, priority: i64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            task_json: serde_json::to_string(task)?,
            agent: agent.to_string(),
            source: task.source.clone(),
            priority,
        })
    }
}

/// Item counts per lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub expired: i64,
}

impl QueueCounts {
    pub(crate) fn set(&mut self, status: QueueStatus, count: i64) {
        match status {
            QueueStatus::Pending => self.pending = count,
            QueueStatus::Processing => self.processing = count,
            QueueStatus::Completed => self.completed = count,
            QueueStatus::Failed => self.failed = count,
            QueueStatus::Expired => self.expired = count,
        }
    }

    /// Items counted against the queue ceiling
    pub fn active(&self) -> i64 {
        self.pending + self.processing
    }

    pub fn total(&self) -> i64 {
        self.active() + self.completed + self.failed + self.expired
    }
}

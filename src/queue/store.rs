use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::constants::{QueueStatus, TTL_EXCEEDED_ERROR};
use crate::database::now_millis;
use crate::error::{DispatchError, Result};
use crate::execution::Task;
use crate::logging::log_queue_operation;
use crate::queue::{NewQueuedTask, QueueCounts, QueuedTask};

const RETURNING_COLUMNS: &str =
    "id, task_json, agent, source, priority, status, retry_count, created_at, updated_at, error";

const RETRYABLE_STATUSES: [QueueStatus; 2] = [QueueStatus::Pending, QueueStatus::Failed];

/// SQLite-backed offline queue. Every call re-reads authoritative state.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    pool: SqlitePool,
}

impl OfflineQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a new `pending` item and return its id.
    ///
    /// Never refuses for capacity; callers check [`is_full`](Self::is_full) first.
    #[instrument(skip(self, item), fields(agent = %item.agent, priority = item.priority))]
    pub async fn enqueue(&self, item: NewQueuedTask) -> Result<i64> {
        let now = now_millis();
        let row = sqlx::query(
            r#"
            INSERT INTO offline_queue
                (task_json, agent, source, priority, status, retry_count, created_at, updated_at, error)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?, '')
            RETURNING id
            "#,
        )
        .bind(&item.task_json)
        .bind(&item.agent)
        .bind(&item.source)
        .bind(item.priority)
        .bind(QueueStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        log_queue_operation("enqueue", id, QueueStatus::Pending, 0, Some(item.source.as_str()));
        Ok(id)
    }

    /// Serialize a task and enqueue it
    pub async fn enqueue_task(&self, task: &Task, agent: &str, priority: i64) -> Result<i64> {
        let item = NewQueuedTask::from_task(task, agent, priority)?;
        self.enqueue(item).await
    }

    /// Number of `pending` plus `processing` items
    pub async fn count_active(&self) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS active FROM offline_queue WHERE status IN (?, ?)",
        )
        .bind(QueueStatus::Pending.as_str())
        .bind(QueueStatus::Processing.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("active")?)
    }

    /// Whether active items have reached the ceiling
    pub async fn is_full(&self, max_items: i64) -> Result<bool> {
        Ok(self.count_active().await? >= max_items)
    }

    /// Claim the highest-priority, oldest `pending` item.
    ///
    /// Selection and the `pending → processing` transition happen in one statement.
    pub async fn dequeue_next(&self) -> Result<Option<QueuedTask>> {
        let sql = format!(
            r#"
            UPDATE offline_queue
            SET status = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM offline_queue
                WHERE status = ?
                ORDER BY priority DESC, id ASC
                LIMIT 1
            )
            AND status = ?
            RETURNING {RETURNING_COLUMNS}
            "#
        );

        let item = sqlx::query_as::<_, QueuedTask>(&sql)
            .bind(QueueStatus::Processing.as_str())
            .bind(now_millis())
            .bind(QueueStatus::Pending.as_str())
            .bind(QueueStatus::Pending.as_str())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(item) = &item {
            debug!(
                queue_id = item.id,
                priority = item.priority,
                retry_count = item.retry_count,
                "Claimed queue item"
            );
        }

        Ok(item)
    }

    /// Set an item's status and error message
    pub async fn update_status(&self, id: i64, status: QueueStatus, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE offline_queue SET status = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::NotFound { id });
        }
        Ok(())
    }

    /// Same as [`update_status`](Self::update_status), also bumping `retry_count`
    pub async fn increment_retry(&self, id: i64, status: QueueStatus, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE offline_queue
            SET status = ?, error = ?, retry_count = retry_count + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::NotFound { id });
        }
        Ok(())
    }

    /// Expire `pending` items created more than `ttl` ago. `processing` items are
    /// never touched.
    pub async fn expire_stale(&self, ttl: Duration) -> Result<u64> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(ttl_ms);

        let result = sqlx::query(
            r#"
            UPDATE offline_queue
            SET status = ?, error = ?, updated_at = ?
            WHERE status = ? AND created_at < ?
            "#,
        )
        .bind(QueueStatus::Expired.as_str())
        .bind(TTL_EXCEEDED_ERROR)
        .bind(now_millis())
        .bind(QueueStatus::Pending.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            info!(count = expired, ttl_ms, "Expired stale queue items");
        }
        Ok(expired)
    }

    /// Delete terminal items last updated more than `older_than_days` ago
    pub async fn prune(&self, older_than_days: u32) -> Result<u64> {
        let window_ms = i64::from(older_than_days) * 24 * 60 * 60 * 1000;
        let cutoff = now_millis().saturating_sub(window_ms);

        let result = sqlx::query(
            "DELETE FROM offline_queue WHERE status IN (?, ?, ?) AND updated_at < ?",
        )
        .bind(QueueStatus::Completed.as_str())
        .bind(QueueStatus::Failed.as_str())
        .bind(QueueStatus::Expired.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            info!(count = pruned, older_than_days, "Pruned terminal queue items");
        }
        Ok(pruned)
    }

    /// Reset `processing` items left behind by a previous process
    pub async fn recover_orphaned(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE offline_queue SET status = ?, updated_at = ? WHERE status = ?",
        )
        .bind(QueueStatus::Pending.as_str())
        .bind(now_millis())
        .bind(QueueStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(count = recovered, "Recovered orphaned processing items");
        }
        Ok(recovered)
    }

    /// Items in dequeue order, optionally filtered by status
    pub async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueuedTask>> {
        let items = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {RETURNING_COLUMNS} FROM offline_queue WHERE status = ? ORDER BY priority DESC, id ASC"
                );
                sqlx::query_as::<_, QueuedTask>(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {RETURNING_COLUMNS} FROM offline_queue ORDER BY priority DESC, id ASC"
                );
                sqlx::query_as::<_, QueuedTask>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(items)
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueuedTask>> {
        let sql = format!("SELECT {RETURNING_COLUMNS} FROM offline_queue WHERE id = ?");
        let item = sqlx::query_as::<_, QueuedTask>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    /// Remove an item regardless of status. Returns false if it did not exist.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn counts_by_status(&self) -> Result<QueueCounts> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS total FROM offline_queue GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            match QueueStatus::from_str(&status) {
                Ok(status) => counts.set(status, total),
                Err(e) => warn!(status = %status, error = %e, "Ignoring unknown queue status"),
            }
        }
        Ok(counts)
    }

    /// Claim a specific item for a manual retry: `pending | failed → processing`.
    ///
    /// Expired items are terminal and stay expired.
    pub async fn claim_for_retry(&self, id: i64) -> Result<QueuedTask> {
        let sql = format!(
            r#"
            UPDATE offline_queue
            SET status = ?, updated_at = ?
            WHERE id = ? AND status IN (?, ?)
            RETURNING {RETURNING_COLUMNS}
            "#
        );

        let claimed = sqlx::query_as::<_, QueuedTask>(&sql)
            .bind(QueueStatus::Processing.as_str())
            .bind(now_millis())
            .bind(id)
            .bind(RETRYABLE_STATUSES[0].as_str())
            .bind(RETRYABLE_STATUSES[1].as_str())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(item) = claimed {
            return Ok(item);
        }

        match self.get(id).await? {
            None => Err(DispatchError::NotFound { id }),
            Some(item) => Err(DispatchError::InvalidState {
                id,
                status: item.status,
                expected: RETRYABLE_STATUSES
                    .iter()
                    .map(QueueStatus::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

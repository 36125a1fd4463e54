use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::OfflineQueueConfig;
use crate::error::Result;
use crate::execution::{Task, TaskExecutor, TaskResult};
use crate::queue::OfflineQueue;

/// Result of submitting a task
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The attempt finished, successfully or with a non-availability failure
    Completed(TaskResult),
    /// No provider was available; the task was buffered for the drainer
    Queued { queue_id: i64 },
    /// No provider was available and the queue could not take the task
    Rejected(TaskResult),
}

impl DispatchOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// Runs a task once and falls back to the offline queue when every provider is down
pub struct OfflineDispatcher {
    executor: Arc<dyn TaskExecutor>,
    queue: OfflineQueue,
    config: OfflineQueueConfig,
    limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for OfflineDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OfflineDispatcher {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        queue: OfflineQueue,
        config: OfflineQueueConfig,
        limiter: Arc<Semaphore>,
    ) -> Self {
        Self {
            executor,
            queue,
            config,
            limiter,
        }
    }

    /// Execute `task` for `agent`, queueing it at `priority` if no provider takes it.
    ///
    /// Storage errors while checking capacity or enqueueing are returned to the caller.
    pub async fn dispatch(
        &self,
        token: CancellationToken,
        task: Task,
        agent: &str,
        priority: i64,
    ) -> Result<DispatchOutcome> {
        let result = self
            .executor
            .execute(token, task.clone(), Arc::clone(&self.limiter), agent)
            .await;

        if !result.is_availability_failure() {
            return Ok(DispatchOutcome::Completed(result));
        }

        if !self.config.enabled {
            return Ok(DispatchOutcome::Rejected(result));
        }

        if self.queue.is_full(self.config.max_items).await? {
            warn!(
                task_id = %task.short_id(),
                max_items = self.config.max_items,
                "Offline queue is full, task not queued"
            );
            return Ok(DispatchOutcome::Rejected(result));
        }

        let queue_id = self.queue.enqueue_task(&task, agent, priority).await?;
        info!(
            queue_id,
            task_id = %task.short_id(),
            name = %task.name,
            "Task queued for offline retry"
        );
        Ok(DispatchOutcome::Queued { queue_id })
    }
}

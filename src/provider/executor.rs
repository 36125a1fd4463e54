use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::ExecutionStatus;
use crate::execution::{FailureKind, Task, TaskExecutor, TaskResult};
use crate::provider::ProviderDispatcher;

/// [`TaskExecutor`] that runs tasks through the provider failover path
#[derive(Debug, Clone)]
pub struct ProviderExecutor {
    dispatcher: Arc<ProviderDispatcher>,
}

impl ProviderExecutor {
    pub fn new(dispatcher: Arc<ProviderDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<ProviderDispatcher> {
        &self.dispatcher
    }
}

#[async_trait]
impl TaskExecutor for ProviderExecutor {
    async fn execute(
        &self,
        token: CancellationToken,
        task: Task,
        limiter: Arc<Semaphore>,
        agent: &str,
    ) -> TaskResult {
        let started = Instant::now();

        let _permit = tokio::select! {
            permit = limiter.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return TaskResult::failure(&task, FailureKind::Task, "concurrency limiter closed");
                }
            },
            _ = token.cancelled() => {
                return TaskResult::failure(&task, FailureKind::Task, "cancelled before start")
                    .with_status(ExecutionStatus::Cancelled);
            }
        };

        let role = if task.role.is_empty() {
            agent
        } else {
            task.role.as_str()
        };
        debug!(task_id = %task.short_id(), name = %task.name, role = %role, "Executing task");

        let duration_ms = || i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match self.dispatcher.execute(&token, &task, role).await {
            Ok(response) => {
                let mut result = TaskResult::success(&task, response.output)
                    .with_provider(response.provider)
                    .with_duration_ms(duration_ms());
                result.cost_usd = response.cost_usd;
                result.output_file = response.output_file;
                if !response.session_id.is_empty() {
                    result.session_id = response.session_id;
                }
                result
            }
            Err(failure) => {
                let status = if failure.cancelled {
                    ExecutionStatus::Cancelled
                } else {
                    ExecutionStatus::Error
                };
                let mut result = TaskResult::failure(&task, failure.kind, failure.message)
                    .with_status(status)
                    .with_duration_ms(duration_ms());
                if let Some(provider) = failure.provider {
                    result.provider = provider;
                }
                result
            }
        }
    }
}

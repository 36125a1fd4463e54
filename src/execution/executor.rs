use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::execution::{Task, TaskResult};

/// Performs a single execution attempt of a task for an agent.
///
/// Implementations report every outcome through [`TaskResult`], never through a panic or
/// an `Err`. A result that failed because no provider would take the work must carry
/// [`FailureKind::ProvidersUnavailable`](crate::execution::FailureKind) so the caller can
/// queue or requeue it.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        token: CancellationToken,
        task: Task,
        limiter: Arc<Semaphore>,
        agent: &str,
    ) -> TaskResult;
}

//! # Offline Queue Drainer
//!
//! Background control loop that replays queued tasks once a provider accepts traffic
//! again.
//!
//! Each tick:
//! 1. expires `pending` items older than the TTL and notifies about the batch
//! 2. prunes old terminal items, at most once per prune interval
//! 3. consults the [`AvailabilityGate`] and skips the tick if nothing is available
//! 4. claims and executes items back to back until the queue is empty, the token is
//!    cancelled, availability is lost between items, or an item is requeued
//!
//! A requeued item is only reclaimed on a later tick, so each tick spends at most one
//! of an item's retries.
//!
//! Cancellation is observed at tick boundaries and between items. An attempt already
//! handed to the executor runs to completion.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::constants::{
    defaults, QueueStatus, QUEUE_RETRY_SOURCE_PREFIX, QUEUE_SOURCE_PREFIX,
};
use crate::error::{DispatchError, Result};
use crate::execution::{Task, TaskExecutor, TaskResult};
use crate::history::{HistoryRecord, HistorySink};
use crate::logging::log_queue_operation;
use crate::notify::{truncate, Notifier};
use crate::orchestration::AvailabilityGate;
use crate::queue::{OfflineQueue, QueuedTask};

/// Drainer cadence and retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct DrainerSettings {
    pub tick_interval: Duration,
    pub ttl: Duration,
    /// Availability requeues allowed before an item fails
    pub max_retries: i64,
    pub recover_on_startup: bool,
    pub prune_interval: Duration,
    pub retention_days: u32,
    pub max_concurrency: usize,
}

impl DrainerSettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            tick_interval: config.drainer.tick_interval(),
            ttl: config.offline_queue.ttl(),
            max_retries: config.offline_queue.max_retries,
            recover_on_startup: config.drainer.recover_on_startup,
            prune_interval: config.drainer.prune_interval(),
            retention_days: config.retention.queue_days,
            max_concurrency: config.drainer.max_concurrency,
        }
    }
}

impl Default for DrainerSettings {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub expired: u64,
    pub pruned: u64,
    pub available: bool,
    pub dequeued: u32,
    pub completed: u32,
    pub requeued: u32,
    pub failed: u32,
    /// Stopped early because the token was cancelled
    pub cancelled: bool,
}

/// Terminal or intermediate outcome of one drained item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    Requeued,
    Failed,
}

pub struct QueueDrainer {
    queue: OfflineQueue,
    gate: AvailabilityGate,
    executor: Arc<dyn TaskExecutor>,
    history: Arc<dyn HistorySink>,
    notifier: Arc<dyn Notifier>,
    limiter: Arc<Semaphore>,
    settings: DrainerSettings,
    last_prune: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for QueueDrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDrainer")
            .field("gate", &self.gate)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl QueueDrainer {
    pub fn new(
        queue: OfflineQueue,
        gate: AvailabilityGate,
        executor: Arc<dyn TaskExecutor>,
        history: Arc<dyn HistorySink>,
        notifier: Arc<dyn Notifier>,
        settings: DrainerSettings,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            queue,
            gate,
            executor,
            history,
            notifier,
            limiter,
            settings,
            last_prune: Mutex::new(None),
        }
    }

    /// Share a concurrency limiter with foreground dispatch
    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn settings(&self) -> &DrainerSettings {
        &self.settings
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Run until `token` is cancelled. Per-tick errors are logged and the loop continues.
    pub async fn run(&self, token: CancellationToken) {
        let period = self.settings.tick_interval;
        info!(
            tick_interval_ms = period.as_millis() as u64,
            ttl_secs = self.settings.ttl.as_secs(),
            max_retries = self.settings.max_retries,
            "Starting offline queue drainer"
        );

        if self.settings.recover_on_startup {
            match self.queue.recover_orphaned().await {
                Ok(0) => {}
                Ok(count) => info!(count, "Reset orphaned processing items to pending"),
                Err(e) => error!(error = %e, "Orphan recovery failed"),
            }
        }

        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Offline queue drainer stopped");
                    return;
                }
                _ = timer.tick() => {}
            }

            match self.tick(&token).await {
                Ok(report) if report.dequeued > 0 || report.expired > 0 => info!(
                    expired = report.expired,
                    dequeued = report.dequeued,
                    completed = report.completed,
                    requeued = report.requeued,
                    failed = report.failed,
                    "Drain cycle completed"
                ),
                Ok(report) => debug!(available = report.available, "Drain cycle idle"),
                Err(e) => error!(error = %e, "Drain cycle failed"),
            }
        }
    }

    /// One drain pass
    pub async fn tick(&self, token: &CancellationToken) -> Result<TickReport> {
        let mut report = TickReport::default();

        report.expired = self.queue.expire_stale(self.settings.ttl).await?;
        if report.expired > 0 {
            warn!(count = report.expired, "Queue items expired");
            self.notifier.notify(&format!(
                "Offline queue: {} item(s) expired (TTL {})",
                report.expired,
                format_duration(self.settings.ttl)
            ));
        }

        report.pruned = self.maybe_prune().await;

        report.available = self.gate.is_available();
        if !report.available {
            match self.gate.health() {
                Some(health) => debug!(
                    unhealthy = ?health.unhealthy_circuits(),
                    total_failures = health.total_failures(),
                    health_score = health.health_score(),
                    "No provider available, skipping drain"
                ),
                None => debug!("No provider available, skipping drain"),
            }
            return Ok(report);
        }

        loop {
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if report.dequeued > 0 && !self.gate.is_available() {
                info!(drained = report.dequeued, "Availability lost mid-drain");
                break;
            }

            let Some(item) = self.queue.dequeue_next().await? else {
                break;
            };
            report.dequeued += 1;

            match self.process_item(item).await {
                Ok(ItemOutcome::Completed) => report.completed += 1,
                Ok(ItemOutcome::Requeued) => {
                    report.requeued += 1;
                    debug!(drained = report.dequeued, "Providers unavailable, ending drain pass");
                    break;
                }
                Ok(ItemOutcome::Failed) => report.failed += 1,
                Err(e) => error!(error = %e, "Failed to settle queue item"),
            }
        }

        Ok(report)
    }

    /// Execute a claimed item and settle its status
    pub async fn process_item(&self, item: QueuedTask) -> Result<ItemOutcome> {
        let mut task = match item.decode_task() {
            Ok(task) => task,
            Err(e) => {
                error!(queue_id = item.id, error = %e, "Queued task payload is invalid");
                let message = format!("invalid task JSON: {e}");
                self.queue
                    .update_status(item.id, QueueStatus::Failed, &message)
                    .await?;
                log_queue_operation(
                    "fail",
                    item.id,
                    QueueStatus::Failed,
                    item.retry_count,
                    Some(message.as_str()),
                );
                return Ok(ItemOutcome::Failed);
            }
        };

        task.prepare_replay(QUEUE_SOURCE_PREFIX);
        info!(
            queue_id = item.id,
            task_id = %task.short_id(),
            name = %task.name,
            retry = item.retry_count + 1,
            "Retrying queued task"
        );

        let result = self.execute(&task, &item.agent).await;

        if result.is_success() {
            self.queue
                .update_status(item.id, QueueStatus::Completed, "")
                .await?;
            log_queue_operation(
                "complete",
                item.id,
                QueueStatus::Completed,
                item.retry_count,
                None,
            );
            self.record_history(&task, &result, &item.agent).await;
            if let Err(e) = self.history.record_activity(&task, &result, &item.agent).await {
                warn!(queue_id = item.id, error = %e, "Failed to record session activity");
            }
            self.notifier.notify(&format!(
                "Offline queue: task {:?} completed successfully (retry #{})",
                task.name,
                item.retry_count + 1
            ));
            return Ok(ItemOutcome::Completed);
        }

        if result.is_availability_failure() {
            if item.retry_count >= self.settings.max_retries {
                self.queue
                    .update_status(item.id, QueueStatus::Failed, &result.error)
                    .await?;
                log_queue_operation(
                    "fail",
                    item.id,
                    QueueStatus::Failed,
                    item.retry_count,
                    Some(result.error.as_str()),
                );
                warn!(
                    queue_id = item.id,
                    retries = self.settings.max_retries,
                    "Queued task failed after max retries"
                );
                self.notifier.notify(&format!(
                    "Offline queue: task {:?} failed after {} retries: {}",
                    task.name,
                    self.settings.max_retries,
                    truncate(&result.error, defaults::NOTIFY_ERROR_TRUNCATE)
                ));
                return Ok(ItemOutcome::Failed);
            }

            self.queue
                .increment_retry(item.id, QueueStatus::Pending, &result.error)
                .await?;
            info!(
                queue_id = item.id,
                retry = item.retry_count + 1,
                "Providers still unavailable, task requeued"
            );
            return Ok(ItemOutcome::Requeued);
        }

        self.queue
            .increment_retry(item.id, QueueStatus::Failed, &result.error)
            .await?;
        log_queue_operation(
            "fail",
            item.id,
            QueueStatus::Failed,
            item.retry_count + 1,
            Some(result.error.as_str()),
        );
        warn!(queue_id = item.id, error = %result.error, "Queued task failed with non-provider error");
        self.record_history(&task, &result, &item.agent).await;
        Ok(ItemOutcome::Failed)
    }

    /// Operator retry of one item, regardless of breaker state.
    ///
    /// Accepts `pending` and `failed` items; the item ends `completed` or `failed`.
    pub async fn retry_now(&self, id: i64) -> Result<TaskResult> {
        let item = self.queue.claim_for_retry(id).await?;

        let mut task = match item.decode_task() {
            Ok(task) => task,
            Err(e) => {
                self.queue
                    .update_status(id, QueueStatus::Failed, &format!("invalid task JSON: {e}"))
                    .await?;
                return Err(DispatchError::Payload(e));
            }
        };
        task.prepare_replay(QUEUE_RETRY_SOURCE_PREFIX);
        info!(queue_id = id, task_id = %task.short_id(), name = %task.name, "Manual queue retry");

        let result = self.execute(&task, &item.agent).await;
        if result.is_success() {
            self.queue
                .update_status(id, QueueStatus::Completed, "")
                .await?;
            log_queue_operation(
                "retry_complete",
                id,
                QueueStatus::Completed,
                item.retry_count,
                None,
            );
        } else {
            self.queue
                .increment_retry(id, QueueStatus::Failed, &result.error)
                .await?;
            log_queue_operation(
                "retry_fail",
                id,
                QueueStatus::Failed,
                item.retry_count + 1,
                Some(result.error.as_str()),
            );
        }
        self.record_history(&task, &result, &item.agent).await;

        Ok(result)
    }

    async fn execute(&self, task: &Task, agent: &str) -> TaskResult {
        // independent token: shutdown must not abort an attempt already started
        self.executor
            .execute(
                CancellationToken::new(),
                task.clone(),
                Arc::clone(&self.limiter),
                agent,
            )
            .await
    }

    async fn record_history(&self, task: &Task, result: &TaskResult, agent: &str) {
        let record = HistoryRecord::from_outcome(task, result, agent);
        if let Err(e) = self.history.record(record).await {
            warn!(task_id = %task.short_id(), error = %e, "Failed to record history");
        }
    }

    async fn maybe_prune(&self) -> u64 {
        let now = Instant::now();
        {
            let mut last_prune = self.last_prune.lock();
            if let Some(last) = *last_prune {
                if now.duration_since(last) < self.settings.prune_interval {
                    return 0;
                }
            }
            *last_prune = Some(now);
        }

        match self.queue.prune(self.settings.retention_days).await {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(error = %e, "Queue pruning failed");
                0
            }
        }
    }
}

/// Compact duration for operator messages: `1h`, `30m`, `45s`, `250ms`
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if duration.subsec_millis() != 0 || secs == 0 {
        return format!("{}ms", duration.as_millis());
    }
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

//! Shared fixtures for integration tests: throwaway databases, a scripted executor and
//! recording sinks.

#![allow(dead_code)]

use async_trait::async_trait;
use dispatch_core::database::{DatabaseConnection, DatabaseMigrations};
use dispatch_core::error::Result;
use dispatch_core::execution::{FailureKind, Task, TaskExecutor, TaskResult};
use dispatch_core::history::{HistoryRecord, HistorySink};
use dispatch_core::notify::Notifier;
use dispatch_core::queue::OfflineQueue;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Migrated SQLite database living in a temp directory for the test's lifetime
pub struct TestDb {
    pub connection: DatabaseConnection,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let connection = DatabaseConnection::connect_path(&dir.path().join("dispatch.db"))
            .await
            .expect("open database");
        DatabaseMigrations::run_all(connection.pool())
            .await
            .expect("migrate");
        Self {
            connection,
            _dir: dir,
        }
    }

    pub fn queue(&self) -> OfflineQueue {
        OfflineQueue::new(self.connection.pool().clone())
    }
}

/// What the scripted executor returns for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Unavailable,
    TaskError,
}

/// Executor that replays a script of outcomes, then succeeds
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(Task, String)>>,
}

impl ScriptedExecutor {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always_unavailable(times: usize) -> Arc<Self> {
        Self::new(std::iter::repeat(Step::Unavailable).take(times))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<(Task, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _token: CancellationToken,
        task: Task,
        _limiter: Arc<Semaphore>,
        agent: &str,
    ) -> TaskResult {
        self.calls.lock().push((task.clone(), agent.to_string()));
        let step = self.script.lock().pop_front().unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => TaskResult::success(&task, format!("done: {}", task.prompt)),
            Step::Unavailable => TaskResult::providers_unavailable(
                &task,
                "all providers unavailable: HTTP 503 overloaded",
            ),
            Step::TaskError => TaskResult::failure(&task, FailureKind::Task, "prompt rejected"),
        }
    }
}

#[derive(Default)]
pub struct RecordingHistory {
    records: Mutex<Vec<HistoryRecord>>,
    activity: Mutex<usize>,
}

impl RecordingHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().clone()
    }

    pub fn activity_count(&self) -> usize {
        *self.activity.lock()
    }
}

#[async_trait]
impl HistorySink for RecordingHistory {
    async fn record(&self, record: HistoryRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn record_activity(&self, _task: &Task, _result: &TaskResult, _agent: &str) -> Result<()> {
        *self.activity.lock() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

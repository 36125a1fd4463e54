//! Bootstrap wiring and the foreground submit path

mod common;

use common::{RecordingHistory, RecordingNotifier, ScriptedExecutor, Step};
use dispatch_core::config::DispatchConfig;
use dispatch_core::constants::QueueStatus;
use dispatch_core::execution::Task;
use dispatch_core::orchestration::{DispatchCore, DispatchOutcome};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn config_in(dir: &TempDir) -> DispatchConfig {
    let mut config = DispatchConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("core.db").display());
    config.providers = vec!["primary".to_string()];
    config.drainer.tick_interval_ms = 20;
    config
}

#[tokio::test]
async fn test_bootstrap_wires_shared_services() {
    let dir = tempfile::tempdir().unwrap();
    let core = DispatchCore::bootstrap(
        config_in(&dir),
        None,
        ScriptedExecutor::new(std::iter::empty()),
        RecordingHistory::new(),
        RecordingNotifier::new(),
    )
    .await
    .unwrap();

    assert!(core.circuit_breakers.is_some());
    assert_eq!(core.gate.providers().to_vec(), vec!["primary".to_string()]);
    assert!(core.gate.is_available());
    assert!(core.database.health_check().await.unwrap());
    assert_eq!(core.queue.count_active().await.unwrap(), 0);

    core.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.offline_queue.max_items = 0;

    let result = DispatchCore::bootstrap(
        config,
        None,
        ScriptedExecutor::new(std::iter::empty()),
        RecordingHistory::new(),
        RecordingNotifier::new(),
    )
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_dispatch_completes_queues_and_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.offline_queue.max_items = 1;

    let executor = ScriptedExecutor::new([
        Step::Succeed,
        Step::TaskError,
        Step::Unavailable,
        Step::Unavailable,
    ]);
    let core = DispatchCore::bootstrap(
        config,
        None,
        executor.clone(),
        RecordingHistory::new(),
        RecordingNotifier::new(),
    )
    .await
    .unwrap();
    let token = CancellationToken::new();

    let completed = core
        .dispatcher
        .dispatch(token.clone(), Task::new("ok", "hi"), "writer", 0)
        .await
        .unwrap();
    assert!(matches!(completed, DispatchOutcome::Completed(ref r) if r.is_success()));

    // Semantic failures go straight back to the caller
    let rejected_by_task = core
        .dispatcher
        .dispatch(token.clone(), Task::new("bad", "hi"), "writer", 0)
        .await
        .unwrap();
    assert!(matches!(rejected_by_task, DispatchOutcome::Completed(ref r) if !r.is_success()));

    let queued = core
        .dispatcher
        .dispatch(token.clone(), Task::new("later", "hi"), "writer", 3)
        .await
        .unwrap();
    let DispatchOutcome::Queued { queue_id } = queued else {
        panic!("expected queued outcome, got {queued:?}");
    };
    let item = core.queue.get(queue_id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.priority, 3);
    assert_eq!(item.agent, "writer");

    // Queue is at capacity
    let full = core
        .dispatcher
        .dispatch(token, Task::new("overflow", "hi"), "writer", 0)
        .await
        .unwrap();
    assert!(matches!(full, DispatchOutcome::Rejected(ref r) if r.is_availability_failure()));
    assert_eq!(core.queue.count_active().await.unwrap(), 1);
    assert_eq!(executor.call_count(), 4);
}

#[tokio::test]
async fn test_disabled_queue_rejects_and_skips_drainer() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.offline_queue.enabled = false;

    let core = DispatchCore::bootstrap(
        config,
        None,
        ScriptedExecutor::new([Step::Unavailable]),
        RecordingHistory::new(),
        RecordingNotifier::new(),
    )
    .await
    .unwrap();

    let outcome = core
        .dispatcher
        .dispatch(CancellationToken::new(), Task::new("t", "hi"), "writer", 0)
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Rejected(_)));
    assert_eq!(core.queue.count_active().await.unwrap(), 0);
    assert!(core.spawn_drainer(CancellationToken::new()).is_none());
}

#[tokio::test]
async fn test_spawned_drainer_replays_queued_work() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new([Step::Unavailable, Step::Succeed]);
    let notifier = RecordingNotifier::new();
    let core = DispatchCore::bootstrap(
        config_in(&dir),
        None,
        executor.clone(),
        RecordingHistory::new(),
        notifier.clone(),
    )
    .await
    .unwrap();

    let outcome = core
        .dispatcher
        .dispatch(CancellationToken::new(), Task::new("later", "hi"), "writer", 0)
        .await
        .unwrap();
    let DispatchOutcome::Queued { queue_id } = outcome else {
        panic!("expected queued outcome, got {outcome:?}");
    };

    let token = CancellationToken::new();
    let handle = core
        .spawn_drainer(token.clone())
        .expect("queue enabled, drainer should start");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let item = core.queue.get(queue_id).await.unwrap().unwrap();
            if item.status == QueueStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("drainer should replay the queued task");

    token.cancel();
    handle.await.unwrap();
    assert_eq!(
        notifier.messages(),
        vec!["Offline queue: task \"later\" completed successfully (retry #1)".to_string()]
    );
}

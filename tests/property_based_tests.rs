//! Property tests for queue ordering and retry bookkeeping

mod common;

use common::TestDb;
use dispatch_core::constants::QueueStatus;
use dispatch_core::execution::Task;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: dequeue order is priority descending, then insertion order
    #[test]
    fn dequeue_order_is_priority_then_fifo(priorities in prop::collection::vec(-3i64..=3, 1..12)) {
        let claimed = tokio_test::block_on(async {
            let db = TestDb::new().await;
            let queue = db.queue();

            let mut expected = Vec::new();
            for (index, priority) in priorities.iter().enumerate() {
                let id = queue
                    .enqueue_task(&Task::new(format!("t{index}"), "p"), "writer", *priority)
                    .await
                    .unwrap();
                expected.push((*priority, id));
            }
            expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let mut claimed = Vec::new();
            while let Some(item) = queue.dequeue_next().await.unwrap() {
                prop_assert_eq!(item.status, QueueStatus::Processing);
                claimed.push((item.priority, item.id));
            }
            prop_assert_eq!(&claimed, &expected);
            Ok(claimed)
        })?;

        prop_assert_eq!(claimed.len(), priorities.len());
    }

    /// Property: active count never exceeds what was enqueued minus what was settled
    #[test]
    fn active_count_tracks_settled_items(total in 1usize..10, settled in 0usize..10) {
        let settled = settled.min(total);
        tokio_test::block_on(async {
            let db = TestDb::new().await;
            let queue = db.queue();

            for index in 0..total {
                queue
                    .enqueue_task(&Task::new(format!("t{index}"), "p"), "writer", 0)
                    .await
                    .unwrap();
            }
            for _ in 0..settled {
                let item = queue.dequeue_next().await.unwrap().unwrap();
                queue
                    .update_status(item.id, QueueStatus::Completed, "")
                    .await
                    .unwrap();
            }

            let counts = queue.counts_by_status().await.unwrap();
            prop_assert_eq!(counts.active(), (total - settled) as i64);
            prop_assert_eq!(counts.completed, settled as i64);
            prop_assert_eq!(counts.total(), total as i64);
            Ok(())
        })?;
    }
}

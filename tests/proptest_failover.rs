//! Property-based tests for the failover facades.
//!
//! Random call sequences with primary outages and recoveries interleaved.
//! The secondary never fails, so once the primary answers again both sides
//! must hold the same contents.
//!
//! Run with: `cargo test --test proptest_failover`

mod common;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use common::{FlakyMap, FlakyQueue};
use resilience_engine::{
    BackupMap, BlockingQueue, HealthState, Map, MemoryMap, MemoryQueue, Queue, ReplicationBlockingQueue,
    ReplicationMap, ResilienceConfig,
};

// =============================================================================
// Helpers
// =============================================================================

const KEY_SPACE: u8 = 8;

#[derive(Debug, Clone)]
enum MapOp {
    Add(u8, u32, bool),
    Remove(u8),
    Read(u8),
    PrimaryDown,
    PrimaryUp,
}

fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        3 => (0..KEY_SPACE, any::<u32>(), any::<bool>()).prop_map(|(k, v, o)| MapOp::Add(k, v, o)),
        2 => (0..KEY_SPACE).prop_map(MapOp::Remove),
        1 => (0..KEY_SPACE).prop_map(MapOp::Read),
        1 => Just(MapOp::PrimaryDown),
        1 => Just(MapOp::PrimaryUp),
    ]
}

#[derive(Debug, Clone)]
enum QueueOp {
    Enqueue(u32),
    Poll,
    Take,
    PrimaryDown,
    PrimaryUp,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        3 => any::<u32>().prop_map(QueueOp::Enqueue),
        2 => Just(QueueOp::Poll),
        1 => Just(QueueOp::Take),
        1 => Just(QueueOp::PrimaryDown),
        1 => Just(QueueOp::PrimaryUp),
    ]
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

fn snapshot(map: &MemoryMap<u8, u32>) -> BTreeMap<u8, u32> {
    (0..KEY_SPACE).filter_map(|k| map.get(&k).map(|v| (k, v))).collect()
}

/// Apply `ops`, then bring the primary back and make one read so a pending
/// recovery runs.
async fn run_map_ops(map: &dyn Map<u8, u32>, primary: &FlakyMap<u8, u32>, ops: &[MapOp]) {
    let cancel = CancellationToken::new();
    for op in ops {
        match op {
            MapOp::Add(key, value, overwrite) => {
                map.try_add(*key, *value, *overwrite, &cancel).await.unwrap();
            }
            MapOp::Remove(key) => {
                map.try_remove(key, &cancel).await.unwrap();
            }
            MapOp::Read(key) => {
                map.contains_key(key, &cancel).await.unwrap();
            }
            MapOp::PrimaryDown => primary.fail(true),
            MapOp::PrimaryUp => primary.fail(false),
        }
    }
    primary.fail(false);
    map.contains_key(&0, &cancel).await.unwrap();
}

// =============================================================================
// Map facades
// =============================================================================

proptest! {
    #[test]
    fn prop_replication_map_converges(ops in prop::collection::vec(map_op(), 0..48)) {
        let (primary_after, secondary_after, health) = block_on(async {
            let primary = FlakyMap::<u8, u32>::new();
            let secondary = Arc::new(MemoryMap::<u8, u32>::new());
            let map = ReplicationMap::new("replicated", primary.clone(), secondary.clone(), &ResilienceConfig::default())
                .unwrap();
            run_map_ops(&map, &primary, &ops).await;
            (snapshot(primary.inner()), snapshot(&secondary), map.engine().health())
        });

        prop_assert_eq!(health, HealthState::Up);
        prop_assert_eq!(primary_after, secondary_after);
    }

    #[test]
    fn prop_backup_map_converges(ops in prop::collection::vec(map_op(), 0..48)) {
        let (primary_after, secondary_after, health) = block_on(async {
            let primary = FlakyMap::<u8, u32>::new();
            let secondary = Arc::new(MemoryMap::<u8, u32>::new());
            let map = BackupMap::new("backed_up", primary.clone(), secondary.clone(), &ResilienceConfig::default())
                .unwrap();
            run_map_ops(&map, &primary, &ops).await;
            (snapshot(primary.inner()), snapshot(&secondary), map.engine().health())
        });

        prop_assert_eq!(health, HealthState::Up);
        prop_assert_eq!(primary_after, secondary_after);
    }
}

// =============================================================================
// Replicated queue
// =============================================================================

proptest! {
    /// Every item comes out once, in order, and both queues end equal
    #[test]
    fn prop_replication_queue_delivers_once(ops in prop::collection::vec(queue_op(), 0..48)) {
        let (delivered, expected, primary_after, secondary_after) = block_on(async {
            let cancel = CancellationToken::new();
            let primary = FlakyQueue::<u32>::new();
            let secondary = Arc::new(MemoryQueue::<u32>::new());
            let queue = ReplicationBlockingQueue::new(
                "replicated",
                primary.clone(),
                secondary.clone(),
                &ResilienceConfig::default(),
            )
            .unwrap();

            let mut model = VecDeque::new();
            let (mut delivered, mut expected) = (vec![], vec![]);
            for op in &ops {
                match op {
                    QueueOp::Enqueue(item) => {
                        queue.enqueue(*item, &cancel).await.unwrap();
                        model.push_back(*item);
                    }
                    QueueOp::Poll => {
                        delivered.push(queue.dequeue_or_default(&cancel).await.unwrap());
                        expected.push(model.pop_front());
                    }
                    // Only block when something is there to take
                    QueueOp::Take if !model.is_empty() => {
                        delivered.push(queue.dequeue(&cancel).await.unwrap());
                        expected.push(model.pop_front());
                    }
                    QueueOp::Take => {}
                    QueueOp::PrimaryDown => primary.fail(true),
                    QueueOp::PrimaryUp => primary.fail(false),
                }
            }
            primary.fail(false);
            Queue::len(&queue, &cancel).await.unwrap();

            (delivered, expected, primary.inner().snapshot(), secondary.snapshot())
        });

        prop_assert_eq!(delivered, expected);
        prop_assert_eq!(primary_after, secondary_after);
    }
}

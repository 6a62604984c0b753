//! Integration tests for common Runlock workflows.
//!
//! These tests verify that the most common use cases work correctly.

use runlock::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const T0: i64 = 1_700_000_000;
const DAY: i64 = 86_400;

fn config(secs: u64) -> LeaseConfig {
    LeaseConfig::builder()
        .lease_duration(Duration::from_secs(secs))
        .build()
}

// =============================================================================
// Acquire / Work / Release
// =============================================================================

#[tokio::test]
async fn test_acquire_work_release() {
    let lock = LeaseLock::with_config(Arc::new(MemoryStore::new()), config(60)).unwrap();

    let lease = match lock.try_acquire("invoices").await.unwrap() {
        Acquisition::Acquired(lease) => lease,
        Acquisition::Denied { .. } => panic!("fresh key should be free"),
    };
    assert_eq!(lease.key(), "invoices");
    assert!(lock.is_locked("invoices").await.unwrap());

    // A second worker is told to come back later
    assert!(lock.try_acquire("invoices").await.unwrap().is_denied());

    lock.release("invoices").await.unwrap();
    assert!(!lock.is_locked("invoices").await.unwrap());
}

#[tokio::test]
async fn test_guard_workflow() {
    let lock = LeaseLock::with_config(Arc::new(MemoryStore::new()), config(60)).unwrap();

    let guard = lock.try_lock("invoices").await.unwrap().unwrap();
    assert!(lock.try_lock("invoices").await.unwrap().is_none());
    assert!(guard.release().await.unwrap());

    assert!(lock.try_lock("invoices").await.unwrap().is_some());
}

#[tokio::test]
async fn test_run_exclusive_workflow() {
    let lock = LeaseLock::with_config(Arc::new(MemoryStore::new()), config(60)).unwrap();

    let total = lock
        .run_exclusive("sum", async { (1..=10).sum::<i32>() })
        .await
        .unwrap();
    assert_eq!(total, Exclusive::Ran(55));
    assert!(!lock.is_locked("sum").await.unwrap());
}

#[test]
fn test_guard_dropped_outside_runtime_keeps_lease() {
    let lock = LeaseLock::with_config(Arc::new(MemoryStore::new()), config(60)).unwrap();

    let guard = tokio_test::block_on(lock.try_lock("invoices")).unwrap().unwrap();
    drop(guard);

    // Nothing to spawn the release on; the lease runs until its expiry
    assert!(tokio_test::block_on(lock.is_locked("invoices")).unwrap());
}

// =============================================================================
// Lease Expiry
// =============================================================================

#[tokio::test]
async fn test_five_day_lease_with_fixed_clock() {
    let clock = Arc::new(FixedClock::new(T0));
    let lock = LeaseLock::builder()
        .config(config(5 * 86_400))
        .clock(clock.clone())
        .build(Arc::new(MemoryStore::new()))
        .unwrap();

    assert!(lock.try_acquire("serial_work").await.unwrap().is_acquired());

    clock.set(T0 + DAY);
    assert!(lock.try_acquire("serial_work").await.unwrap().is_denied());

    clock.set(T0 + 10 * DAY);
    assert!(lock.try_acquire("serial_work").await.unwrap().is_acquired());
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_outage_is_distinguishable_from_denial() {
    let store = Arc::new(MemoryStore::new());
    let lock = LeaseLock::with_config(store.clone(), config(60)).unwrap();
    store.set_unavailable(true);

    match lock.try_acquire("k").await {
        Err(LeaseError::StoreUnavailable(msg)) => assert!(!msg.is_empty()),
        other => panic!("expected StoreUnavailable, got {:?}", other),
    }
}

// =============================================================================
// Job Queue
// =============================================================================

#[tokio::test]
async fn test_unique_job_workflow() {
    let lock = LeaseLock::with_config(Arc::new(MemoryStore::new()), config(60)).unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let unique = RuntimeUnique::new(lock.clone(), queue.clone())
        .with_requeue_interval(Duration::ZERO);

    let job = Job::new("reports", "nightly");
    let performed = unique
        .perform(job.clone(), |_| async { Ok::<(), QueueError>(()) })
        .await
        .unwrap();
    assert_eq!(performed, Performed::Completed);

    let _held = lock.try_acquire("reports").await.unwrap();
    let performed = unique
        .perform(job, |_| async { Ok::<(), QueueError>(()) })
        .await
        .unwrap();
    assert!(matches!(performed, Performed::Requeued { requeues: 1, .. }));
    assert_eq!(queue.size("reports").await.unwrap(), 1);
}

// =============================================================================
// Redis
// =============================================================================

#[test]
fn test_redis_config_from_builder() {
    let config = RedisConfig::builder()
        .url("redis://localhost:6379")
        .database(2)
        .build();

    assert_eq!(config.database, Some(2));
    assert!(config.connection_url().unwrap().ends_with("/2"));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_lease_workflow() {
    let store = RedisStore::connect(RedisConfig::from_env().build())
        .await
        .unwrap();
    let lease_config = LeaseConfig::builder()
        .lease_duration(Duration::from_secs(30))
        .key_prefix(format!("runlock:test:{}", T0))
        .build();
    let lock = LeaseLock::with_config(Arc::new(store), lease_config).unwrap();

    lock.release("workflow").await.unwrap();
    assert!(lock.try_acquire("workflow").await.unwrap().is_acquired());
    assert!(lock.try_acquire("workflow").await.unwrap().is_denied());
    lock.release("workflow").await.unwrap();
}

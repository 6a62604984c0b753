//! Run at most one job per lock key at a time.
//!
//! [`RuntimeUnique`] wraps job execution in a lease: a job whose lock is free
//! runs and releases the lock afterwards; a job whose lock is held is put back
//! at the tail of its queue after a short pause. Enqueueing is never blocked,
//! so duplicates may wait in the queue but never run side by side.

use crate::error::{QueueError, QueueResult};
use crate::job::Job;
use crate::queue::JobQueue;
use futures::FutureExt;
use runlock_lease::{Acquisition, LeaseLock};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Key prefix of the per-argument strategy.
pub const UNIQUE_KEY_PREFIX: &str = "unique_at_runtime";

/// How a job maps to its lock key.
#[derive(Clone, Default)]
pub enum LockKey {
    /// One job per queue at a time
    #[default]
    QueueName,
    /// One job per queue and argument value: `unique_at_runtime:<queue>:<arg>`
    QueueAndArg(usize),
    /// Caller-defined key
    Custom(Arc<dyn Fn(&Job) -> String + Send + Sync>),
}

impl LockKey {
    /// Lock key for a custom function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Job) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Resolve the lock key of `job`.
    pub fn key_for(&self, job: &Job) -> String {
        match self {
            Self::QueueName => job.queue.clone(),
            Self::QueueAndArg(index) => match job.arg_string(*index) {
                Some(arg) => format!("{}:{}:{}", UNIQUE_KEY_PREFIX, job.queue, arg),
                None => format!("{}:{}", UNIQUE_KEY_PREFIX, job.queue),
            },
            Self::Custom(f) => f(job),
        }
    }
}

impl fmt::Debug for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueName => f.write_str("QueueName"),
            Self::QueueAndArg(index) => f.debug_tuple("QueueAndArg").field(index).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Outcome of [`RuntimeUnique::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Performed {
    /// The handler ran and succeeded.
    Completed,
    /// The lock was held; the job went back on its queue.
    Requeued {
        /// Total requeues of the job so far
        requeues: u32,
        /// Expiry of the blocking lease, when known
        held_until: Option<i64>,
    },
}

/// Runtime uniqueness around job execution.
#[derive(Clone)]
pub struct RuntimeUnique {
    lock: LeaseLock,
    queue: Arc<dyn JobQueue>,
    lock_key: LockKey,
    requeue_interval: Duration,
}

impl fmt::Debug for RuntimeUnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeUnique")
            .field("lock", &self.lock)
            .field("lock_key", &self.lock_key)
            .field("requeue_interval", &self.requeue_interval)
            .finish()
    }
}

impl RuntimeUnique {
    /// Create with the queue name as lock key and the lock's configured
    /// requeue interval.
    pub fn new(lock: LeaseLock, queue: Arc<dyn JobQueue>) -> Self {
        let requeue_interval = lock.config().requeue_interval;
        Self {
            lock,
            queue,
            lock_key: LockKey::default(),
            requeue_interval,
        }
    }

    /// Set the lock key strategy.
    pub fn with_lock_key(mut self, lock_key: LockKey) -> Self {
        self.lock_key = lock_key;
        self
    }

    /// Set the pause before a denied job is put back.
    pub fn with_requeue_interval(mut self, interval: Duration) -> Self {
        self.requeue_interval = interval;
        self
    }

    /// Underlying lock.
    pub fn lock(&self) -> &LeaseLock {
        &self.lock
    }

    /// Queue denied jobs are put back on.
    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Lock key of `job`.
    pub fn lock_key(&self, job: &Job) -> String {
        self.lock_key.key_for(job)
    }

    /// Run `handler` for `job` if its lock is free, otherwise requeue the job.
    ///
    /// The lock is released however the handler exits. Handler errors come
    /// back as [`QueueError::ExecutionFailed`] and panics as
    /// [`QueueError::Panicked`], both after the release.
    pub async fn perform<F, Fut, E>(&self, job: Job, handler: F) -> QueueResult<Performed>
    where
        F: FnOnce(Job) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let key = self.lock_key(&job);

        let lease = match self.lock.try_acquire(&key).await? {
            Acquisition::Acquired(lease) => lease,
            Acquisition::Denied { held_until, .. } => {
                return self.requeue(job, &key, held_until).await;
            }
        };

        let job_id = job.id;
        let outcome = AssertUnwindSafe(handler(job)).catch_unwind().await;

        // Ownerless release: the key is freed even if our lease already ran out
        if let Err(e) = self.lock.release(lease.key()).await {
            error!(key = %key, job_id = %job_id, error = %e, "Failed to release job lock");
            if matches!(outcome, Ok(Ok(()))) {
                return Err(e.into());
            }
        }

        match outcome {
            Ok(Ok(())) => Ok(Performed::Completed),
            Ok(Err(e)) => Err(QueueError::execution(e.to_string())),
            Err(panic) => Err(QueueError::Panicked(panic_message(panic.as_ref()))),
        }
    }

    /// Whether `job`'s lock is currently held.
    pub async fn is_running(&self, job: &Job) -> QueueResult<bool> {
        Ok(self.lock.is_locked(&self.lock_key(job)).await?)
    }

    /// Release `job`'s lock whoever holds it.
    pub async fn unlock(&self, job: &Job) -> QueueResult<()> {
        Ok(self.lock.release(&self.lock_key(job)).await?)
    }

    async fn requeue(
        &self,
        job: Job,
        key: &str,
        held_until: Option<i64>,
    ) -> QueueResult<Performed> {
        debug!(
            key = %key,
            job_id = %job.id,
            queue = %job.queue,
            held_until = ?held_until,
            "Lock held, requeueing job"
        );

        tokio::time::sleep(self.requeue_interval).await;

        let job = job.requeued();
        let requeues = job.requeues;
        self.queue.enqueue(job).await?;

        Ok(Performed::Requeued {
            requeues,
            held_until,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use runlock_lease::{LeaseConfig, MemoryStore};
    use serde_json::json;

    fn unique(queue: Arc<MemoryQueue>) -> RuntimeUnique {
        let config = LeaseConfig::builder()
            .lease_duration(Duration::from_secs(3600))
            .build();
        let lock = LeaseLock::with_config(Arc::new(MemoryStore::new()), config).unwrap();
        RuntimeUnique::new(lock, queue).with_requeue_interval(Duration::ZERO)
    }

    #[test]
    fn test_lock_keys() {
        let job = Job::new("billing", "charge").with_arg("account_42").with_arg(7);

        assert_eq!(LockKey::QueueName.key_for(&job), "billing");
        assert_eq!(
            LockKey::QueueAndArg(0).key_for(&job),
            "unique_at_runtime:billing:account_42"
        );
        assert_eq!(LockKey::QueueAndArg(1).key_for(&job), "unique_at_runtime:billing:7");
        assert_eq!(LockKey::QueueAndArg(5).key_for(&job), "unique_at_runtime:billing");

        let custom = LockKey::custom(|job| format!("{}-{}", job.job_type, job.args.len()));
        assert_eq!(custom.key_for(&job), "charge-2");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_perform_runs_and_releases() {
        let queue = Arc::new(MemoryQueue::new());
        let unique = unique(queue.clone());
        let job = Job::new("reports", "nightly");

        let performed = unique
            .perform(job.clone(), |_| async { Ok::<(), String>(()) })
            .await
            .unwrap();

        assert_eq!(performed, Performed::Completed);
        assert!(!unique.is_running(&job).await.unwrap());
        assert_eq!(queue.size("reports").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_perform_requeues_when_held() {
        let queue = Arc::new(MemoryQueue::new());
        let unique = unique(queue.clone());
        let job = Job::new("reports", "nightly").with_arg(json!(1));

        let _held = unique.lock().try_acquire("reports").await.unwrap();
        assert!(unique.is_running(&job).await.unwrap());

        let mut ran = false;
        let flag = &mut ran;
        let performed = unique
            .perform(job.clone(), move |_| async move {
                *flag = true;
                Ok::<(), String>(())
            })
            .await
            .unwrap();

        assert!(!ran);
        assert!(matches!(performed, Performed::Requeued { requeues: 1, .. }));

        let requeued = queue.dequeue("reports").await.unwrap().unwrap();
        assert_eq!(requeued.id, job.id);
        assert_eq!(requeued.requeues, 1);
    }

    #[tokio::test]
    async fn test_perform_releases_after_failure() {
        let unique = unique(Arc::new(MemoryQueue::new()));
        let job = Job::new("reports", "nightly");

        let err = unique
            .perform(job.clone(), |_| async { Err("disk full") })
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::ExecutionFailed(ref msg) if msg == "disk full"));
        assert!(!unique.is_running(&job).await.unwrap());
    }

    #[tokio::test]
    async fn test_perform_releases_after_panic() {
        let unique = unique(Arc::new(MemoryQueue::new()));
        let job = Job::new("reports", "nightly");

        let err = unique
            .perform(job.clone(), |job| async move {
                if job.job_type == "nightly" {
                    panic!("catastrophic job failure");
                }
                Ok::<(), String>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Panicked(ref msg) if msg == "catastrophic job failure"));
        assert!(!unique.is_running(&job).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_clears_stuck_lock() {
        let unique = unique(Arc::new(MemoryQueue::new()));
        let job = Job::new("reports", "nightly");

        let _stuck = unique.lock().try_acquire("reports").await.unwrap();
        assert!(unique.is_running(&job).await.unwrap());

        unique.unlock(&job).await.unwrap();
        assert!(!unique.is_running(&job).await.unwrap());
    }

    #[tokio::test]
    async fn test_per_argument_locks_are_independent() {
        let queue = Arc::new(MemoryQueue::new());
        let unique = unique(queue.clone()).with_lock_key(LockKey::QueueAndArg(0));
        let one = Job::new("billing", "charge").with_arg("account_one");
        let two = Job::new("billing", "charge").with_arg("account_two");

        let _held = unique.lock().try_acquire(&unique.lock_key(&one)).await.unwrap();

        let performed = unique
            .perform(two, |_| async { Ok::<(), String>(()) })
            .await
            .unwrap();
        assert_eq!(performed, Performed::Completed);

        let performed = unique
            .perform(one, |_| async { Ok::<(), String>(()) })
            .await
            .unwrap();
        assert!(matches!(performed, Performed::Requeued { .. }));
        assert_eq!(queue.size("billing").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_propagates() {
        let store = Arc::new(MemoryStore::new());
        let lock = LeaseLock::with_config(store.clone(), LeaseConfig::default()).unwrap();
        let queue = Arc::new(MemoryQueue::new());
        let unique = RuntimeUnique::new(lock, queue.clone());
        store.set_unavailable(true);

        let err = unique
            .perform(Job::new("q", "t"), |_| async { Ok::<(), String>(()) })
            .await
            .unwrap_err();

        assert!(err.is_backend_failure());
        assert_eq!(queue.size("q").await.unwrap(), 0);
    }
}

//! Run-one-at-a-time jobs for Runlock.
//!
//! Wraps job execution in a [`LeaseLock`](runlock_lease::LeaseLock) so that
//! at most one job per lock key runs at any moment across all workers.
//!
//! - 🔒 Lock per queue, per argument, or per custom key
//! - 🔁 Denied jobs go back to the tail of their queue after a pause
//! - 🧹 Locks released on success, failure, and panic
//! - 📦 In-memory and Redis list queues
//! - 👷 Polling worker pool
//!
//! ## Quick Start - Lock Keys
//!
//! ```
//! use runlock_queue::{Job, LockKey};
//!
//! let job = Job::new("billing", "charge").with_arg("account_42");
//!
//! assert_eq!(LockKey::QueueName.key_for(&job), "billing");
//! assert_eq!(
//!     LockKey::QueueAndArg(0).key_for(&job),
//!     "unique_at_runtime:billing:account_42"
//! );
//! ```
//!
//! ## Performing a Job
//!
//! ```
//! use runlock_lease::{LeaseLock, MemoryStore};
//! use runlock_queue::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), QueueError> {
//! let lock = LeaseLock::new(Arc::new(MemoryStore::new()));
//! let unique = RuntimeUnique::new(lock, Arc::new(MemoryQueue::new()));
//!
//! let performed = unique
//!     .perform(Job::new("reports", "nightly"), |job| async move {
//!         println!("Running {}", job.job_type);
//!         Ok::<(), QueueError>(())
//!     })
//!     .await?;
//!
//! assert_eq!(performed, Performed::Completed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Complete Example
//!
//! ```no_run
//! use runlock_lease::{LeaseLock, RedisStore};
//! use runlock_queue::*;
//! use runlock_redis::RedisConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     let redis = RedisConfig::from_env().build();
//!     let store = RedisStore::connect(redis.clone()).await?;
//!     let queue = Arc::new(RedisQueue::connect(redis).await?);
//!
//!     queue.enqueue(Job::new("reports", "nightly")).await?;
//!
//!     let unique = RuntimeUnique::new(LeaseLock::new(Arc::new(store)), queue);
//!     let mut worker = Worker::new(unique, WorkerConfig::new("reports"));
//!     worker.register_handler("nightly", |_job| async move {
//!         // Build the report
//!         Ok(())
//!     });
//!
//!     worker.start().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     worker.stop().await
//! }
//! ```

pub mod error;
pub mod job;
pub mod queue;
pub mod unique;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use job::{Job, JobId};
pub use queue::{DEFAULT_QUEUE_PREFIX, JobQueue, MemoryQueue, RedisQueue};
pub use unique::{LockKey, Performed, RuntimeUnique, UNIQUE_KEY_PREFIX};
pub use worker::{JobHandler, Worker, WorkerConfig, WorkerStats};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::job::{Job, JobId};
    pub use crate::queue::{JobQueue, MemoryQueue, RedisQueue};
    pub use crate::unique::{LockKey, Performed, RuntimeUnique};
    pub use crate::worker::{JobHandler, Worker, WorkerConfig, WorkerStats};
}

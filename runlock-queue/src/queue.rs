//! Queue backends.
//!
//! A queue is a plain FIFO list per queue name. Jobs put back because their
//! lock was held go to the tail, behind everything already waiting.

use crate::error::{QueueError, QueueResult};
use crate::job::Job;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use runlock_redis::{RedisConfig, RedisService};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// Default key prefix for Redis queue lists.
pub const DEFAULT_QUEUE_PREFIX: &str = "runlock:queue";

/// FIFO job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push `job` to the tail of its queue.
    async fn enqueue(&self, job: Job) -> QueueResult<()>;

    /// Pop the job at the head of `queue`.
    async fn dequeue(&self, queue: &str) -> QueueResult<Option<Job>>;

    /// Number of jobs waiting in `queue`.
    async fn size(&self, queue: &str) -> QueueResult<usize>;
}

/// In-memory queue for tests and single process use.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Job>>>,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<()> {
        trace!(queue = %job.queue, job_id = %job.id, "Enqueueing job");
        self.queues
            .lock()
            .await
            .entry(job.queue.clone())
            .or_default()
            .push_back(job);
        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> QueueResult<Option<Job>> {
        Ok(self
            .queues
            .lock()
            .await
            .get_mut(queue)
            .and_then(VecDeque::pop_front))
    }

    async fn size(&self, queue: &str) -> QueueResult<usize> {
        Ok(self.queues.lock().await.get(queue).map_or(0, VecDeque::len))
    }
}

/// Queue backed by Redis lists (`RPUSH`/`LPOP` on `<prefix>:<queue>`).
#[derive(Clone)]
pub struct RedisQueue {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisQueue {
    /// Create a queue over an existing connection.
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            key_prefix: DEFAULT_QUEUE_PREFIX.to_string(),
        }
    }

    /// Connect using a Redis configuration.
    pub async fn connect(config: RedisConfig) -> QueueResult<Self> {
        info!(url = %config.url, "Initializing job queue");
        let service = RedisService::connect(config).await?;
        Ok(Self::new(service.connection()))
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Redis key of a queue list.
    pub fn key(&self, queue: &str) -> String {
        format!("{}:{}", self.key_prefix, queue)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let key = self.key(&job.queue);

        let job_json =
            serde_json::to_string(&job).map_err(|e| QueueError::Serialization(e.to_string()))?;

        debug!(queue = %job.queue, job_id = %job.id, job_type = %job.job_type, "Enqueueing job");
        let _: usize = conn.rpush(&key, job_json).await?;
        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> QueueResult<Option<Job>> {
        let mut conn = self.connection.clone();
        let job_json: Option<String> = conn.lpop(self.key(queue), None).await?;

        job_json
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| QueueError::Deserialization(e.to_string()))
            })
            .transpose()
    }

    async fn size(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        let size: usize = conn.llen(self.key(queue)).await?;
        Ok(size)
    }
}

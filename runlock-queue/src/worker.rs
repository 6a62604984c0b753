//! Worker implementation for processing jobs.

use crate::error::{QueueError, QueueResult};
use crate::job::Job;
use crate::unique::{Performed, RuntimeUnique};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Job handler function type.
pub type JobHandler =
    Arc<dyn Fn(Job) -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> + Send + Sync>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to poll
    pub queue: String,

    /// Number of concurrent jobs to process
    pub concurrency: usize,

    /// Poll interval for checking new jobs
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "default".to_string(),
            concurrency: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Poll `queue` with default settings.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    /// Set the number of concurrent jobs.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Job outcome counters.
#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    requeued: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of a worker's job outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs whose handler succeeded
    pub completed: u64,
    /// Jobs put back because their lock was held
    pub requeued: u64,
    /// Jobs that failed, panicked, had no handler, or hit a backend error
    pub failed: u64,
}

/// Worker that runs queued jobs through [`RuntimeUnique`].
pub struct Worker {
    unique: RuntimeUnique,
    handlers: Arc<HashMap<String, JobHandler>>,
    config: WorkerConfig,
    running: Arc<RwLock<bool>>,
    counters: Arc<Counters>,
    handles: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(unique: RuntimeUnique, config: WorkerConfig) -> Self {
        Self {
            unique,
            handlers: Arc::new(HashMap::new()),
            config,
            running: Arc::new(RwLock::new(false)),
            counters: Arc::new(Counters::default()),
            handles: Vec::new(),
        }
    }

    /// Register a job handler. Handlers registered after [`start`](Self::start)
    /// are picked up on the next start.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use runlock_queue::*;
    /// use runlock_lease::{LeaseLock, MemoryStore};
    /// use std::sync::Arc;
    ///
    /// let lock = LeaseLock::new(Arc::new(MemoryStore::new()));
    /// let unique = RuntimeUnique::new(lock, Arc::new(MemoryQueue::new()));
    /// let mut worker = Worker::new(unique, WorkerConfig::new("reports"));
    ///
    /// worker.register_handler("nightly_report", |job| async move {
    ///     println!("Building report: {:?}", job.args);
    ///     Ok(())
    /// });
    /// ```
    pub fn register_handler<F, Fut>(&mut self, job_type: impl Into<String>, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        let wrapped_handler: JobHandler = Arc::new(
            move |job: Job| -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> {
                Box::pin(handler(job))
            },
        );

        Arc::make_mut(&mut self.handlers).insert(job_type.into(), wrapped_handler);
    }

    /// Start the worker.
    pub async fn start(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if *running {
            return Err(QueueError::WorkerAlreadyRunning);
        }
        if self.config.concurrency == 0 {
            return Err(QueueError::Config("concurrency must be at least 1".to_string()));
        }
        *running = true;
        drop(running);

        info!(
            queue = %self.config.queue,
            concurrency = self.config.concurrency,
            "Starting worker"
        );

        for i in 0..self.config.concurrency {
            let unique = self.unique.clone();
            let handlers = self.handlers.clone();
            let running = self.running.clone();
            let counters = self.counters.clone();
            let queue_name = self.config.queue.clone();
            let poll_interval = self.config.poll_interval;

            let handle = tokio::spawn(async move {
                while *running.read().await {
                    match unique.queue().dequeue(&queue_name).await {
                        Ok(Some(job)) => {
                            process(i, &unique, &handlers, &counters, job).await;
                        }
                        Ok(None) => {
                            // No jobs available, wait before polling again
                            tokio::time::sleep(poll_interval).await;
                        }
                        Err(e) => {
                            error!(worker = i, queue = %queue_name, error = %e, "Error dequeuing job");
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }

                debug!(worker = i, "Worker task stopped");
            });

            self.handles.push(handle);
        }

        Ok(())
    }

    /// Stop the worker, letting jobs in progress finish.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Err(QueueError::WorkerNotRunning);
        }
        *running = false;
        drop(running);

        info!(queue = %self.config.queue, "Stopping worker");

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        info!(queue = %self.config.queue, "Worker stopped");
        Ok(())
    }

    /// Check if the worker is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Job outcomes so far.
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            requeued: self.counters.requeued.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn process(
    worker: usize,
    unique: &RuntimeUnique,
    handlers: &HashMap<String, JobHandler>,
    counters: &Counters,
    job: Job,
) {
    let job_id = job.id;
    let Some(handler) = handlers.get(&job.job_type).cloned() else {
        let err = QueueError::NoHandler(job.job_type.clone());
        error!(worker, job_id = %job_id, error = %err, "Dropping job");
        counters.failed.fetch_add(1, Ordering::Relaxed);
        return;
    };

    debug!(worker, job_id = %job_id, job_type = %job.job_type, "Processing job");

    match unique.perform(job, move |job| handler(job)).await {
        Ok(Performed::Completed) => {
            debug!(worker, job_id = %job_id, "Job completed");
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Performed::Requeued { requeues, .. }) => {
            debug!(worker, job_id = %job_id, requeues, "Job requeued");
            counters.requeued.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(worker, job_id = %job_id, error = %e, "Job failed");
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

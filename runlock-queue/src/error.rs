//! Error types for queue operations.

use runlock_lease::LeaseError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Lease store failure while locking or unlocking
    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Job execution failed
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Job handler panicked
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// No handler registered for job type
    #[error("No handler registered for job type: {0}")]
    NoHandler(String),

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Create an execution failure.
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Whether the lease store or queue backend could not be reached.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Redis(_)) || matches!(self, Self::Lease(e) if e.is_retryable())
    }
}

impl From<runlock_redis::RedisError> for QueueError {
    fn from(err: runlock_redis::RedisError) -> Self {
        match err {
            runlock_redis::RedisError::Config(msg) => Self::Config(msg),
            runlock_redis::RedisError::Redis(e) => Self::Redis(e),
            other => Self::Lease(LeaseError::unavailable(other.to_string())),
        }
    }
}

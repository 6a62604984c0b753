//! Error types for lease operations.
//!
//! A denied acquisition is not an error: it is reported through
//! [`Acquisition::Denied`](crate::Acquisition::Denied). Errors here always mean
//! the caller cannot tell whether the lease is free.

use thiserror::Error;

/// Result type for lease operations.
pub type LeaseResult<T> = Result<T, LeaseError>;

/// Lease errors.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The backing store could not be reached or rejected a command.
    #[error("Lease store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error
    #[error("Lease configuration error: {0}")]
    InvalidConfig(String),
}

impl LeaseError {
    /// Create a store unavailable error.
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for LeaseError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<runlock_redis::RedisError> for LeaseError {
    fn from(err: runlock_redis::RedisError) -> Self {
        match err {
            runlock_redis::RedisError::Config(msg) => Self::InvalidConfig(msg),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_retryable() {
        let err = LeaseError::unavailable("connection refused");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Lease store unavailable: connection refused");
    }

    #[test]
    fn test_config_error_not_retryable() {
        let err = LeaseError::config("lease duration must be at least one second");
        assert!(!err.is_retryable());
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_config_error_maps_to_invalid_config() {
        let err: LeaseError = runlock_redis::RedisError::Config("bad url".into()).into();
        assert!(matches!(err, LeaseError::InvalidConfig(_)));

        let err: LeaseError = runlock_redis::RedisError::Timeout.into();
        assert!(matches!(err, LeaseError::StoreUnavailable(_)));
    }
}

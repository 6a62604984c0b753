//! # Runlock Redis
//!
//! Redis connection setup shared by the runlock lease store and job queue.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use runlock_redis::{RedisConfig, RedisService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .database(2)
//!         .build();
//!
//!     let redis = RedisService::connect(config).await?;
//!     redis.health_check().await?;
//!
//!     // Cheap clone of the multiplexed connection manager
//!     let conn = redis.connection();
//!     # let _ = conn;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use service::RedisService;

// Re-export redis crate for convenience
pub use redis;
pub use redis::aio::ConnectionManager;

/// Prelude for common imports.
///
/// ```
/// use runlock_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::service::RedisService;
    pub use redis::aio::ConnectionManager;
}

// Runlock - Expiring distributed lease locks for run-one-at-a-time jobs
//
// This library re-exports the lease lock core, the Redis connection layer,
// and the job queue integration behind features.

// Re-export core functionality
pub use runlock_lease::*;

// Re-export optional crates
#[cfg(feature = "redis")]
pub use runlock_redis;

#[cfg(feature = "queue")]
pub use runlock_queue;

// Prelude for common imports
pub mod prelude {
    pub use runlock_lease::prelude::*;

    #[cfg(feature = "redis")]
    pub use runlock_redis::RedisConfig;

    #[cfg(feature = "queue")]
    pub use runlock_queue::prelude::*;
}

//! Expiring Lease Locks for Runlock
//!
//! This crate provides a run-one-at-a-time lock over a shared key-value store.
//!
//! ## Features
//!
//! - **Lease Records** - A lock is a stored expiry timestamp; no owner process
//!   has to stay alive for a crashed holder's lease to run out
//! - **Expired Lease Takeover** - `GETSET`-style swap so at most one racer wins
//! - **Namespaced Layout** - All leases as fields of one hash, with a weaker
//!   race guarantee
//! - **Pluggable Stores** - In-memory (tests, single process) and Redis
//! - **RAII Guards** - Optional release on drop that never removes another
//!   holder's lease
//!
//! ## Quick Start
//!
//! ```rust
//! use runlock_lease::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), LeaseError> {
//! let config = LeaseConfig::builder()
//!     .lease_duration(Duration::from_secs(60))
//!     .build();
//! let lock = LeaseLock::with_config(Arc::new(MemoryStore::new()), config)?;
//!
//! match lock.try_acquire("nightly-report").await? {
//!     Acquisition::Acquired(_lease) => {
//!         // Critical section
//!         lock.release("nightly-report").await?;
//!     }
//!     Acquisition::Denied { held_until, .. } => {
//!         println!("Busy until {:?}", held_until);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Redis
//!
//! ```rust,ignore
//! use runlock_lease::prelude::*;
//! use runlock_redis::RedisConfig;
//! use std::sync::Arc;
//!
//! let store = RedisStore::connect(RedisConfig::from_env().build()).await?;
//! let lock = LeaseLock::new(Arc::new(store));
//!
//! let outcome = lock
//!     .run_exclusive("serial_work", async { send_invoices().await })
//!     .await?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod layout;
pub mod lock;
pub mod record;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    DEFAULT_KEY_BASE, DEFAULT_KEY_PREFIX, DEFAULT_LEASE_DURATION, DEFAULT_REQUEUE_INTERVAL,
    LeaseConfig, LeaseConfigBuilder, configure, default_config, set_default,
};
pub use error::{LeaseError, LeaseResult};
pub use guard::LeaseGuard;
pub use layout::{LayoutKind, LeaseLayout, StealGuarantee};
pub use lock::{Acquisition, Exclusive, Lease, LeaseLock, LeaseLockBuilder};
pub use record::{LeaseRecord, RecordError};
pub use store::{LeaseStore, MemoryStore};

#[cfg(feature = "redis")]
pub use store::RedisStore;

/// Prelude for common imports.
///
/// ```
/// use runlock_lease::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::config::LeaseConfig;
    pub use crate::error::{LeaseError, LeaseResult};
    pub use crate::guard::LeaseGuard;
    pub use crate::layout::StealGuarantee;
    pub use crate::lock::{Acquisition, Exclusive, Lease, LeaseLock};
    pub use crate::store::{LeaseStore, MemoryStore};

    #[cfg(feature = "redis")]
    pub use crate::store::RedisStore;
}

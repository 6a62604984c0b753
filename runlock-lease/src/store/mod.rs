//! Lease store backends
//!
//! This module provides the storage primitives the lease protocol needs:
//!
//! - **Memory**: In-memory storage using DashMap (single process, tests)
//! - **Redis**: Shared storage for multi-process deployments
//!
//! Every operation is a single round trip. Backends must make
//! [`LeaseStore::set_if_absent`] and [`LeaseStore::set_unconditional`] atomic;
//! the lock decides ownership from their return values alone.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use crate::error::LeaseResult;
use async_trait::async_trait;

/// Trait for lease storage backends
///
/// Any error is reported as
/// [`LeaseError::StoreUnavailable`](crate::LeaseError::StoreUnavailable).
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Store `value` at `key` only if `key` does not exist.
    /// Returns whether the store now holds this caller's value.
    async fn set_if_absent(&self, key: &str, value: &str) -> LeaseResult<bool>;

    /// Read the value at `key`.
    async fn get(&self, key: &str) -> LeaseResult<Option<String>>;

    /// Replace the value at `key`, returning what was there immediately before.
    async fn set_unconditional(&self, key: &str, value: &str) -> LeaseResult<Option<String>>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> LeaseResult<()>;

    /// Delete `key` only while it still holds `value`.
    /// Returns whether a delete happened.
    async fn delete_if_equals(&self, key: &str, value: &str) -> LeaseResult<bool>;

    /// Store `value` in `field` of the `namespace` hash only if the field does not exist.
    async fn field_set_if_absent(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> LeaseResult<bool>;

    /// Read `field` of the `namespace` hash.
    async fn field_get(&self, namespace: &str, field: &str) -> LeaseResult<Option<String>>;

    /// Overwrite `field` of the `namespace` hash. The previous value is not returned.
    async fn field_set(&self, namespace: &str, field: &str, value: &str) -> LeaseResult<()>;

    /// Remove `field` from the `namespace` hash.
    async fn field_delete(&self, namespace: &str, field: &str) -> LeaseResult<()>;

    /// Remove `field` only while it still holds `value`.
    async fn field_delete_if_equals(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> LeaseResult<bool>;

    /// Get store type name (for logging/debugging)
    fn store_type(&self) -> &'static str;
}

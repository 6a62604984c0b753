//! In-memory lease store
//!
//! Uses DashMap for thread-safe concurrent access. Each primitive runs under
//! the shard lock of the key it touches, which gives the same atomicity the
//! Redis commands have. Only useful inside one process; for multiple worker
//! processes use the Redis store.

use crate::error::{LeaseError, LeaseResult};
use crate::store::LeaseStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::collections::hash_map;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// In-memory lease store
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// One value per key
    keys: DashMap<String, String>,
    /// Namespace hashes: namespace -> field -> value
    hashes: DashMap<String, HashMap<String, String>>,
    /// When set, every call fails as if the backend were down
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory lease store");
        Self::default()
    }

    /// Simulate a backend outage. While set, every operation returns
    /// [`LeaseError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of plain keys plus namespace fields held (for monitoring)
    pub fn len(&self) -> usize {
        self.keys.len() + self.hashes.iter().map(|h| h.len()).sum::<usize>()
    }

    /// Whether the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fields in a namespace hash
    pub fn field_count(&self, namespace: &str) -> usize {
        self.hashes.get(namespace).map(|h| h.len()).unwrap_or(0)
    }

    /// Drop all state
    pub fn clear(&self) {
        self.keys.clear();
        self.hashes.clear();
    }

    fn check(&self) -> LeaseResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LeaseError::unavailable("memory store marked unavailable"));
        }
        Ok(())
    }

    fn drop_if_empty(&self, namespace: &str) {
        self.hashes.remove_if(namespace, |_, hash| hash.is_empty());
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> LeaseResult<bool> {
        self.check()?;
        match self.keys.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                trace!(key = %key, "Memory store: set if absent");
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> LeaseResult<Option<String>> {
        self.check()?;
        Ok(self.keys.get(key).map(|v| v.value().clone()))
    }

    async fn set_unconditional(&self, key: &str, value: &str) -> LeaseResult<Option<String>> {
        self.check()?;
        Ok(self.keys.insert(key.to_string(), value.to_string()))
    }

    async fn delete(&self, key: &str) -> LeaseResult<()> {
        self.check()?;
        self.keys.remove(key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> LeaseResult<bool> {
        self.check()?;
        Ok(self.keys.remove_if(key, |_, current| current == value).is_some())
    }

    async fn field_set_if_absent(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> LeaseResult<bool> {
        self.check()?;
        let mut hash = self.hashes.entry(namespace.to_string()).or_default();
        match hash.entry(field.to_string()) {
            hash_map::Entry::Occupied(_) => Ok(false),
            hash_map::Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                Ok(true)
            }
        }
    }

    async fn field_get(&self, namespace: &str, field: &str) -> LeaseResult<Option<String>> {
        self.check()?;
        Ok(self
            .hashes
            .get(namespace)
            .and_then(|hash| hash.get(field).cloned()))
    }

    async fn field_set(&self, namespace: &str, field: &str, value: &str) -> LeaseResult<()> {
        self.check()?;
        self.hashes
            .entry(namespace.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn field_delete(&self, namespace: &str, field: &str) -> LeaseResult<()> {
        self.check()?;
        if let Some(mut hash) = self.hashes.get_mut(namespace) {
            hash.remove(field);
        }
        self.drop_if_empty(namespace);
        Ok(())
    }

    async fn field_delete_if_equals(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> LeaseResult<bool> {
        self.check()?;
        let removed = match self.hashes.get_mut(namespace) {
            Some(mut hash) if hash.get(field).is_some_and(|current| current == value) => {
                hash.remove(field);
                true
            }
            _ => false,
        };
        self.drop_if_empty(namespace);
        Ok(removed)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "1").await.unwrap());
        assert!(!store.set_if_absent("k", "2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_swap_returns_previous() {
        let store = MemoryStore::new();

        assert_eq!(store.set_unconditional("k", "1").await.unwrap(), None);
        assert_eq!(
            store.set_unconditional("k", "2").await.unwrap(),
            Some("1".to_string())
        );
        assert_eq!(store.get("k").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();

        store.delete("missing").await.unwrap();
        store.set_if_absent("k", "1").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let store = MemoryStore::new();
        store.set_if_absent("k", "mine").await.unwrap();

        assert!(!store.delete_if_equals("k", "theirs").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("mine".to_string()));

        assert!(store.delete_if_equals("k", "mine").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_field_operations() {
        let store = MemoryStore::new();

        assert!(store.field_set_if_absent("ns", "a", "1").await.unwrap());
        assert!(!store.field_set_if_absent("ns", "a", "2").await.unwrap());
        assert!(store.field_set_if_absent("ns", "b", "3").await.unwrap());
        assert_eq!(store.field_count("ns"), 2);

        store.field_set("ns", "a", "4").await.unwrap();
        assert_eq!(store.field_get("ns", "a").await.unwrap(), Some("4".to_string()));
        assert_eq!(store.field_get("other", "a").await.unwrap(), None);

        store.field_delete("ns", "a").await.unwrap();
        store.field_delete("ns", "a").await.unwrap();
        assert_eq!(store.field_get("ns", "a").await.unwrap(), None);

        assert!(!store.field_delete_if_equals("ns", "b", "nope").await.unwrap());
        assert!(store.field_delete_if_equals("ns", "b", "3").await.unwrap());
        assert_eq!(store.field_count("ns"), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_keys_and_fields_are_separate() {
        let store = MemoryStore::new();

        store.set_if_absent("ns", "plain").await.unwrap();
        store.field_set("ns", "f", "hashed").await.unwrap();

        assert_eq!(store.get("ns").await.unwrap(), Some("plain".to_string()));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let err = store.set_if_absent("k", "1").await.unwrap_err();
        assert!(matches!(err, LeaseError::StoreUnavailable(_)));
        assert!(store.field_get("ns", "k").await.is_err());

        store.set_unavailable(false);
        assert!(store.set_if_absent("k", "1").await.unwrap());
    }

    #[test]
    fn test_store_type() {
        let store = MemoryStore::new();
        assert_eq!(store.store_type(), "memory");
    }
}

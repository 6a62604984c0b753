//! Where lease records live in the store.
//!
//! Two layouts share one acquire protocol:
//!
//! - [`LeaseLayout::PerKey`] keeps one store key per lock (`<prefix>:<lock key>`).
//!   Stealing an expired lease uses an atomic swap, so at most one racer is
//!   granted each expiry generation.
//! - [`LeaseLayout::Namespaced`] keeps every lock as a field of a single hash.
//!   Hash fields have no swap-with-previous primitive, so the steal trusts the
//!   value read just before the write. Two racers that both read the expired
//!   record before either writes will both be granted the lease. Pick this
//!   layout only when that window is acceptable.

use crate::error::LeaseResult;
use crate::store::LeaseStore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much the steal of an expired lease can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealGuarantee {
    /// The store reports the value it displaced.
    /// At most one concurrent caller wins per expiry generation.
    Atomic,
    /// The displaced value comes from an earlier read.
    /// Concurrent callers may both win when their reads interleave.
    ReadThenWrite,
}

/// Layout selector used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// One store key per lock
    #[default]
    PerKey,
    /// One hash field per lock under a shared namespace key
    Namespaced,
}

impl LayoutKind {
    /// Parse `key`/`per_key` or `namespaced`/`hash`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "key" | "per_key" | "per-key" => Some(Self::PerKey),
            "namespaced" | "hash" => Some(Self::Namespaced),
            _ => None,
        }
    }
}

/// Resolved record location strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseLayout {
    /// `<prefix>:<lock key>`, or the bare lock key when the prefix is empty.
    PerKey {
        /// Key prefix
        prefix: String,
    },
    /// Field `<lock key>` of the hash stored at `namespace`.
    Namespaced {
        /// Hash key
        namespace: String,
    },
}

impl LeaseLayout {
    /// One key per lock under `prefix`.
    pub fn per_key(prefix: impl Into<String>) -> Self {
        Self::PerKey {
            prefix: prefix.into(),
        }
    }

    /// One field per lock in the hash at `namespace`.
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self::Namespaced {
            namespace: namespace.into(),
        }
    }

    /// Race guarantee of the expired-lease steal.
    pub fn steal_guarantee(&self) -> StealGuarantee {
        match self {
            Self::PerKey { .. } => StealGuarantee::Atomic,
            Self::Namespaced { .. } => StealGuarantee::ReadThenWrite,
        }
    }

    /// Human readable location of a lock's record.
    pub fn location(&self, key: &str) -> String {
        match self {
            Self::PerKey { .. } => self.store_key(key),
            Self::Namespaced { namespace } => format!("{}[{}]", namespace, key),
        }
    }

    fn store_key(&self, key: &str) -> String {
        match self {
            Self::PerKey { prefix } if !prefix.is_empty() => format!("{}:{}", prefix, key),
            _ => key.to_string(),
        }
    }

    pub(crate) async fn claim(
        &self,
        store: &dyn LeaseStore,
        key: &str,
        value: &str,
    ) -> LeaseResult<bool> {
        match self {
            Self::PerKey { .. } => store.set_if_absent(&self.store_key(key), value).await,
            Self::Namespaced { namespace } => {
                store.field_set_if_absent(namespace, key, value).await
            }
        }
    }

    pub(crate) async fn read(&self, store: &dyn LeaseStore, key: &str) -> LeaseResult<Option<String>> {
        match self {
            Self::PerKey { .. } => store.get(&self.store_key(key)).await,
            Self::Namespaced { namespace } => store.field_get(namespace, key).await,
        }
    }

    /// Overwrite the record and report the value it replaced.
    ///
    /// For the namespaced layout the reported value is `observed`, the result
    /// of the caller's earlier read, not what the write actually displaced.
    pub(crate) async fn steal(
        &self,
        store: &dyn LeaseStore,
        key: &str,
        value: &str,
        observed: Option<&str>,
    ) -> LeaseResult<Option<String>> {
        match self {
            Self::PerKey { .. } => store.set_unconditional(&self.store_key(key), value).await,
            Self::Namespaced { namespace } => {
                store.field_set(namespace, key, value).await?;
                Ok(observed.map(str::to_string))
            }
        }
    }

    pub(crate) async fn clear(&self, store: &dyn LeaseStore, key: &str) -> LeaseResult<()> {
        match self {
            Self::PerKey { .. } => store.delete(&self.store_key(key)).await,
            Self::Namespaced { namespace } => store.field_delete(namespace, key).await,
        }
    }

    pub(crate) async fn clear_if(
        &self,
        store: &dyn LeaseStore,
        key: &str,
        value: &str,
    ) -> LeaseResult<bool> {
        match self {
            Self::PerKey { .. } => store.delete_if_equals(&self.store_key(key), value).await,
            Self::Namespaced { namespace } => {
                store.field_delete_if_equals(namespace, key, value).await
            }
        }
    }
}

impl fmt::Display for LeaseLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerKey { prefix } => write!(f, "per-key({})", prefix),
            Self::Namespaced { namespace } => write!(f, "namespaced({})", namespace),
        }
    }
}

//! Lease locks over a shared store

use crate::clock::{Clock, SystemClock};
use crate::config::{LeaseConfig, default_config};
use crate::error::LeaseResult;
use crate::guard::LeaseGuard;
use crate::layout::{LeaseLayout, StealGuarantee};
use crate::record::LeaseRecord;
use crate::store::LeaseStore;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// A lease this caller was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    key: String,
    record: LeaseRecord,
}

impl Lease {
    /// Lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Absolute expiry in epoch seconds.
    pub fn expires_at(&self) -> i64 {
        self.record.expires_at
    }

    /// The record as written to the store.
    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Acquisition {
    /// The caller now holds the lease.
    Acquired(Lease),
    /// Another holder has a valid lease. Not an error.
    Denied {
        /// Lock key
        key: String,
        /// Expiry of the lease that blocked us, when it could be read
        held_until: Option<i64>,
    },
}

impl Acquisition {
    /// Whether the lease was granted.
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }

    /// Whether the attempt was denied.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// The granted lease, if any.
    pub fn lease(&self) -> Option<&Lease> {
        match self {
            Self::Acquired(lease) => Some(lease),
            Self::Denied { .. } => None,
        }
    }

    /// Take the granted lease, if any.
    pub fn into_lease(self) -> Option<Lease> {
        match self {
            Self::Acquired(lease) => Some(lease),
            Self::Denied { .. } => None,
        }
    }
}

/// Result of [`LeaseLock::run_exclusive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusive<T> {
    /// The work ran under the lease and the lease was released.
    Ran(T),
    /// The work did not run.
    Denied {
        /// Expiry of the blocking lease, when known
        held_until: Option<i64>,
    },
}

impl<T> Exclusive<T> {
    /// The work's output, if it ran.
    pub fn into_output(self) -> Option<T> {
        match self {
            Self::Ran(value) => Some(value),
            Self::Denied { .. } => None,
        }
    }

    /// Whether the work ran.
    pub fn ran(&self) -> bool {
        matches!(self, Self::Ran(_))
    }
}

/// Expiring, ownerless lock over a [`LeaseStore`].
///
/// A lease record holds only the absolute expiry of the lease (plus an
/// optional holder token). Acquisition follows the steal protocol:
///
/// 1. `set_if_absent` wins a free key outright.
/// 2. Otherwise a still-valid record denies the caller.
/// 3. Otherwise the record is expired: swap in a fresh one and keep it only if
///    the displaced value was itself expired.
///
/// The lock holds no local state between calls and performs no retries.
#[derive(Clone)]
pub struct LeaseLock {
    store: Arc<dyn LeaseStore>,
    config: LeaseConfig,
    layout: LeaseLayout,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("store", &self.store.store_type())
            .field("layout", &self.layout)
            .field("config", &self.config)
            .finish()
    }
}

impl LeaseLock {
    /// Create a lock using a snapshot of the process-wide default configuration.
    ///
    /// A default that fails [`LeaseConfig::validate`] is logged and replaced by
    /// [`LeaseConfig::default`].
    ///
    /// # Examples
    ///
    /// ```
    /// use runlock_lease::{LeaseLock, MemoryStore};
    /// use std::sync::Arc;
    ///
    /// let lock = LeaseLock::new(Arc::new(MemoryStore::new()));
    /// assert_eq!(lock.store_type(), "memory");
    /// ```
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        let config = default_config().or_builtin();
        let layout = config.lease_layout();
        Self {
            store,
            config,
            layout,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a lock with an explicit configuration.
    pub fn with_config(store: Arc<dyn LeaseStore>, config: LeaseConfig) -> LeaseResult<Self> {
        Self::builder().config(config).build(store)
    }

    /// Create a builder.
    pub fn builder() -> LeaseLockBuilder {
        LeaseLockBuilder::new()
    }

    /// Configuration this lock was built with.
    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Record layout in use.
    pub fn layout(&self) -> &LeaseLayout {
        &self.layout
    }

    /// Race guarantee of this lock's layout.
    pub fn steal_guarantee(&self) -> StealGuarantee {
        self.layout.steal_guarantee()
    }

    /// Backing store type.
    pub fn store_type(&self) -> &'static str {
        self.store.store_type()
    }

    /// Current time according to the lock's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Try to acquire `key` now, for the configured lease duration.
    pub async fn try_acquire(&self, key: &str) -> LeaseResult<Acquisition> {
        self.try_acquire_at(key, self.clock.now()).await
    }

    /// Try to acquire `key` as of `now` (epoch seconds), for the configured
    /// lease duration.
    pub async fn try_acquire_at(&self, key: &str, now: i64) -> LeaseResult<Acquisition> {
        self.try_acquire_for(key, now, self.config.lease_seconds())
            .await
    }

    /// Try to acquire `key` as of `now` for `lease_secs` seconds.
    ///
    /// The stored expiry is `now + lease_secs + 1`; the extra second keeps a
    /// lease taken late in a second from expiring early once truncated.
    ///
    /// # Errors
    ///
    /// Any store failure aborts the attempt with
    /// [`LeaseError::StoreUnavailable`](crate::LeaseError::StoreUnavailable).
    /// A failed attempt never reports the lock as free.
    pub async fn try_acquire_for(
        &self,
        key: &str,
        now: i64,
        lease_secs: u64,
    ) -> LeaseResult<Acquisition> {
        let lease_secs = i64::try_from(lease_secs).unwrap_or(i64::MAX / 2);
        let record = LeaseRecord::new(now.saturating_add(lease_secs).saturating_add(1), self.holder());
        let value = record.to_string();
        let store = &*self.store;

        if self.config.debug_mode {
            debug!(
                key = %key,
                location = %self.layout.location(key),
                expires_at = record.expires_at,
                "Attempting to acquire lease"
            );
        }

        if self.layout.claim(store, key, &value).await? {
            trace!(key = %key, "Lease was free");
            return Ok(self.granted(key, record));
        }

        let observed = self.layout.read(store, key).await?;
        if let Some(expiry) = observed.as_deref().map(|raw| self.stored_expiry(key, raw))
            && expiry > now
        {
            return Ok(self.denied(key, Some(expiry)));
        }

        // Expired, corrupt, or released since the claim: take it over
        let previous = self
            .layout
            .steal(store, key, &value, observed.as_deref())
            .await?;

        match previous.as_deref().map(|raw| self.stored_expiry(key, raw)) {
            Some(expiry) if expiry > now => {
                trace!(key = %key, "Lost steal race to a fresh lease");
                Ok(self.denied(key, Some(expiry)))
            }
            _ => {
                trace!(key = %key, "Reclaimed expired lease");
                Ok(self.granted(key, record))
            }
        }
    }

    /// Try to acquire `key` and wrap the lease in a guard that releases it
    /// when dropped.
    pub async fn try_lock(&self, key: &str) -> LeaseResult<Option<LeaseGuard>> {
        Ok(self
            .try_acquire(key)
            .await?
            .into_lease()
            .map(|lease| LeaseGuard::new(self.clone(), lease)))
    }

    /// Delete the lease at `key` whoever holds it.
    ///
    /// Idempotent. Because the lease is released by key, a caller whose lease
    /// already expired and was taken over will delete the new holder's lease.
    /// Use [`release_lease`](Self::release_lease) or [`LeaseGuard`] to only
    /// ever remove your own.
    pub async fn release(&self, key: &str) -> LeaseResult<()> {
        if self.config.debug_mode {
            debug!(key = %key, location = %self.layout.location(key), "Releasing lease");
        }
        self.layout.clear(&*self.store, key).await
    }

    /// Delete `lease` only if its record is still the one stored.
    /// Returns whether the record was still ours.
    pub async fn release_lease(&self, lease: &Lease) -> LeaseResult<bool> {
        let released = self
            .layout
            .clear_if(&*self.store, &lease.key, &lease.record.to_string())
            .await?;

        if !released {
            debug!(key = %lease.key, "Lease was already expired and taken over or released");
        }
        Ok(released)
    }

    /// Whether `key` is held by a valid lease now.
    pub async fn is_locked(&self, key: &str) -> LeaseResult<bool> {
        self.is_locked_at(key, self.clock.now()).await
    }

    /// Whether `key` is held by a valid lease at `now`. Read only.
    pub async fn is_locked_at(&self, key: &str, now: i64) -> LeaseResult<bool> {
        Ok(self
            .holder_expiry(key)
            .await?
            .is_some_and(|expiry| expiry > now))
    }

    /// Stored expiry of `key`, if a readable record exists.
    pub async fn holder_expiry(&self, key: &str) -> LeaseResult<Option<i64>> {
        Ok(self
            .layout
            .read(&*self.store, key)
            .await?
            .and_then(|raw| LeaseRecord::parse(&raw).ok())
            .map(|record| record.expires_at))
    }

    /// Run `work` while holding `key`, releasing on every exit path.
    ///
    /// When the lease is denied the work is not polled. When the work panics
    /// the lease is released and the panic resumed.
    pub async fn run_exclusive<F, T>(&self, key: &str, work: F) -> LeaseResult<Exclusive<T>>
    where
        F: Future<Output = T>,
    {
        let lease = match self.try_acquire(key).await? {
            Acquisition::Acquired(lease) => lease,
            Acquisition::Denied { held_until, .. } => {
                return Ok(Exclusive::Denied { held_until });
            }
        };

        let outcome = AssertUnwindSafe(work).catch_unwind().await;

        if let Err(e) = self.release_lease(&lease).await {
            // The lease expiry still bounds how long the key stays blocked
            error!(key = %key, expires_at = lease.expires_at(), error = %e, "Failed to release lease");
        }

        match outcome {
            Ok(value) => Ok(Exclusive::Ran(value)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    fn holder(&self) -> Option<String> {
        self.config
            .holder_tokens
            .then(|| Uuid::new_v4().simple().to_string())
    }

    fn granted(&self, key: &str, record: LeaseRecord) -> Acquisition {
        if self.config.debug_mode {
            debug!(key = %key, expires_at = record.expires_at, "Acquired lease");
        }
        Acquisition::Acquired(Lease {
            key: key.to_string(),
            record,
        })
    }

    fn denied(&self, key: &str, held_until: Option<i64>) -> Acquisition {
        if self.config.debug_mode {
            debug!(key = %key, held_until = ?held_until, "Lease held elsewhere");
        }
        Acquisition::Denied {
            key: key.to_string(),
            held_until,
        }
    }

    /// Expiry of a stored record. Unreadable records count as long expired so
    /// a corrupt value can never block a key forever.
    fn stored_expiry(&self, key: &str, raw: &str) -> i64 {
        match LeaseRecord::parse(raw) {
            Ok(record) => record.expires_at,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable lease record");
                i64::MIN
            }
        }
    }
}

/// Builder for [`LeaseLock`].
#[derive(Default)]
pub struct LeaseLockBuilder {
    config: Option<LeaseConfig>,
    clock: Option<Arc<dyn Clock>>,
}

impl LeaseLockBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration instead of the process-wide default.
    pub fn config(mut self, config: LeaseConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this clock instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the lock over `store`.
    pub fn build(self, store: Arc<dyn LeaseStore>) -> LeaseResult<LeaseLock> {
        let config = self.config.unwrap_or_else(default_config);
        config.validate()?;

        let layout = config.lease_layout();
        if layout.steal_guarantee() == StealGuarantee::ReadThenWrite {
            debug!(
                layout = %layout,
                "Namespaced leases can be granted twice when expired leases are raced"
            );
        }

        Ok(LeaseLock {
            store,
            layout,
            config,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

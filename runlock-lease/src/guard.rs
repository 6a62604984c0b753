//! Lease guard that releases on drop

use crate::error::LeaseResult;
use crate::lock::{Lease, LeaseLock};
use tracing::{debug, warn};

/// Holds a granted lease and releases it when dropped.
///
/// Release only removes this guard's own record: if the lease expired and
/// another caller took it over, dropping the guard leaves the new lease alone.
/// Dropping outside a Tokio runtime cannot release; the lease then runs until
/// its expiry.
#[must_use = "the lease is released as soon as the guard is dropped"]
pub struct LeaseGuard {
    lock: LeaseLock,
    lease: Lease,
    armed: bool,
}

impl LeaseGuard {
    pub(crate) fn new(lock: LeaseLock, lease: Lease) -> Self {
        Self {
            lock,
            lease,
            armed: true,
        }
    }

    /// The held lease.
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Lock key.
    pub fn key(&self) -> &str {
        self.lease.key()
    }

    /// Absolute expiry, epoch seconds.
    pub fn expires_at(&self) -> i64 {
        self.lease.expires_at()
    }

    /// Release now and report whether the record was still ours.
    pub async fn release(mut self) -> LeaseResult<bool> {
        self.armed = false;
        self.lock.release_lease(&self.lease).await
    }

    /// Give up the guard without releasing. The lease stays until it expires
    /// or someone releases the key.
    pub fn leak(mut self) -> Lease {
        self.armed = false;
        self.lease.clone()
    }
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("lease", &self.lease)
            .field("armed", &self.armed)
            .finish()
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        // Best effort release on drop
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = self.lock.clone();
                let lease = self.lease.clone();
                handle.spawn(async move {
                    if let Err(e) = lock.release_lease(&lease).await {
                        warn!(key = %lease.key(), error = %e, "Failed to release lease on drop");
                    }
                });
            }
            Err(_) => {
                debug!(key = %self.lease.key(), "No runtime to release lease on drop");
            }
        }
    }
}

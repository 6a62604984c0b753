//! Lease configuration.
//!
//! Every [`LeaseLock`](crate::LeaseLock) carries its own [`LeaseConfig`]. The
//! process-wide default returned by [`default_config`] is only consulted when a
//! lock is built without one, and is copied at that moment: changing the
//! default later never affects locks that already exist.

use crate::error::{LeaseError, LeaseResult};
use crate::layout::{LayoutKind, LeaseLayout};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Default lease duration: five days, long enough for slow jobs.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(60 * 60 * 24 * 5);

/// Default pause before a denied job is re-submitted.
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(1);

/// Default namespace hash key for the namespaced layout.
pub const DEFAULT_KEY_BASE: &str = "r-uae";

/// Default key prefix for the per-key layout.
pub const DEFAULT_KEY_PREFIX: &str = "runlock";

static DEFAULT_CONFIG: Lazy<RwLock<LeaseConfig>> =
    Lazy::new(|| RwLock::new(LeaseConfig::from_env().build().or_builtin()));

/// Snapshot of the process-wide default configuration.
pub fn default_config() -> LeaseConfig {
    DEFAULT_CONFIG.read().clone()
}

/// Replace the process-wide default configuration.
pub fn set_default(config: LeaseConfig) {
    *DEFAULT_CONFIG.write() = config;
}

/// Edit the process-wide default configuration in place.
pub fn configure<F>(f: F)
where
    F: FnOnce(&mut LeaseConfig),
{
    f(&mut DEFAULT_CONFIG.write());
}

/// Lease configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// How long an acquired lease stays valid.
    #[serde(with = "duration_secs")]
    pub lease_duration: Duration,
    /// Delay before a denied job is put back on its queue.
    #[serde(with = "duration_secs")]
    pub requeue_interval: Duration,
    /// Hash key holding all leases in the namespaced layout.
    pub key_base: String,
    /// Prefix of lease keys in the per-key layout. Empty means no prefix.
    pub key_prefix: String,
    /// Record layout.
    pub layout: LayoutKind,
    /// Append a random holder token to each record so guards only ever
    /// release their own lease.
    pub holder_tokens: bool,
    /// Emit per-attempt debug events.
    pub debug_mode: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            key_base: DEFAULT_KEY_BASE.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            layout: LayoutKind::PerKey,
            holder_tokens: true,
            debug_mode: false,
        }
    }
}

impl LeaseConfig {
    /// Create a builder.
    pub fn builder() -> LeaseConfigBuilder {
        LeaseConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// - `RUNLOCK_LEASE_SECONDS` - lease duration in seconds
    /// - `RUNLOCK_REQUEUE_INTERVAL_SECS` - requeue delay in seconds
    /// - `RUNLOCK_KEY_BASE` - namespace hash key
    /// - `RUNLOCK_KEY_PREFIX` - per-key prefix
    /// - `RUNLOCK_LAYOUT` - `key` or `namespaced`
    /// - `RUNLOCK_DEBUG` - `1`, `true`, or any value mentioning `runtime`
    pub fn from_env() -> LeaseConfigBuilder {
        let mut builder = LeaseConfigBuilder::new();

        if let Ok(secs) = std::env::var("RUNLOCK_LEASE_SECONDS")
            && let Ok(secs) = secs.parse()
        {
            builder = builder.lease_duration(Duration::from_secs(secs));
        }

        if let Ok(secs) = std::env::var("RUNLOCK_REQUEUE_INTERVAL_SECS")
            && let Ok(secs) = secs.parse()
        {
            builder = builder.requeue_interval(Duration::from_secs(secs));
        }

        if let Ok(base) = std::env::var("RUNLOCK_KEY_BASE") {
            builder = builder.key_base(base);
        }

        if let Ok(prefix) = std::env::var("RUNLOCK_KEY_PREFIX") {
            builder = builder.key_prefix(prefix);
        }

        if let Ok(layout) = std::env::var("RUNLOCK_LAYOUT")
            && let Some(layout) = LayoutKind::parse(&layout)
        {
            builder = builder.layout(layout);
        }

        if let Ok(debug) = std::env::var("RUNLOCK_DEBUG") {
            builder = builder.debug_mode(debug_flag(&debug));
        }

        builder
    }

    /// Lease duration in whole seconds.
    pub fn lease_seconds(&self) -> u64 {
        self.lease_duration.as_secs()
    }

    /// Resolve the record layout.
    pub fn lease_layout(&self) -> LeaseLayout {
        match self.layout {
            LayoutKind::PerKey => LeaseLayout::per_key(self.key_prefix.clone()),
            LayoutKind::Namespaced => LeaseLayout::namespaced(self.key_base.clone()),
        }
    }

    /// This configuration if it validates, otherwise [`LeaseConfig::default`].
    ///
    /// Used where a bad value cannot be reported to a caller, such as the
    /// process-wide default loaded from the environment.
    pub(crate) fn or_builtin(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                warn!(error = %e, "Ignoring invalid lease configuration, using built-in defaults");
                Self::default()
            }
        }
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> LeaseResult<()> {
        if self.lease_duration.as_secs() == 0 {
            return Err(LeaseError::config(
                "lease duration must be at least one second",
            ));
        }
        if self.lease_duration.as_secs() > i64::MAX as u64 / 2 {
            return Err(LeaseError::config("lease duration is too large"));
        }
        if self.layout == LayoutKind::Namespaced && self.key_base.is_empty() {
            return Err(LeaseError::config(
                "namespaced layout needs a non-empty key base",
            ));
        }
        Ok(())
    }
}

fn debug_flag(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "1" || value == "true" || value.contains("runtime")
}

/// Builder for lease configuration.
#[derive(Default)]
pub struct LeaseConfigBuilder {
    config: LeaseConfig,
}

impl LeaseConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: LeaseConfig::default(),
        }
    }

    /// Set the lease duration.
    pub fn lease_duration(mut self, duration: Duration) -> Self {
        self.config.lease_duration = duration;
        self
    }

    /// Set the requeue interval.
    pub fn requeue_interval(mut self, interval: Duration) -> Self {
        self.config.requeue_interval = interval;
        self
    }

    /// Set the namespace hash key.
    pub fn key_base(mut self, base: impl Into<String>) -> Self {
        self.config.key_base = base.into();
        self
    }

    /// Set the per-key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Set the record layout.
    pub fn layout(mut self, layout: LayoutKind) -> Self {
        self.config.layout = layout;
        self
    }

    /// Use the namespaced layout under `base`.
    pub fn namespaced(self, base: impl Into<String>) -> Self {
        self.key_base(base).layout(LayoutKind::Namespaced)
    }

    /// Enable or disable holder tokens.
    pub fn holder_tokens(mut self, enabled: bool) -> Self {
        self.config.holder_tokens = enabled;
        self
    }

    /// Enable or disable per-attempt debug events.
    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LeaseConfig {
        self.config
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LeaseConfig::default();
        assert_eq!(config.lease_duration, Duration::from_secs(432_000));
        assert_eq!(config.requeue_interval, Duration::from_secs(1));
        assert_eq!(config.key_base, "r-uae");
        assert_eq!(config.layout, LayoutKind::PerKey);
        assert!(config.holder_tokens);
        assert!(!config.debug_mode);
    }

    #[test]
    fn test_builder() {
        let config = LeaseConfig::builder()
            .lease_duration(Duration::from_secs(1000))
            .requeue_interval(Duration::from_secs(3))
            .namespaced("unicorns")
            .holder_tokens(false)
            .build();

        assert_eq!(config.lease_seconds(), 1000);
        assert_eq!(config.requeue_interval, Duration::from_secs(3));
        assert_eq!(config.lease_layout(), LeaseLayout::namespaced("unicorns"));
        assert!(!config.holder_tokens);
    }

    #[test]
    fn test_per_key_layout_uses_prefix() {
        let config = LeaseConfig::builder().key_prefix("lonely_job").build();
        assert_eq!(config.lease_layout(), LeaseLayout::per_key("lonely_job"));
    }

    #[test]
    fn test_validate() {
        assert!(LeaseConfig::default().validate().is_ok());

        let zero = LeaseConfig::builder()
            .lease_duration(Duration::from_millis(500))
            .build();
        assert!(zero.validate().is_err());

        let no_base = LeaseConfig::builder().namespaced("").build();
        assert!(no_base.validate().is_err());
    }

    #[test]
    fn test_invalid_config_falls_back_to_builtin() {
        let zero = LeaseConfig::builder()
            .lease_duration(Duration::ZERO)
            .build();
        assert_eq!(zero.or_builtin(), LeaseConfig::default());

        let no_base = LeaseConfig::builder().namespaced("").build();
        assert_eq!(no_base.or_builtin(), LeaseConfig::default());

        let valid = LeaseConfig::builder()
            .lease_duration(Duration::from_secs(30))
            .build();
        assert_eq!(valid.clone().or_builtin(), valid);
    }

    #[test]
    fn test_debug_flag() {
        assert!(debug_flag("true"));
        assert!(debug_flag("1"));
        assert!(debug_flag("queue,runtime"));
        assert!(!debug_flag("false"));
        assert!(!debug_flag("queue"));
    }

    #[test]
    fn test_serializes_durations_as_seconds() {
        let config = LeaseConfig::builder()
            .lease_duration(Duration::from_secs(1000))
            .debug_mode(true)
            .build();

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["lease_duration"], 1000);
        assert_eq!(json["requeue_interval"], 1);
        assert_eq!(json["layout"], "per_key");
        assert_eq!(json["debug_mode"], true);

        let back: LeaseConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}

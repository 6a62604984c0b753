//! Lease record encoding.
//!
//! A record is the text stored at a lock key or namespace field:
//! `"<expiry>"` or `"<expiry>:<holder>"`, where `<expiry>` is the absolute
//! expiry instant in epoch seconds. Readers that only look at the leading
//! integer see the same expiry either way.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stored value that does not start with an integer timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid lease record: {raw:?}")]
pub struct RecordError {
    /// The raw stored value.
    pub raw: String,
}

/// Decoded lease record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Absolute expiry, epoch seconds.
    pub expires_at: i64,
    /// Random token identifying the holder, if one was written.
    pub holder: Option<String>,
}

impl LeaseRecord {
    /// Create a record.
    pub fn new(expires_at: i64, holder: Option<String>) -> Self {
        Self { expires_at, holder }
    }

    /// Parse a stored value.
    pub fn parse(raw: &str) -> Result<Self, RecordError> {
        let (expiry, holder) = match raw.split_once(':') {
            Some((expiry, holder)) => (expiry, Some(holder)),
            None => (raw, None),
        };

        let expires_at = expiry.trim().parse::<i64>().map_err(|_| RecordError {
            raw: raw.to_string(),
        })?;

        Ok(Self {
            expires_at,
            holder: holder.filter(|h| !h.is_empty()).map(str::to_string),
        })
    }

    /// Whether the lease is still valid at `now`.
    pub fn is_held_at(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

impl fmt::Display for LeaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.holder {
            Some(holder) => write!(f, "{}:{}", self.expires_at, holder),
            None => write!(f, "{}", self.expires_at),
        }
    }
}

impl FromStr for LeaseRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

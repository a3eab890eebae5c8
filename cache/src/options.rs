//! Per-call expiry selection.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Expiry options for a single write.
///
/// `valid_until` pins an absolute expiry and wins over `ttl` when both are
/// set. A zero `ttl` means the entry never expires. With neither set, the
/// cache instance's default TTL applies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            valid_until: None,
        }
    }

    pub fn with_valid_until(valid_until: DateTime<Utc>) -> Self {
        Self {
            ttl: None,
            valid_until: Some(valid_until),
        }
    }

    /// Resolves the options into an expiry instant, `None` meaning "never".
    pub fn resolve(&self, now: DateTime<Utc>, default_ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        if let Some(valid_until) = self.valid_until {
            return Some(valid_until);
        }

        match self.ttl.or(default_ttl) {
            Some(ttl) if !ttl.is_zero() => {
                let ttl = chrono::Duration::from_std(ttl).ok()?;
                now.checked_add_signed(ttl)
            }
            _ => None,
        }
    }
}

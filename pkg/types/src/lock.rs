use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use pkg_constants::lock::MAX_LEASE_SECS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A lock record as kept by a persistent lock store.
/// Stored at `/registry/locks/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Lock name, unique per protected task across the fleet
    pub name: String,
    /// Owner token of the acquisition that created this record
    pub owner: String,
    /// When the lock was acquired (store clock)
    pub acquired_at: DateTime<Utc>,
    /// When the lease runs out (store clock)
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn new(name: &str, owner: &str, now: DateTime<Utc>, max_lease: Duration) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            acquired_at: now,
            expires_at: lease_end(now, max_lease),
        }
    }

    /// Check if the lease has run out at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check if `owner` holds an unexpired lease at `now`.
    pub fn is_held_by(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.owner == owner && !self.is_expired_at(now)
    }
}

/// `start + lease`, saturating at the largest representable instant.
pub fn lease_end(start: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Lease bounds for one protected task.
///
/// `max_lease` caps how long a holder may keep the lock, even while still
/// running. `min_lease` is how long the lock stays held after acquisition
/// even if the work finishes early. The pair is checked on construction, so a
/// `LeaseConfig` in hand always satisfies `0 <= min_lease <= max_lease` and
/// `0 < max_lease <= MAX_LEASE_SECS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseConfig {
    max_lease: Duration,
    min_lease: Duration,
}

impl LeaseConfig {
    pub fn new(max_lease: Duration, min_lease: Duration) -> Result<Self> {
        if max_lease.is_zero() {
            bail!("max-lease must be greater than zero");
        }
        if max_lease > Duration::from_secs(MAX_LEASE_SECS) {
            bail!(
                "max-lease ({:?}) exceeds the {}s limit",
                max_lease,
                MAX_LEASE_SECS
            );
        }
        if min_lease > max_lease {
            bail!(
                "min-lease ({:?}) must not exceed max-lease ({:?})",
                min_lease,
                max_lease
            );
        }
        Ok(Self {
            max_lease,
            min_lease,
        })
    }

    pub fn max_lease(&self) -> Duration {
        self.max_lease
    }

    pub fn min_lease(&self) -> Duration {
        self.min_lease
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_bounds() {
        assert!(LeaseConfig::new(Duration::from_secs(60), Duration::from_secs(10)).is_ok());
        assert!(LeaseConfig::new(Duration::from_secs(60), Duration::ZERO).is_ok());
        assert!(LeaseConfig::new(Duration::from_secs(5), Duration::from_secs(5)).is_ok());
        assert!(LeaseConfig::new(Duration::ZERO, Duration::ZERO).is_err());
        assert!(LeaseConfig::new(Duration::from_secs(5), Duration::from_secs(6)).is_err());
    }

    #[test]
    fn oversized_lease_is_rejected() {
        let limit = Duration::from_secs(MAX_LEASE_SECS);
        assert!(LeaseConfig::new(limit, limit).is_ok());
        assert!(LeaseConfig::new(limit + Duration::from_secs(1), Duration::ZERO).is_err());
        assert!(LeaseConfig::new(Duration::from_secs(u64::MAX), Duration::ZERO).is_err());
        assert!(LeaseConfig::new(Duration::MAX, Duration::MAX).is_err());
    }

    #[test]
    fn record_expiry() {
        let now = Utc::now();
        let record = LockRecord::new("job-x", "r1:abc", now, Duration::from_secs(30));
        assert_eq!(record.expires_at - record.acquired_at, chrono::Duration::seconds(30));
        assert!(record.is_held_by("r1:abc", now));
        assert!(!record.is_held_by("r2:def", now));
        assert!(!record.is_expired_at(now + chrono::Duration::seconds(29)));
        assert!(record.is_expired_at(now + chrono::Duration::seconds(30)));
        assert!(!record.is_held_by("r1:abc", now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn record_json_shape() {
        let now = Utc::now();
        let record = LockRecord::new("job-x", "r1:abc", now, Duration::from_secs(1));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "job-x");
        assert_eq!(json["owner"], "r1:abc");
        assert!(json["expires_at"].is_string());
    }
}

//! Lockout domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{BucketKey, EventType, Identity};

/// Per-bucket lockout state: one record per (identity, event type) pair.
///
/// `lockout_until = None` means "not currently blocked". `permanent` is
/// terminal until an administrative unlock or delete. `last_duration_secs`
/// carries the length of the most recently applied lockout window so the
/// doubling step never has to re-derive it from timestamps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockoutRecord {
    pub identity: Identity,
    pub event_type: EventType,
    pub failure_count: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub permanent: bool,
    pub last_duration_secs: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Optimistic-concurrency column, assigned and bumped by the store.
    pub version: u64,
}

impl LockoutRecord {
    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.identity.clone(), self.event_type.clone())
    }

    /// Whether this record blocks admission at `now`.
    pub fn blocks_at(&self, now: DateTime<Utc>) -> bool {
        self.permanent || self.lockout_until.is_some_and(|until| until > now)
    }

    /// Whether the janitor may reclaim this record at `now`: non-permanent
    /// and the window (if any) has lapsed.
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.permanent && !self.lockout_until.is_some_and(|until| until >= now)
    }
}

/// Admin listing filter. Empty filter matches everything.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    pub identity: Option<Identity>,
    pub event_type: Option<EventType>,
    /// Only permanently locked buckets.
    pub permanent_only: bool,
    /// Only buckets blocking admission at this instant.
    pub blocking_at: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn matches(&self, record: &LockoutRecord) -> bool {
        if let Some(identity) = &self.identity {
            if record.identity != *identity {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if record.event_type != *event_type {
                return false;
            }
        }
        if self.permanent_only && !record.permanent {
            return false;
        }
        if let Some(at) = self.blocking_at {
            if !record.blocks_at(at) {
                return false;
            }
        }
        true
    }
}

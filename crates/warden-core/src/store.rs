//! Storage façade for lockout records.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::identity::BucketKey;
use crate::models::{LockoutRecord, RecordFilter};

/// Durable keyed storage for lockout records; no business logic.
///
/// Implementations must make the per-key write path atomic with respect to
/// concurrent writers:
/// - `upsert` is a compare-and-swap keyed on the record's version column.
///   `expected_version = None` inserts a fresh key and must fail with
///   [StoreError::Conflict] if the key already exists; `Some(v)` updates
///   only when the stored version still equals `v`.
/// - The version on the passed record is ignored; the store assigns the new
///   version and returns it.
/// - `delete_expired` must only ever remove non-permanent records whose
///   window has lapsed, and must honor the batch limit so sweeps never hold
///   the store for unbounded time.
pub trait LockoutStore: Send + Sync {
    fn get(&self, key: &BucketKey) -> Result<Option<LockoutRecord>, StoreError>;

    /// Insert or compare-and-swap update; returns the new version.
    fn upsert(
        &self,
        record: LockoutRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Removes the bucket; returns whether a record existed.
    fn delete(&self, key: &BucketKey) -> Result<bool, StoreError>;

    /// Admin listing.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<LockoutRecord>, StoreError>;

    /// Keys of reclaimable records at `now`, up to `limit`.
    fn list_expired(&self, now: DateTime<Utc>, limit: usize)
        -> Result<Vec<BucketKey>, StoreError>;

    /// Bulk-removes up to `limit` reclaimable records; returns the count.
    fn delete_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<u64, StoreError>;
}

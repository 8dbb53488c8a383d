//! In-memory lockout store.
//!
//! One map guarded by a single RwLock: reads share, writes serialize, and the
//! version column gives writers compare-and-swap semantics per key.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::identity::BucketKey;
use crate::models::{LockoutRecord, RecordFilter};
use crate::store::LockoutStore;

/// Process-local store, suitable for single-instance hosts and tests.
pub struct MemoryLockoutStore {
    records: RwLock<HashMap<BucketKey, LockoutRecord>>,
}

impl MemoryLockoutStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLockoutStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LockoutStore for MemoryLockoutStore {
    fn get(&self, key: &BucketKey) -> Result<Option<LockoutRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(records.get(key).cloned())
    }

    fn upsert(
        &self,
        mut record: LockoutRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let key = record.key();
        let current_version = records.get(&key).map(|r| r.version);
        match (current_version, expected_version) {
            (None, None) => {
                record.version = 1;
            }
            (Some(actual), Some(expected)) if actual == expected => {
                record.version = expected + 1;
            }
            _ => return Err(StoreError::Conflict),
        }
        let version = record.version;
        records.insert(key, record);
        Ok(version)
    }

    fn delete(&self, key: &BucketKey) -> Result<bool, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(records.remove(key).is_some())
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<LockoutRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut out: Vec<LockoutRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.modified_at.cmp(&b.modified_at));
        Ok(out)
    }

    fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<BucketKey>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(records
            .values()
            .filter(|r| r.expired_at(now))
            .take(limit)
            .map(|r| r.key())
            .collect())
    }

    fn delete_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<u64, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let keys: Vec<BucketKey> = records
            .values()
            .filter(|r| r.expired_at(now))
            .take(limit)
            .map(|r| r.key())
            .collect();
        let removed = keys.len() as u64;
        for key in keys {
            records.remove(&key);
        }
        Ok(removed)
    }
}

//! Janitor: background reclaimer of expired, non-permanent records.
//!
//! Purely a storage-reclamation optimization: the admission gate checks the
//! window timestamp directly, so correctness never depends on sweep
//! timeliness. Deletes run in bounded batches so a sweep never holds the
//! store long enough to stall intake or admission.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::store::LockoutStore;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Records removed per store call.
    pub batch_size: usize,
    /// Debounce interval for [Janitor::maybe_sweep], in seconds.
    pub min_interval_secs: i64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            min_interval_secs: 60,
        }
    }
}

pub struct Janitor {
    store: Arc<dyn LockoutStore>,
    config: JanitorConfig,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl Janitor {
    pub fn new(store: Arc<dyn LockoutStore>, config: JanitorConfig) -> Self {
        Self {
            store,
            config,
            last_sweep: Mutex::new(None),
        }
    }

    /// Removes every reclaimable record at `now`; returns the count.
    ///
    /// A store error aborts the sweep; the caller retries next cycle.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<u64, EngineError> {
        let mut total = 0;
        loop {
            let removed = self
                .store
                .delete_expired(now, self.config.batch_size)
                .map_err(EngineError::from)?;
            total += removed;
            if (removed as usize) < self.config.batch_size {
                break;
            }
        }
        if total > 0 {
            tracing::debug!(removed = total, "janitor sweep reclaimed expired lockouts");
        }
        Ok(total)
    }

    /// Opportunistic sweep, debounced to at most one per configured interval.
    ///
    /// Returns `None` when debounced or on a store error (which is logged and
    /// retried on a later call).
    pub fn maybe_sweep(&self, now: DateTime<Utc>) -> Option<u64> {
        {
            let mut last = self.last_sweep.lock().ok()?;
            if let Some(at) = *last {
                if now - at < Duration::seconds(self.config.min_interval_secs) {
                    return None;
                }
            }
            *last = Some(now);
        }
        match self.sweep(now) {
            Ok(removed) => Some(removed),
            Err(err) => {
                tracing::warn!(error = %err, "janitor sweep failed, will retry next cycle");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::identity::{BucketKey, EventType, Identity};
    use crate::memory_store::MemoryLockoutStore;
    use crate::models::{LockoutRecord, RecordFilter};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn seed(store: &MemoryLockoutStore, identity: &str, until: Option<i64>, permanent: bool) {
        let record = LockoutRecord {
            identity: Identity::parse(identity).unwrap(),
            event_type: EventType::parse("login_failure").unwrap(),
            failure_count: 2,
            lockout_until: until.map(|secs| t0() + Duration::seconds(secs)),
            permanent,
            last_duration_secs: until.unwrap_or(0),
            created_at: t0(),
            modified_at: t0(),
            version: 0,
        };
        store.upsert(record, None).unwrap();
    }

    #[test]
    fn sweep_removes_only_expired_non_permanent() {
        let store = Arc::new(MemoryLockoutStore::new());
        seed(&store, "203.0.113.1", Some(10), false);
        seed(&store, "203.0.113.2", Some(600), false);
        seed(&store, "203.0.113.3", Some(10), true);

        let janitor = Janitor::new(store.clone(), JanitorConfig::default());
        let removed = janitor.sweep(t0() + Duration::seconds(60)).unwrap();
        assert_eq!(removed, 1);

        let rest = store.list(&RecordFilter::default()).unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().any(|r| r.permanent));
        assert!(store
            .get(&BucketKey::parse("203.0.113.1", "login_failure").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn sweep_drains_across_batches() {
        let store = Arc::new(MemoryLockoutStore::new());
        for i in 0..7 {
            seed(&store, &format!("203.0.113.{i}"), Some(1), false);
        }
        let janitor = Janitor::new(
            store.clone(),
            JanitorConfig {
                batch_size: 3,
                ..JanitorConfig::default()
            },
        );
        assert_eq!(janitor.sweep(t0() + Duration::seconds(60)).unwrap(), 7);
        assert!(store.list(&RecordFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn maybe_sweep_debounces() {
        let store = Arc::new(MemoryLockoutStore::new());
        seed(&store, "203.0.113.1", Some(1), false);
        seed(&store, "203.0.113.2", Some(1), false);

        let janitor = Janitor::new(
            store.clone(),
            JanitorConfig {
                min_interval_secs: 60,
                ..JanitorConfig::default()
            },
        );
        let now = t0() + Duration::seconds(30);
        assert_eq!(janitor.maybe_sweep(now), Some(2));
        // Within the interval: debounced.
        seed(&store, "203.0.113.3", Some(1), false);
        assert_eq!(janitor.maybe_sweep(now + Duration::seconds(30)), None);
        // Past the interval: sweeps again.
        assert_eq!(janitor.maybe_sweep(now + Duration::seconds(61)), Some(1));
    }

    struct BrokenStore;

    impl LockoutStore for BrokenStore {
        fn get(&self, _: &BucketKey) -> Result<Option<LockoutRecord>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        fn upsert(&self, _: LockoutRecord, _: Option<u64>) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        fn delete(&self, _: &BucketKey) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        fn list(&self, _: &RecordFilter) -> Result<Vec<LockoutRecord>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        fn list_expired(
            &self,
            _: DateTime<Utc>,
            _: usize,
        ) -> Result<Vec<BucketKey>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        fn delete_expired(&self, _: DateTime<Utc>, _: usize) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[test]
    fn maybe_sweep_swallows_store_errors() {
        let janitor = Janitor::new(Arc::new(BrokenStore), JanitorConfig::default());
        assert_eq!(janitor.maybe_sweep(t0()), None);
        assert!(janitor.sweep(t0()).is_err());
    }
}

//! Append-only audit log.
//!
//! Entries are immutable facts; there is no update and no per-row delete.
//! Bulk retention purge (`purge_older_than`) exists for the admin layer that
//! owns log retention, and `scan` serves the external query/export
//! collaborators. Field widths are bounded at construction so a single
//! abusive client cannot grow a row without limit.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::identity::{MAX_EVENT_TYPE_LEN, MAX_IDENTITY_LEN};

/// Maximum stored length of an entry's free-text details.
pub const MAX_DETAILS_LEN: usize = 1_000;

/// Maximum stored length of an entry's action.
pub const MAX_ACTION_LEN: usize = 50;

/// One audit fact: what happened, to whom, when.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_category: String,
    pub action: String,
    pub details: String,
    pub identity: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Builds an entry, truncating every field to its bound.
    pub fn new(
        event_category: &str,
        action: &str,
        details: &str,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_category: truncate_to(event_category, MAX_EVENT_TYPE_LEN),
            action: truncate_to(action, MAX_ACTION_LEN),
            details: truncate_to(details, MAX_DETAILS_LEN),
            identity: truncate_to(identity, MAX_IDENTITY_LEN),
            created_at: now,
        }
    }
}

/// Truncates to at most `max` bytes without splitting a character.
fn truncate_to(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Query filter for `scan`. Empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub event_category: Option<String>,
    pub action: Option<String>,
    pub identity: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(category) = &self.event_category {
            if entry.event_category != *category {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if entry.action != *action {
                return false;
            }
        }
        if let Some(identity) = &self.identity {
            if entry.identity != *identity {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.created_at < since {
                return false;
            }
        }
        true
    }
}

/// Sink the engine appends audit facts to.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Entries matching the filter, oldest first.
    fn scan(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;

    /// Retention purge: removes entries created before `cutoff`; returns the count.
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory audit log, append order preserved.
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        entries.push(entry);
        Ok(())
    }

    fn scan(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let iter = entries.iter().filter(|e| filter.matches(e)).cloned();
        Ok(match filter.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let before = entries.len();
        entries.retain(|e| e.created_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

//! Lockout engine: admission gate, event intake, and administrative ops.
//!
//! The engine owns the orchestration only; state transitions are computed by
//! [crate::policy] and persisted through the [crate::store::LockoutStore]
//! compare-and-swap contract. `is_blocked` is a pure read: it never mutates,
//! never deletes, and never writes audit entries (adapters log the denials
//! they enforce).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::{AuditEntry, AuditSink};
use crate::clock::Clock;
use crate::config::{EngineConfig, FailMode};
use crate::error::{EngineError, StoreError};
use crate::identity::BucketKey;
use crate::ladder::LadderError;
use crate::models::{LockoutRecord, RecordFilter};
use crate::policy::{self, Evaluation, Outcome};
use crate::store::LockoutStore;
use crate::notify::Notifier;

/// Audit action recorded for every counted failure.
pub const ACTION_FAILED_ATTEMPT: &str = "failed_attempt";
/// Audit action recorded when a failure sets a blocking window.
pub const ACTION_LOCKOUT_ESCALATED: &str = "lockout_escalated";
/// Audit action recorded when a bucket goes permanent.
pub const ACTION_PERMANENT_LOCKOUT: &str = "permanent_lockout";
/// Audit action recorded when a success clears a ladder.
pub const ACTION_CLEARED: &str = "cleared";
/// Audit action recorded for an administrative unlock.
pub const ACTION_ADMIN_UNLOCK: &str = "admin_unlock";
/// Audit action recorded for an administrative delete.
pub const ACTION_ADMIN_DELETE: &str = "admin_delete";

/// Audit category for administrative overrides.
const CATEGORY_ADMIN: &str = "admin_action";

/// Progressive lockout and rate-limiting engine.
///
/// Safe for unbounded concurrent readers and writers: reads go straight to
/// the store, and writes on the same bucket are serialized by the store's
/// versioned upsert plus a bounded retry loop.
#[derive(Clone)]
pub struct LockoutEngine {
    store: Arc<dyn LockoutStore>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl LockoutEngine {
    pub fn new(
        store: Arc<dyn LockoutStore>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, LadderError> {
        config.validate()?;
        Ok(Self {
            store,
            audit,
            notifier,
            clock,
            config,
        })
    }

    /// The audit sink this engine writes to, for adapters that log their own
    /// admission decisions.
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Admission gate: is this bucket currently blocked?
    ///
    /// Pure read; expired records are left for the janitor.
    pub fn is_blocked(&self, identity: &str, event_type: &str) -> Result<bool, EngineError> {
        let key = BucketKey::parse(identity, event_type)?;
        let now = self.clock.now();
        let record = self.store.get(&key).map_err(EngineError::from)?;
        Ok(record.is_some_and(|r| r.blocks_at(now)))
    }

    /// Admission with the configured store-failure policy applied: returns
    /// `true` when the request may proceed. Validation errors still surface:
    /// a malformed identity is a caller bug, not a store outage.
    pub fn admit(&self, identity: &str, event_type: &str) -> Result<bool, EngineError> {
        match self.is_blocked(identity, event_type) {
            Ok(blocked) => Ok(!blocked),
            Err(EngineError::StoreUnavailable(msg)) => {
                tracing::warn!(error = %msg, "lockout store unavailable during admission");
                Ok(self.config.fail_mode == FailMode::Open)
            }
            Err(err) => Err(err),
        }
    }

    /// Event intake: counts one failure and escalates the bucket's ladder.
    ///
    /// Store errors surface to the caller; a lost lockout write is a
    /// security regression. Audit and notifier failures are logged and
    /// swallowed, the lockout row is the critical write.
    pub fn record_failure(&self, identity: &str, event_type: &str) -> Result<(), EngineError> {
        let key = BucketKey::parse(identity, event_type)?;
        let now = self.clock.now();
        let eval = self.write_next_state(&key, now)?;
        self.append_intake_audit(&key, now, &eval);
        self.dispatch_notifications(&key, &eval);
        Ok(())
    }

    /// Clears the bucket after a successful attempt; the ladder restarts from
    /// scratch on the next failure.
    pub fn record_success(&self, identity: &str, event_type: &str) -> Result<(), EngineError> {
        let key = BucketKey::parse(identity, event_type)?;
        let existed = self.store.delete(&key).map_err(EngineError::from)?;
        if existed {
            self.append_audit(
                key.event_type.as_str(),
                ACTION_CLEARED,
                &format!("ladder cleared for {key}"),
                key.identity.as_str(),
            );
        }
        Ok(())
    }

    /// Administrative unlock: clears `permanent` and the window but keeps the
    /// bucket's failure history. The doubling baseline is reset so the next
    /// escalation restarts from the rank-5 fallback.
    pub fn unlock(&self, identity: &str, event_type: &str) -> Result<bool, EngineError> {
        let key = BucketKey::parse(identity, event_type)?;
        let mut attempts = 0;
        loop {
            let Some(current) = self.store.get(&key).map_err(EngineError::from)? else {
                return Ok(false);
            };
            let expected = current.version;
            let mut record = current;
            record.permanent = false;
            record.lockout_until = None;
            record.last_duration_secs = 0;
            record.modified_at = self.clock.now();
            match self.store.upsert(record, Some(expected)) {
                Ok(_) => break,
                Err(StoreError::Conflict) if attempts < self.config.max_write_retries => {
                    attempts += 1;
                    tracing::debug!(bucket = %key, attempts, "unlock conflicted, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.append_audit(
            CATEGORY_ADMIN,
            ACTION_ADMIN_UNLOCK,
            &format!("admin unlocked {key}"),
            key.identity.as_str(),
        );
        Ok(true)
    }

    /// Administrative delete: removes the bucket entirely, as if never seen.
    pub fn delete(&self, identity: &str, event_type: &str) -> Result<bool, EngineError> {
        let key = BucketKey::parse(identity, event_type)?;
        let existed = self.store.delete(&key).map_err(EngineError::from)?;
        if existed {
            self.append_audit(
                CATEGORY_ADMIN,
                ACTION_ADMIN_DELETE,
                &format!("admin deleted {key}"),
                key.identity.as_str(),
            );
        }
        Ok(existed)
    }

    /// Current record for a bucket, for adapters and admin views.
    pub fn get_record(
        &self,
        identity: &str,
        event_type: &str,
    ) -> Result<Option<LockoutRecord>, EngineError> {
        let key = BucketKey::parse(identity, event_type)?;
        self.store.get(&key).map_err(EngineError::from)
    }

    /// Admin listing.
    pub fn list_records(&self, filter: &RecordFilter) -> Result<Vec<LockoutRecord>, EngineError> {
        self.store.list(filter).map_err(EngineError::from)
    }

    /// Read-evaluate-upsert loop. A conflict means another writer advanced
    /// the same bucket; re-read and re-evaluate so no increment is lost.
    fn write_next_state(
        &self,
        key: &BucketKey,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EngineError> {
        let mut attempts = 0;
        loop {
            let current = self.store.get(key).map_err(EngineError::from)?;
            let eval = policy::evaluate(current.as_ref(), now, &self.config.ladder);
            if eval.outcome == Outcome::PermanentNoOp {
                return Ok(eval);
            }

            let record = LockoutRecord {
                identity: key.identity.clone(),
                event_type: key.event_type.clone(),
                failure_count: eval.failure_count,
                lockout_until: eval.lockout_until,
                permanent: eval.permanent,
                last_duration_secs: eval.last_duration_secs,
                created_at: current.as_ref().map_or(now, |r| r.created_at),
                modified_at: now,
                version: 0,
            };
            let expected = current.as_ref().map(|r| r.version);
            match self.store.upsert(record, expected) {
                Ok(_) => return Ok(eval),
                Err(StoreError::Conflict) if attempts < self.config.max_write_retries => {
                    attempts += 1;
                    tracing::debug!(bucket = %key, attempts, "intake write conflicted, retrying");
                }
                Err(StoreError::Conflict) => {
                    return Err(EngineError::StoreUnavailable(format!(
                        "write conflict on {key} persisted past {} retries",
                        self.config.max_write_retries
                    )));
                }
                Err(StoreError::Unavailable(msg)) => {
                    return Err(EngineError::StoreUnavailable(msg));
                }
            }
        }
    }

    fn append_intake_audit(&self, key: &BucketKey, now: DateTime<Utc>, eval: &Evaluation) {
        let category = key.event_type.as_str();
        let identity = key.identity.as_str();
        self.append_audit(
            category,
            ACTION_FAILED_ATTEMPT,
            &format!("failure {} for {key}", eval.failure_count),
            identity,
        );
        match eval.outcome {
            Outcome::EscalatedPermanent => {
                self.append_audit(
                    category,
                    ACTION_PERMANENT_LOCKOUT,
                    &format!("{key} escalated to permanent lockout"),
                    identity,
                );
            }
            Outcome::Escalated if eval.blocks_at(now) => {
                let until = eval
                    .lockout_until
                    .map(|u| u.to_rfc3339())
                    .unwrap_or_default();
                self.append_audit(
                    category,
                    ACTION_LOCKOUT_ESCALATED,
                    &format!(
                        "{key} locked for {}s (until {until})",
                        eval.last_duration_secs
                    ),
                    identity,
                );
            }
            _ => {}
        }
    }

    fn dispatch_notifications(&self, key: &BucketKey, eval: &Evaluation) {
        if eval.notify_permanent() {
            if let Err(err) = self
                .notifier
                .notify_permanent_lockout(key.identity.as_str(), key.event_type.as_str())
            {
                tracing::warn!(bucket = %key, error = %err, "permanent lockout notification failed");
            }
        }
        if eval.notify_significant() {
            if let Err(err) = self.notifier.notify_lockout(
                key.identity.as_str(),
                key.event_type.as_str(),
                eval.failure_count,
            ) {
                tracing::warn!(bucket = %key, error = %err, "lockout notification failed");
            }
        }
    }

    fn append_audit(&self, category: &str, action: &str, details: &str, identity: &str) {
        let entry = AuditEntry::new(category, action, details, identity, self.clock.now());
        if let Err(err) = self.audit.record(entry) {
            tracing::warn!(error = %err, action, "audit append dropped");
        }
    }
}

//! Progressive lockout and rate-limiting engine.
//!
//! Turns a stream of failure/success signals from unrelated surfaces into
//! admit/deny decisions: one independent ladder per (identity, event type)
//! bucket, escalating from short lockouts through duration doubling up to a
//! permanent block. Storage, policy, admission, intake, janitor, and audit
//! are separate seams; the per-surface adapters live in `warden-sources`.

pub mod audit;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod janitor;
pub mod ladder;
pub mod memory_store;
pub mod models;
pub mod notify;
pub mod policy;
#[cfg(feature = "sqlite-persistence")]
pub mod sqlite_store;
pub mod store;

pub use audit::{AuditEntry, AuditFilter, AuditSink, MemoryAuditLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, FailMode};
pub use engine::LockoutEngine;
pub use error::{EngineError, StoreError};
pub use identity::{BucketKey, EventType, Identity};
pub use janitor::{Janitor, JanitorConfig};
pub use ladder::{Ladder, LadderError};
pub use memory_store::MemoryLockoutStore;
pub use models::{LockoutRecord, RecordFilter};
pub use notify::{AuditingNotifier, NoopNotifier, Notifier, NotifyError};
pub use policy::{evaluate, Evaluation, Outcome};
#[cfg(feature = "sqlite-persistence")]
pub use sqlite_store::{SqliteAuditLog, SqliteLockoutStore};
pub use store::LockoutStore;

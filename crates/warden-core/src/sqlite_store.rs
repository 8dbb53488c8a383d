//! SQLite-backed lockout and audit stores.
//!
//! This module is feature-gated behind `sqlite-persistence`.
//!
//! Layout: `lockouts` keyed UNIQUE on (identity, event_type) with a version
//! column for compare-and-swap updates; `logs` append-only. Timestamps are
//! epoch seconds.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::audit::{AuditEntry, AuditFilter, AuditSink};
use crate::error::StoreError;
use crate::identity::{BucketKey, EventType, Identity};
use crate::models::{LockoutRecord, RecordFilter};
use crate::store::LockoutStore;

fn map_store_err(prefix: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("{prefix}: {err}"))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn decode_timestamp(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| StoreError::Unavailable(format!("corrupt timestamp: {secs}")))
}

/// SQLite-backed lockout store.
pub struct SqliteLockoutStore {
    db_path: PathBuf,
    lock: Mutex<()>,
}

impl SqliteLockoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn open_connection(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = Path::new(&self.db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| map_store_err("create parent dir", e))?;
        }
        let conn =
            Connection::open(&self.db_path).map_err(|e| map_store_err("open sqlite db", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| map_store_err("set journal_mode", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| map_store_err("set synchronous", e))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| map_store_err("set busy_timeout", e))?;
        self.ensure_schema(&conn)?;
        Ok(conn)
    }

    fn ensure_schema(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS lockouts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL,
                event_type TEXT NOT NULL,
                failure_count INTEGER NOT NULL DEFAULT 0,
                lockout_until INTEGER,
                permanent INTEGER NOT NULL DEFAULT 0,
                last_duration_secs INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                modified_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                UNIQUE (identity, event_type)
            );
            CREATE INDEX IF NOT EXISTS idx_lockouts_expiry
            ON lockouts (permanent, lockout_until);
            ",
        )
        .map_err(|e| map_store_err("ensure lockouts schema", e))?;
        Ok(())
    }
}

impl LockoutStore for SqliteLockoutStore {
    fn get(&self, key: &BucketKey) -> Result<Option<LockoutRecord>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let row = conn
            .query_row(
                "SELECT identity, event_type, failure_count, lockout_until, permanent,
                        last_duration_secs, created_at, modified_at, version
                 FROM lockouts WHERE identity = ?1 AND event_type = ?2",
                params![key.identity.as_str(), key.event_type.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| map_store_err("get lockout", e))?;

        match row {
            Some(raw) => Ok(Some(decode_lockout(raw)?)),
            None => Ok(None),
        }
    }

    fn upsert(
        &self,
        record: LockoutRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let until = record.lockout_until.map(|u| u.timestamp());

        match expected_version {
            None => {
                conn.execute(
                    "INSERT INTO lockouts
                     (identity, event_type, failure_count, lockout_until, permanent,
                      last_duration_secs, created_at, modified_at, version)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)",
                    params![
                        record.identity.as_str(),
                        record.event_type.as_str(),
                        record.failure_count as i64,
                        until,
                        record.permanent,
                        record.last_duration_secs,
                        record.created_at.timestamp(),
                        record.modified_at.timestamp(),
                    ],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::Conflict
                    } else {
                        map_store_err("insert lockout", e)
                    }
                })?;
                Ok(1)
            }
            Some(expected) => {
                let changed = conn
                    .execute(
                        "UPDATE lockouts
                         SET failure_count = ?3, lockout_until = ?4, permanent = ?5,
                             last_duration_secs = ?6, modified_at = ?7, version = version + 1
                         WHERE identity = ?1 AND event_type = ?2 AND version = ?8",
                        params![
                            record.identity.as_str(),
                            record.event_type.as_str(),
                            record.failure_count as i64,
                            until,
                            record.permanent,
                            record.last_duration_secs,
                            record.modified_at.timestamp(),
                            expected as i64,
                        ],
                    )
                    .map_err(|e| map_store_err("update lockout", e))?;
                if changed == 0 {
                    return Err(StoreError::Conflict);
                }
                Ok(expected + 1)
            }
        }
    }

    fn delete(&self, key: &BucketKey) -> Result<bool, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let changed = conn
            .execute(
                "DELETE FROM lockouts WHERE identity = ?1 AND event_type = ?2",
                params![key.identity.as_str(), key.event_type.as_str()],
            )
            .map_err(|e| map_store_err("delete lockout", e))?;
        Ok(changed > 0)
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<LockoutRecord>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT identity, event_type, failure_count, lockout_until, permanent,
                        last_duration_secs, created_at, modified_at, version
                 FROM lockouts ORDER BY modified_at ASC, id ASC",
            )
            .map_err(|e| map_store_err("prepare list", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })
            .map_err(|e| map_store_err("query list", e))?;

        let mut out = Vec::new();
        for row in rows {
            let record = decode_lockout(row.map_err(|e| map_store_err("row decode", e))?)?;
            if filter.matches(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<BucketKey>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT identity, event_type FROM lockouts
                 WHERE permanent = 0
                   AND (lockout_until IS NULL OR lockout_until < ?1)
                 LIMIT ?2",
            )
            .map_err(|e| map_store_err("prepare list_expired", e))?;
        let rows = stmt
            .query_map(params![now.timestamp(), limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| map_store_err("query list_expired", e))?;

        let mut out = Vec::new();
        for row in rows {
            let (identity, event_type) = row.map_err(|e| map_store_err("row decode", e))?;
            out.push(
                BucketKey::parse(&identity, &event_type)
                    .map_err(|e| map_store_err("corrupt bucket key", e))?,
            );
        }
        Ok(out)
    }

    fn delete_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<u64, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let changed = conn
            .execute(
                "DELETE FROM lockouts WHERE id IN (
                     SELECT id FROM lockouts
                     WHERE permanent = 0
                       AND (lockout_until IS NULL OR lockout_until < ?1)
                     LIMIT ?2
                 )",
                params![now.timestamp(), limit as i64],
            )
            .map_err(|e| map_store_err("delete expired", e))?;
        Ok(changed as u64)
    }
}

type RawLockoutRow = (
    String,
    String,
    i64,
    Option<i64>,
    bool,
    i64,
    i64,
    i64,
    i64,
);

fn decode_lockout(raw: RawLockoutRow) -> Result<LockoutRecord, StoreError> {
    let (
        identity,
        event_type,
        failure_count,
        lockout_until,
        permanent,
        last_duration_secs,
        created_at,
        modified_at,
        version,
    ) = raw;
    Ok(LockoutRecord {
        identity: Identity::parse(&identity).map_err(|e| map_store_err("corrupt identity", e))?,
        event_type: EventType::parse(&event_type)
            .map_err(|e| map_store_err("corrupt event type", e))?,
        failure_count: failure_count as u32,
        lockout_until: lockout_until.map(decode_timestamp).transpose()?,
        permanent,
        last_duration_secs,
        created_at: decode_timestamp(created_at)?,
        modified_at: decode_timestamp(modified_at)?,
        version: version as u64,
    })
}

/// SQLite-backed append-only audit log.
pub struct SqliteAuditLog {
    db_path: PathBuf,
    lock: Mutex<()>,
}

impl SqliteAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn open_connection(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = Path::new(&self.db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| map_store_err("create parent dir", e))?;
        }
        let conn =
            Connection::open(&self.db_path).map_err(|e| map_store_err("open sqlite db", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| map_store_err("set journal_mode", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| map_store_err("set synchronous", e))?;
        self.ensure_schema(&conn)?;
        Ok(conn)
    }

    fn ensure_schema(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_category TEXT NOT NULL,
                event_action TEXT NOT NULL,
                details TEXT NOT NULL,
                identity TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_logs_category ON logs (event_category);
            CREATE INDEX IF NOT EXISTS idx_logs_identity ON logs (identity);
            ",
        )
        .map_err(|e| map_store_err("ensure logs schema", e))?;
        Ok(())
    }
}

impl AuditSink for SqliteAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        conn.execute(
            "INSERT INTO logs (event_category, event_action, details, identity, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.event_category,
                entry.action,
                entry.details,
                entry.identity,
                entry.created_at.timestamp(),
            ],
        )
        .map_err(|e| map_store_err("insert log", e))?;
        Ok(())
    }

    fn scan(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT event_category, event_action, details, identity, created_at
                 FROM logs ORDER BY id ASC",
            )
            .map_err(|e| map_store_err("prepare scan", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|e| map_store_err("query scan", e))?;

        let mut out = Vec::new();
        for row in rows {
            let (event_category, action, details, identity, created_at) =
                row.map_err(|e| map_store_err("row decode", e))?;
            let entry = AuditEntry {
                event_category,
                action,
                details,
                identity,
                created_at: decode_timestamp(created_at)?,
            };
            if filter.matches(&entry) {
                out.push(entry);
                if filter.limit.is_some_and(|limit| out.len() >= limit) {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let changed = conn
            .execute(
                "DELETE FROM logs WHERE created_at < ?1",
                params![cutoff.timestamp()],
            )
            .map_err(|e| map_store_err("purge logs", e))?;
        Ok(changed as u64)
    }
}

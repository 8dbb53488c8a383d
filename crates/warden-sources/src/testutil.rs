//! Shared test fixtures for the source guards.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::TimeZone;
use chrono::Utc;

use warden_core::{
    EngineConfig, LockoutEngine, ManualClock, MemoryAuditLog, MemoryLockoutStore, NoopNotifier,
};

pub(crate) fn addr() -> IpAddr {
    "203.0.113.9".parse().expect("test addr")
}

pub(crate) fn engine_on_memory() -> (Arc<LockoutEngine>, Arc<MemoryAuditLog>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    let audit = Arc::new(MemoryAuditLog::new());
    let engine = LockoutEngine::new(
        Arc::new(MemoryLockoutStore::new()),
        audit.clone(),
        Arc::new(NoopNotifier),
        clock.clone(),
        EngineConfig::default(),
    )
    .expect("valid config");
    (Arc::new(engine), audit, clock)
}

//! The failure-source seam between surfaces and the engine.
//!
//! Each surface translates its native failure signal into an
//! (identity, event type) call on the engine; the registry gives a host one
//! place to wire and look up the sources it enables. The engine stays
//! decoupled from any particular surface.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use warden_core::{AuditEntry, AuditSink, Clock, EngineError, LockoutEngine};

/// A surface that can feed failures into the lockout engine.
pub trait FailureSource: Send + Sync {
    /// Stable surface name used for registry lookup (e.g. `"login"`).
    fn surface(&self) -> &'static str;

    /// The bucket category this source records into.
    fn event_type(&self) -> &'static str;

    /// Records one native failure signal for the client.
    fn record_failure(&self, addr: IpAddr) -> Result<(), EngineError>;

    /// Whether the source should deny this client right now.
    fn is_blocked(&self, addr: IpAddr) -> Result<bool, EngineError>;
}

/// Registry of wired failure sources, keyed by surface name.
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<&'static str, Arc<dyn FailureSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source; the last registration for a surface name wins.
    pub fn register(&mut self, source: Arc<dyn FailureSource>) {
        self.sources.insert(source.surface(), source);
    }

    pub fn get(&self, surface: &str) -> Option<&Arc<dyn FailureSource>> {
        self.sources.get(surface)
    }

    pub fn surfaces(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.sources.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Appends an admission-decision audit entry on behalf of a source.
///
/// The engine's gate is a pure read; logging the denials a surface actually
/// enforces is the surface's job, and this keeps the entry shape uniform.
pub(crate) fn audit_decision(
    engine: &LockoutEngine,
    category: &str,
    action: &str,
    details: &str,
    addr: IpAddr,
) {
    let entry = AuditEntry::new(
        category,
        action,
        details,
        &addr.to_string(),
        engine.clock().now(),
    );
    if let Err(err) = engine.audit().record(entry) {
        tracing::warn!(error = %err, action, "source audit append dropped");
    }
}

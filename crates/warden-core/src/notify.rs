//! Notifier seam for lockout escalation signals.
//!
//! Delivery is fire-and-forget from the engine's point of view: a notifier
//! failure is logged and never propagates into the write path.

use std::sync::Arc;

use thiserror::Error;

use crate::audit::{AuditEntry, AuditSink};
use crate::clock::Clock;

/// Notifier delivery failure. Isolated by the engine, never fatal.
#[derive(Debug, Error)]
#[error("notifier: {0}")]
pub struct NotifyError(pub String);

/// Outbound escalation signals consumed by the host's delivery channel
/// (mail, webhook, chat), external to the engine.
pub trait Notifier: Send + Sync {
    /// Raised from the 3rd counted failure on.
    fn notify_lockout(
        &self,
        identity: &str,
        event_type: &str,
        failure_count: u32,
    ) -> Result<(), NotifyError>;

    /// Raised once, when a bucket escalates to permanent.
    fn notify_permanent_lockout(&self, identity: &str, event_type: &str)
        -> Result<(), NotifyError>;
}

/// Notifier that drops every signal. Useful for hosts without a channel and
/// for tests that only care about engine state.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_lockout(&self, _: &str, _: &str, _: u32) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notify_permanent_lockout(&self, _: &str, _: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Wraps a notifier and records a `notification` audit entry for every
/// delivered signal.
pub struct AuditingNotifier<N> {
    inner: N,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl<N: Notifier> AuditingNotifier<N> {
    pub fn new(inner: N, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            audit,
            clock,
        }
    }

    fn log(&self, action: &str, details: &str, identity: &str) {
        let entry = AuditEntry::new("notification", action, details, identity, self.clock.now());
        if let Err(err) = self.audit.record(entry) {
            tracing::warn!(error = %err, "failed to audit notification");
        }
    }
}

impl<N: Notifier> Notifier for AuditingNotifier<N> {
    fn notify_lockout(
        &self,
        identity: &str,
        event_type: &str,
        failure_count: u32,
    ) -> Result<(), NotifyError> {
        self.inner
            .notify_lockout(identity, event_type, failure_count)?;
        self.log(
            "lockout_triggered",
            &format!("lockout notification for {identity} on {event_type}, failure count {failure_count}"),
            identity,
        );
        Ok(())
    }

    fn notify_permanent_lockout(
        &self,
        identity: &str,
        event_type: &str,
    ) -> Result<(), NotifyError> {
        self.inner.notify_permanent_lockout(identity, event_type)?;
        self.log(
            "permanent_lockout_triggered",
            &format!("permanent lockout notification for {identity} on {event_type}"),
            identity,
        );
        Ok(())
    }
}

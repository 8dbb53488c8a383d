//! Login surface: authentication failures feed the `login_failure` ladder.

use std::net::IpAddr;
use std::sync::Arc;

use warden_core::{EngineError, LockoutEngine};

use crate::source::{audit_decision, FailureSource};

/// Bucket category for failed authentication attempts.
pub const LOGIN_FAILURE: &str = "login_failure";

const CATEGORY: &str = "login_rate_limiting";

/// Why a login attempt was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginDenial {
    /// Terminal block; only an administrator can clear it. Hosts typically
    /// show a distinct message for this case.
    Permanent,
    /// Ladder window still open; retrying later may succeed.
    Temporary,
}

/// Adapter between a host's authentication flow and the engine.
pub struct LoginGuard {
    engine: Arc<LockoutEngine>,
}

impl LoginGuard {
    pub fn new(engine: Arc<LockoutEngine>) -> Self {
        Self { engine }
    }

    /// Consulted before credentials are even checked.
    pub fn check_attempt(&self, addr: IpAddr) -> Result<Option<LoginDenial>, EngineError> {
        let identity = addr.to_string();
        if let Some(record) = self.engine.get_record(&identity, LOGIN_FAILURE)? {
            if record.permanent {
                audit_decision(
                    &self.engine,
                    CATEGORY,
                    "permanent_block_attempt",
                    &format!("login attempt from permanently blocked {identity}"),
                    addr,
                );
                return Ok(Some(LoginDenial::Permanent));
            }
        }
        if self.engine.is_blocked(&identity, LOGIN_FAILURE)? {
            audit_decision(
                &self.engine,
                CATEGORY,
                "blocked",
                &format!("login attempt blocked by lockout for {identity}"),
                addr,
            );
            return Ok(Some(LoginDenial::Temporary));
        }
        Ok(None)
    }

    /// Counts one failed authentication attempt.
    pub fn track_failure(
        &self,
        addr: IpAddr,
        username: &str,
        user_agent: Option<&str>,
    ) -> Result<(), EngineError> {
        audit_decision(
            &self.engine,
            CATEGORY,
            "failed_attempt",
            &format!(
                "failed login for username {username}, user agent {}",
                user_agent.unwrap_or("unknown")
            ),
            addr,
        );
        self.engine.record_failure(&addr.to_string(), LOGIN_FAILURE)
    }

    /// A successful authentication clears the client's ladder immediately.
    pub fn track_success(&self, addr: IpAddr, username: &str) -> Result<(), EngineError> {
        audit_decision(
            &self.engine,
            CATEGORY,
            "successful_login",
            &format!("successful login for username {username}"),
            addr,
        );
        self.engine.record_success(&addr.to_string(), LOGIN_FAILURE)
    }
}

impl FailureSource for LoginGuard {
    fn surface(&self) -> &'static str {
        "login"
    }

    fn event_type(&self) -> &'static str {
        LOGIN_FAILURE
    }

    fn record_failure(&self, addr: IpAddr) -> Result<(), EngineError> {
        self.engine.record_failure(&addr.to_string(), LOGIN_FAILURE)
    }

    fn is_blocked(&self, addr: IpAddr) -> Result<bool, EngineError> {
        self.engine.is_blocked(&addr.to_string(), LOGIN_FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{addr, engine_on_memory};
    use warden_core::{AuditFilter, AuditSink};

    #[test]
    fn fresh_client_is_not_denied() {
        let (engine, _, _) = engine_on_memory();
        let guard = LoginGuard::new(engine);
        assert_eq!(guard.check_attempt(addr()).unwrap(), None);
    }

    #[test]
    fn temporary_denial_while_window_open() {
        let (engine, _, clock) = engine_on_memory();
        let guard = LoginGuard::new(engine);
        guard.track_failure(addr(), "admin", None).unwrap();
        guard.track_failure(addr(), "admin", Some("curl/8")).unwrap();
        assert_eq!(
            guard.check_attempt(addr()).unwrap(),
            Some(LoginDenial::Temporary)
        );
        clock.advance(chrono::Duration::seconds(31));
        assert_eq!(guard.check_attempt(addr()).unwrap(), None);
    }

    #[test]
    fn permanent_denial_is_distinguished() {
        let (engine, audit, _) = engine_on_memory();
        let guard = LoginGuard::new(engine);
        for _ in 0..10 {
            guard.track_failure(addr(), "admin", None).unwrap();
        }
        assert_eq!(
            guard.check_attempt(addr()).unwrap(),
            Some(LoginDenial::Permanent)
        );
        let entries = audit
            .scan(&AuditFilter {
                action: Some("permanent_block_attempt".to_string()),
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn success_clears_the_ladder() {
        let (engine, _, _) = engine_on_memory();
        let guard = LoginGuard::new(engine.clone());
        guard.track_failure(addr(), "admin", None).unwrap();
        guard.track_failure(addr(), "admin", None).unwrap();
        assert!(guard.check_attempt(addr()).unwrap().is_some());

        guard.track_success(addr(), "admin").unwrap();
        assert_eq!(guard.check_attempt(addr()).unwrap(), None);
        assert!(engine
            .get_record(&addr().to_string(), LOGIN_FAILURE)
            .unwrap()
            .is_none());
    }
}

//! Password-reset surface: every reset request counts toward the
//! `password_reset` ladder, and resets are refused while a window is open.

use std::net::IpAddr;
use std::sync::Arc;

use warden_core::{EngineError, LockoutEngine};

use crate::source::{audit_decision, FailureSource};

/// Bucket category for password-reset abuse.
pub const PASSWORD_RESET: &str = "password_reset";

const CATEGORY: &str = "password_reset_rate_limiting";

pub struct PasswordResetGuard {
    engine: Arc<LockoutEngine>,
}

impl PasswordResetGuard {
    pub fn new(engine: Arc<LockoutEngine>) -> Self {
        Self { engine }
    }

    /// Counts one reset request. Requests count whether or not they are
    /// honored, since reset abuse is cheap to attempt.
    pub fn track_request(&self, addr: IpAddr, username: &str) -> Result<(), EngineError> {
        audit_decision(
            &self.engine,
            CATEGORY,
            "request",
            &format!("password reset requested for username {username}"),
            addr,
        );
        self.engine.record_failure(&addr.to_string(), PASSWORD_RESET)
    }

    /// Whether the reset flow may proceed for this client.
    pub fn allow_reset(&self, addr: IpAddr) -> Result<bool, EngineError> {
        let identity = addr.to_string();
        if self.engine.is_blocked(&identity, PASSWORD_RESET)? {
            audit_decision(
                &self.engine,
                CATEGORY,
                "blocked",
                &format!("password reset blocked by lockout for {identity}"),
                addr,
            );
            return Ok(false);
        }
        Ok(true)
    }
}

impl FailureSource for PasswordResetGuard {
    fn surface(&self) -> &'static str {
        "password_reset"
    }

    fn event_type(&self) -> &'static str {
        PASSWORD_RESET
    }

    fn record_failure(&self, addr: IpAddr) -> Result<(), EngineError> {
        self.engine.record_failure(&addr.to_string(), PASSWORD_RESET)
    }

    fn is_blocked(&self, addr: IpAddr) -> Result<bool, EngineError> {
        self.engine.is_blocked(&addr.to_string(), PASSWORD_RESET)
    }
}

//! XML-RPC surface: pingback abuse feeds the `xmlrpc_pingback` ladder and
//! raw call volume is throttled per client.

use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use warden_core::{Clock, EngineError, LockoutEngine};

use crate::source::{audit_decision, FailureSource};
use crate::throttle::FixedWindowThrottle;

/// Bucket category for pingback abuse.
pub const XMLRPC_PINGBACK: &str = "xmlrpc_pingback";

const CATEGORY: &str = "xmlrpc_security";

/// Methods used for pingback amplification.
pub const PINGBACK_METHODS: &[&str] = &["pingback.ping", "pingback.extensions.getPingbacks"];

/// Methods that almost never appear in legitimate traffic.
pub const SUSPICIOUS_METHODS: &[&str] = &[
    "system.multicall",
    "system.listMethods",
    "pingback.ping",
    "pingback.extensions.getPingbacks",
];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingbackGuardConfig {
    /// Raw call budget per client per minute.
    pub max_calls_per_minute: u32,
    /// Calls inside the suspicion window before the client counts as hostile.
    pub suspicion_limit: u32,
    pub suspicion_window_secs: i64,
    /// Deny the methods in [SUSPICIOUS_METHODS] outright.
    pub block_suspicious_methods: bool,
}

impl Default for PingbackGuardConfig {
    fn default() -> Self {
        Self {
            max_calls_per_minute: 10,
            suspicion_limit: 20,
            suspicion_window_secs: 300,
            block_suspicious_methods: true,
        }
    }
}

/// Why an XML-RPC call was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XmlrpcVerdict {
    Allow,
    /// Client is locked out of the pingback bucket.
    LockedOut,
    /// Over the per-minute call budget.
    RateLimited,
    /// Method is on the suspicious list and blocking is enabled.
    SuspiciousMethod,
    /// Pingback attempt: recorded as a failure and always denied.
    PingbackDenied,
}

pub struct PingbackGuard {
    engine: Arc<LockoutEngine>,
    config: PingbackGuardConfig,
    rate: FixedWindowThrottle,
    suspicion: FixedWindowThrottle,
}

impl PingbackGuard {
    pub fn new(engine: Arc<LockoutEngine>, config: PingbackGuardConfig) -> Self {
        let rate = FixedWindowThrottle::new(config.max_calls_per_minute, 60);
        let suspicion =
            FixedWindowThrottle::new(config.suspicion_limit, config.suspicion_window_secs);
        Self {
            engine,
            config,
            rate,
            suspicion,
        }
    }

    /// Classifies one incoming XML-RPC call.
    ///
    /// Pingback attempts are checked before the generic suspicious-method
    /// list so they always reach the ladder.
    pub fn observe_call(&self, addr: IpAddr, method: &str) -> Result<XmlrpcVerdict, EngineError> {
        let now = self.engine.clock().now();
        let identity = addr.to_string();
        audit_decision(
            &self.engine,
            CATEGORY,
            "request",
            &format!("xmlrpc call {method} from {identity}"),
            addr,
        );

        if self.rate.hit(&identity, now) {
            audit_decision(
                &self.engine,
                CATEGORY,
                "rate_limited",
                &format!("xmlrpc call budget exceeded for {identity}"),
                addr,
            );
            return Ok(XmlrpcVerdict::RateLimited);
        }

        if PINGBACK_METHODS.contains(&method) {
            audit_decision(
                &self.engine,
                CATEGORY,
                "pingback_attempt",
                &format!("pingback attempt via {method} from {identity}"),
                addr,
            );
            if self.engine.is_blocked(&identity, XMLRPC_PINGBACK)? {
                audit_decision(
                    &self.engine,
                    CATEGORY,
                    "blocked",
                    &format!("pingback denied by lockout for {identity}"),
                    addr,
                );
                return Ok(XmlrpcVerdict::LockedOut);
            }
            self.engine.record_failure(&identity, XMLRPC_PINGBACK)?;
            return Ok(XmlrpcVerdict::PingbackDenied);
        }

        if self.config.block_suspicious_methods && SUSPICIOUS_METHODS.contains(&method) {
            audit_decision(
                &self.engine,
                CATEGORY,
                "suspicious_method",
                &format!("suspicious xmlrpc method {method} from {identity}"),
                addr,
            );
            return Ok(XmlrpcVerdict::SuspiciousMethod);
        }

        Ok(XmlrpcVerdict::Allow)
    }

    /// Whether the client's call volume inside the suspicion window marks it
    /// hostile (hosts use this to disable the whole endpoint for the client).
    pub fn is_suspect(&self, addr: IpAddr) -> bool {
        let now = self.engine.clock().now();
        self.suspicion.hit(&addr.to_string(), now)
    }
}

impl FailureSource for PingbackGuard {
    fn surface(&self) -> &'static str {
        "xmlrpc"
    }

    fn event_type(&self) -> &'static str {
        XMLRPC_PINGBACK
    }

    fn record_failure(&self, addr: IpAddr) -> Result<(), EngineError> {
        self.engine
            .record_failure(&addr.to_string(), XMLRPC_PINGBACK)
    }

    fn is_blocked(&self, addr: IpAddr) -> Result<bool, EngineError> {
        self.engine.is_blocked(&addr.to_string(), XMLRPC_PINGBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{addr, engine_on_memory};

    #[test]
    fn ordinary_methods_pass() {
        let (engine, _, _) = engine_on_memory();
        let guard = PingbackGuard::new(engine, PingbackGuardConfig::default());
        assert_eq!(
            guard.observe_call(addr(), "wp.getPosts").unwrap(),
            XmlrpcVerdict::Allow
        );
    }

    #[test]
    fn pingback_attempts_are_denied_and_climb_the_ladder() {
        let (engine, _, _) = engine_on_memory();
        let guard = PingbackGuard::new(engine.clone(), PingbackGuardConfig::default());

        assert_eq!(
            guard.observe_call(addr(), "pingback.ping").unwrap(),
            XmlrpcVerdict::PingbackDenied
        );
        assert_eq!(
            guard.observe_call(addr(), "pingback.ping").unwrap(),
            XmlrpcVerdict::PingbackDenied
        );
        let record = engine
            .get_record(&addr().to_string(), XMLRPC_PINGBACK)
            .unwrap()
            .unwrap();
        assert_eq!(record.failure_count, 2);

        // Window now open: further pingbacks are reported as locked out and
        // stop climbing.
        assert_eq!(
            guard.observe_call(addr(), "pingback.ping").unwrap(),
            XmlrpcVerdict::LockedOut
        );
        let record = engine
            .get_record(&addr().to_string(), XMLRPC_PINGBACK)
            .unwrap()
            .unwrap();
        assert_eq!(record.failure_count, 2);
    }

    #[test]
    fn suspicious_methods_are_denied_when_enabled() {
        let (engine, _, _) = engine_on_memory();
        let guard = PingbackGuard::new(engine.clone(), PingbackGuardConfig::default());
        assert_eq!(
            guard.observe_call(addr(), "system.multicall").unwrap(),
            XmlrpcVerdict::SuspiciousMethod
        );

        let lenient = PingbackGuard::new(
            engine,
            PingbackGuardConfig {
                block_suspicious_methods: false,
                ..PingbackGuardConfig::default()
            },
        );
        assert_eq!(
            lenient.observe_call(addr(), "system.multicall").unwrap(),
            XmlrpcVerdict::Allow
        );
    }

    #[test]
    fn call_budget_rate_limits() {
        let (engine, _, _) = engine_on_memory();
        let guard = PingbackGuard::new(
            engine,
            PingbackGuardConfig {
                max_calls_per_minute: 2,
                ..PingbackGuardConfig::default()
            },
        );
        assert_eq!(
            guard.observe_call(addr(), "wp.getPosts").unwrap(),
            XmlrpcVerdict::Allow
        );
        assert_eq!(
            guard.observe_call(addr(), "wp.getPosts").unwrap(),
            XmlrpcVerdict::Allow
        );
        assert_eq!(
            guard.observe_call(addr(), "wp.getPosts").unwrap(),
            XmlrpcVerdict::RateLimited
        );
    }

    #[test]
    fn suspicion_window_flags_noisy_clients() {
        let (engine, _, _) = engine_on_memory();
        let guard = PingbackGuard::new(
            engine,
            PingbackGuardConfig {
                suspicion_limit: 3,
                ..PingbackGuardConfig::default()
            },
        );
        for _ in 0..3 {
            assert!(!guard.is_suspect(addr()));
        }
        assert!(guard.is_suspect(addr()));
    }
}

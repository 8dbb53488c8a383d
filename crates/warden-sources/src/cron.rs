//! Scheduled-task endpoint protection.
//!
//! The endpoint is only for the host itself, a small allowlist, or callers
//! holding the shared secret. Unauthorized hits feed the `cron_request`
//! ladder, and raw volume is throttled per client.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use warden_core::{Clock, EngineError, LockoutEngine};

use crate::source::{audit_decision, FailureSource};
use crate::throttle::FixedWindowThrottle;

/// Bucket category for scheduled-task endpoint abuse.
pub const CRON_REQUEST: &str = "cron_request";

const CATEGORY: &str = "cron_security";

/// IPv4 CIDR range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    pub fn parse(raw: &str) -> Option<Self> {
        let (network, prefix) = raw.split_once('/')?;
        let network: Ipv4Addr = network.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        (prefix <= 32).then_some(Self { network, prefix })
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        if self.prefix == 0 {
            return true;
        }
        let mask = u32::MAX << (32 - self.prefix);
        (u32::from(addr) & mask) == (u32::from(self.network) & mask)
    }
}

/// One allowlist entry: a literal address or an IPv4 range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CronAuthEntry {
    Addr(IpAddr),
    Range(Cidr),
}

impl CronAuthEntry {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(addr) = raw.parse::<IpAddr>() {
            return Some(CronAuthEntry::Addr(addr));
        }
        Cidr::parse(raw).map(CronAuthEntry::Range)
    }

    fn matches(&self, addr: IpAddr) -> bool {
        match (self, addr) {
            (CronAuthEntry::Addr(entry), addr) => *entry == addr,
            (CronAuthEntry::Range(range), IpAddr::V4(v4)) => range.contains(v4),
            (CronAuthEntry::Range(_), IpAddr::V6(_)) => false,
        }
    }
}

/// Parses a newline-separated allowlist, skipping blank and malformed lines.
pub fn parse_authorized_list(raw: &str) -> Vec<CronAuthEntry> {
    raw.lines().filter_map(CronAuthEntry::parse).collect()
}

#[derive(Clone, Debug, Default)]
pub struct CronGuardConfig {
    pub authorized: Vec<CronAuthEntry>,
    /// Shared secret callers may present; compared in constant time.
    pub secret_key: Option<String>,
    /// Raw hit budget per client per minute; 0 disables the throttle.
    pub max_requests_per_minute: u32,
}

impl CronGuardConfig {
    pub fn with_defaults(authorized: Vec<CronAuthEntry>, secret_key: Option<String>) -> Self {
        Self {
            authorized,
            secret_key,
            max_requests_per_minute: 10,
        }
    }
}

/// One incoming hit on the scheduled-task endpoint.
#[derive(Clone, Copy, Debug)]
pub struct CronRequest<'a> {
    pub remote_addr: IpAddr,
    /// The host's own address, when known; a loopback hit always passes.
    pub server_addr: Option<IpAddr>,
    pub provided_secret: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CronVerdict {
    Allow,
    RateLimited,
    Unauthorized,
}

pub struct CronGuard {
    engine: Arc<LockoutEngine>,
    config: CronGuardConfig,
    rate: Option<FixedWindowThrottle>,
}

impl CronGuard {
    pub fn new(engine: Arc<LockoutEngine>, config: CronGuardConfig) -> Self {
        let rate = (config.max_requests_per_minute > 0)
            .then(|| FixedWindowThrottle::new(config.max_requests_per_minute, 60));
        Self {
            engine,
            config,
            rate,
        }
    }

    /// Classifies one endpoint hit. Denied hits count toward the ladder.
    pub fn observe_request(&self, request: CronRequest<'_>) -> Result<CronVerdict, EngineError> {
        let addr = request.remote_addr;
        let identity = addr.to_string();
        audit_decision(
            &self.engine,
            CATEGORY,
            "access",
            &format!("cron endpoint hit from {identity}"),
            addr,
        );

        if let Some(rate) = &self.rate {
            if rate.hit(&identity, self.engine.clock().now()) {
                audit_decision(
                    &self.engine,
                    CATEGORY,
                    "rate_limited",
                    &format!("cron hit budget exceeded for {identity}"),
                    addr,
                );
                self.engine.record_failure(&identity, CRON_REQUEST)?;
                return Ok(CronVerdict::RateLimited);
            }
        }

        if !self.is_authorized(&request) {
            audit_decision(
                &self.engine,
                CATEGORY,
                "blocked",
                &format!("unauthorized cron hit from {identity}"),
                addr,
            );
            self.engine.record_failure(&identity, CRON_REQUEST)?;
            return Ok(CronVerdict::Unauthorized);
        }

        Ok(CronVerdict::Allow)
    }

    fn is_authorized(&self, request: &CronRequest<'_>) -> bool {
        let addr = request.remote_addr;
        if addr.is_loopback() || request.server_addr == Some(addr) {
            return true;
        }
        if self.config.authorized.iter().any(|e| e.matches(addr)) {
            return true;
        }
        match (&self.config.secret_key, request.provided_secret) {
            (Some(expected), Some(provided)) => constant_time_eq(expected, provided),
            _ => false,
        }
    }
}

impl FailureSource for CronGuard {
    fn surface(&self) -> &'static str {
        "cron"
    }

    fn event_type(&self) -> &'static str {
        CRON_REQUEST
    }

    fn record_failure(&self, addr: IpAddr) -> Result<(), EngineError> {
        self.engine.record_failure(&addr.to_string(), CRON_REQUEST)
    }

    fn is_blocked(&self, addr: IpAddr) -> Result<bool, EngineError> {
        self.engine.is_blocked(&addr.to_string(), CRON_REQUEST)
    }
}

/// Length-leaking only: comparison time does not depend on content.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{addr, engine_on_memory};

    fn request(remote: &str, secret: Option<&'static str>) -> CronRequest<'static> {
        CronRequest {
            remote_addr: remote.parse().expect("test addr"),
            server_addr: Some("198.51.100.2".parse().expect("server addr")),
            provided_secret: secret,
        }
    }

    fn guard(config: CronGuardConfig) -> (CronGuard, Arc<warden_core::LockoutEngine>) {
        let (engine, _, _) = engine_on_memory();
        (CronGuard::new(engine.clone(), config), engine)
    }

    #[test]
    fn cidr_matching() {
        let range = Cidr::parse("203.0.113.0/24").unwrap();
        assert!(range.contains("203.0.113.42".parse().unwrap()));
        assert!(!range.contains("203.0.114.1".parse().unwrap()));
        assert!(Cidr::parse("203.0.113.0/33").is_none());
        assert!(Cidr::parse("garbage/24").is_none());
    }

    #[test]
    fn allowlist_parsing_skips_malformed_lines() {
        let entries = parse_authorized_list("203.0.113.7\n\nnot-an-ip\n10.0.0.0/8\n");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].matches("203.0.113.7".parse().unwrap()));
        assert!(entries[1].matches("10.1.2.3".parse().unwrap()));
    }

    #[test]
    fn server_local_and_loopback_hits_pass() {
        let (guard, _) = guard(CronGuardConfig::with_defaults(Vec::new(), None));
        assert_eq!(
            guard
                .observe_request(request("198.51.100.2", None))
                .unwrap(),
            CronVerdict::Allow
        );
        assert_eq!(
            guard.observe_request(request("127.0.0.1", None)).unwrap(),
            CronVerdict::Allow
        );
    }

    #[test]
    fn allowlisted_range_passes() {
        let (guard, _) = guard(CronGuardConfig::with_defaults(
            parse_authorized_list("203.0.113.0/24"),
            None,
        ));
        assert_eq!(
            guard.observe_request(request("203.0.113.9", None)).unwrap(),
            CronVerdict::Allow
        );
    }

    #[test]
    fn secret_key_grants_access_and_wrong_secret_counts_a_failure() {
        let (guard, engine) = guard(CronGuardConfig::with_defaults(
            Vec::new(),
            Some("cron-secret".to_string()),
        ));
        assert_eq!(
            guard
                .observe_request(request("203.0.113.9", Some("cron-secret")))
                .unwrap(),
            CronVerdict::Allow
        );
        assert_eq!(
            guard
                .observe_request(request("203.0.113.9", Some("wrong")))
                .unwrap(),
            CronVerdict::Unauthorized
        );
        assert_eq!(
            engine
                .get_record(&addr().to_string(), CRON_REQUEST)
                .unwrap()
                .unwrap()
                .failure_count,
            1
        );
    }

    #[test]
    fn hit_budget_rate_limits() {
        let (guard, _) = guard(CronGuardConfig {
            authorized: Vec::new(),
            secret_key: Some("cron-secret".to_string()),
            max_requests_per_minute: 2,
        });
        for _ in 0..2 {
            assert_eq!(
                guard
                    .observe_request(request("203.0.113.9", Some("cron-secret")))
                    .unwrap(),
                CronVerdict::Allow
            );
        }
        assert_eq!(
            guard
                .observe_request(request("203.0.113.9", Some("cron-secret")))
                .unwrap(),
            CronVerdict::RateLimited
        );
    }

    #[test]
    fn constant_time_eq_behaves() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}

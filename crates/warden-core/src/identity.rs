//! Bucket identity types: client identity, event type, and the bucket key.
//!
//! Every lockout bucket is keyed by (identity, event type). Both components are
//! validated at construction; a value that fails validation never reaches the
//! store, and there is no wildcard fallback identity.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Maximum stored identity length (fits a textual IPv6 address).
pub const MAX_IDENTITY_LEN: usize = 45;

/// Maximum stored event type length.
pub const MAX_EVENT_TYPE_LEN: usize = 50;

/// Canonicalized client address a bucket is keyed on.
///
/// Parsing goes through [std::net::IpAddr], so the stored form is the
/// canonical textual rendering (lowercase, compressed IPv6).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Parses and canonicalizes a client address.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidIdentity("empty identity".to_string()));
        }
        let addr: IpAddr = trimmed
            .parse()
            .map_err(|_| EngineError::InvalidIdentity(format!("not an IP address: {trimmed}")))?;
        let canonical = addr.to_string();
        if canonical.len() > MAX_IDENTITY_LEN {
            return Err(EngineError::InvalidIdentity(format!(
                "identity longer than {MAX_IDENTITY_LEN} bytes"
            )));
        }
        Ok(Self(canonical))
    }

    pub fn from_addr(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Namespaced failure category (e.g. `login_failure`, `xmlrpc_pingback`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Validates an event type: non-empty, bounded, `[A-Za-z0-9_.-]` only.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidEventType("empty event type".to_string()));
        }
        if trimmed.len() > MAX_EVENT_TYPE_LEN {
            return Err(EngineError::InvalidEventType(format!(
                "event type longer than {MAX_EVENT_TYPE_LEN} bytes"
            )));
        }
        if !trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-')
        {
            return Err(EngineError::InvalidEventType(format!(
                "event type contains disallowed characters: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (identity, event type) pair a lockout record is keyed on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub identity: Identity,
    pub event_type: EventType,
}

impl BucketKey {
    pub fn new(identity: Identity, event_type: EventType) -> Self {
        Self {
            identity,
            event_type,
        }
    }

    /// Parses both components from raw caller input.
    pub fn parse(identity: &str, event_type: &str) -> Result<Self, EngineError> {
        Ok(Self {
            identity: Identity::parse(identity)?,
            event_type: EventType::parse(event_type)?,
        })
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.identity, self.event_type)
    }
}

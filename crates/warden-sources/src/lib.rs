//! Per-surface failure sources feeding the warden lockout engine.
//!
//! Each guard translates one surface's native signals (failed logins,
//! pingback calls, reset requests, form submissions, scheduled-task hits)
//! into normalized (identity, event type) calls on the engine, and logs the
//! admission decisions it enforces. The engine never depends on this crate.

pub mod client_addr;
pub mod cron;
pub mod forms;
pub mod login;
pub mod password_reset;
pub mod pingback;
pub mod source;
#[cfg(test)]
mod testutil;
pub mod throttle;

pub use client_addr::{is_public, normalize_client_addr, FORWARDED_HEADERS};
pub use cron::{
    parse_authorized_list, Cidr, CronAuthEntry, CronGuard, CronGuardConfig, CronRequest,
    CronVerdict, CRON_REQUEST,
};
pub use forms::{
    FormGuard, FormGuardConfig, FormKind, FormSource, FormVerdict, HONEYPOT_FIELDS,
};
pub use login::{LoginDenial, LoginGuard, LOGIN_FAILURE};
pub use password_reset::{PasswordResetGuard, PASSWORD_RESET};
pub use pingback::{
    PingbackGuard, PingbackGuardConfig, XmlrpcVerdict, PINGBACK_METHODS, SUSPICIOUS_METHODS,
    XMLRPC_PINGBACK,
};
pub use source::{FailureSource, SourceRegistry};
pub use throttle::FixedWindowThrottle;

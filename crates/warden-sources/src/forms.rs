//! Form surfaces: submission spam feeds one ladder per form integration,
//! with honeypot-field detection as a cheap first line against bots.

use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_core::{EngineError, LockoutEngine};

use crate::source::{audit_decision, FailureSource};

const CATEGORY: &str = "general_rate_limiting";

/// Field names bots habitually fill and humans never see.
pub const HONEYPOT_FIELDS: &[&str] = &[
    "comments",
    "phone_number",
    "address",
    "email_confirm",
    "human_check",
];

/// Form integrations with their own independent buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    ContactForm7,
    FluentForms,
    ElementorPro,
    Registration,
}

impl FormKind {
    pub fn event_type(self) -> &'static str {
        match self {
            FormKind::ContactForm7 => "contact_form_cf7",
            FormKind::FluentForms => "contact_form_fluentforms",
            FormKind::ElementorPro => "contact_form_elementor",
            FormKind::Registration => "registration",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormGuardConfig {
    /// Master toggle for the whole surface.
    pub enabled: bool,
    pub contact_form7: bool,
    pub fluent_forms: bool,
    pub elementor_pro: bool,
    pub registration: bool,
    /// Honeypot-field detection on submissions that carry a payload.
    pub honeypot: bool,
}

impl Default for FormGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            contact_form7: true,
            fluent_forms: true,
            elementor_pro: true,
            registration: true,
            honeypot: true,
        }
    }
}

/// Outcome of a submission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormVerdict {
    Allow,
    /// Client is inside a lockout window for this form's bucket.
    RateLimited,
    /// A honeypot field was filled. Hosts should fail with a generic
    /// message so the bot learns nothing.
    Honeypot,
}

pub struct FormGuard {
    engine: Arc<LockoutEngine>,
    config: FormGuardConfig,
}

impl FormGuard {
    pub fn new(engine: Arc<LockoutEngine>, config: FormGuardConfig) -> Self {
        Self { engine, config }
    }

    fn kind_enabled(&self, kind: FormKind) -> bool {
        self.config.enabled
            && match kind {
                FormKind::ContactForm7 => self.config.contact_form7,
                FormKind::FluentForms => self.config.fluent_forms,
                FormKind::ElementorPro => self.config.elementor_pro,
                FormKind::Registration => self.config.registration,
            }
    }

    /// Checks one submission; allowed submissions count toward the bucket.
    ///
    /// `fields` is the submitted payload as a JSON object when the
    /// integration exposes one (used for honeypot detection only).
    pub fn check_submission(
        &self,
        kind: FormKind,
        addr: IpAddr,
        fields: Option<&Value>,
    ) -> Result<FormVerdict, EngineError> {
        if !self.kind_enabled(kind) {
            return Ok(FormVerdict::Allow);
        }
        let identity = addr.to_string();
        let event_type = kind.event_type();

        if self.config.honeypot {
            if let Some(fields) = fields {
                if let Some(field) = filled_honeypot_field(fields) {
                    audit_decision(
                        &self.engine,
                        CATEGORY,
                        "blocked",
                        &format!("{event_type} submission blocked, honeypot field {field} filled"),
                        addr,
                    );
                    return Ok(FormVerdict::Honeypot);
                }
            }
        }

        if self.engine.is_blocked(&identity, event_type)? {
            audit_decision(
                &self.engine,
                CATEGORY,
                "blocked",
                &format!("{event_type} submission blocked by lockout for {identity}"),
                addr,
            );
            return Ok(FormVerdict::RateLimited);
        }

        self.engine.record_failure(&identity, event_type)?;
        Ok(FormVerdict::Allow)
    }

    /// A [FailureSource] view over one form kind.
    pub fn source(self: &Arc<Self>, kind: FormKind) -> FormSource {
        FormSource {
            guard: Arc::clone(self),
            kind,
        }
    }
}

fn filled_honeypot_field(fields: &Value) -> Option<&'static str> {
    let object = fields.as_object()?;
    HONEYPOT_FIELDS.iter().copied().find(|name| {
        object
            .get(*name)
            .is_some_and(|value| matches!(value, Value::String(s) if !s.is_empty()))
    })
}

/// One form kind exposed through the registry seam.
pub struct FormSource {
    guard: Arc<FormGuard>,
    kind: FormKind,
}

impl FailureSource for FormSource {
    fn surface(&self) -> &'static str {
        match self.kind {
            FormKind::ContactForm7 => "form_cf7",
            FormKind::FluentForms => "form_fluentforms",
            FormKind::ElementorPro => "form_elementor",
            FormKind::Registration => "registration",
        }
    }

    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn record_failure(&self, addr: IpAddr) -> Result<(), EngineError> {
        self.guard
            .engine
            .record_failure(&addr.to_string(), self.kind.event_type())
    }

    fn is_blocked(&self, addr: IpAddr) -> Result<bool, EngineError> {
        self.guard
            .engine
            .is_blocked(&addr.to_string(), self.kind.event_type())
    }
}

pub mod collaborators;
pub mod credit_card;
pub mod domain;
pub mod email;
pub mod ip;
pub mod phone;
pub mod user_agent;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CheckToggles;
use crate::hashing::Hasher;
use crate::refdata::ReferenceDataLayer;
use crate::velocity::VelocityCounters;
use collaborators::{AsnLookup, DomainAgeLookup, GeoLookup, MxLookup};

/// The caller-supplied identity bundle. At least one of {email, ip,
/// credit_card, phone} must be present -- enforced by the evaluator before
/// any Check runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluateInput {
    pub email: Option<String>,
    pub ip: Option<String>,
    pub credit_card: Option<String>,
    pub phone: Option<String>,
    pub user_agent: Option<String>,
    pub domain: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    pub device_type: Option<String>,
    pub metadata: Option<Value>,
}

impl EvaluateInput {
    pub fn has_identity_field(&self) -> bool {
        self.email.is_some() || self.ip.is_some() || self.credit_card.is_some() || self.phone.is_some()
    }

    /// The domain a DomainCheck should apply to: the explicit `domain` field, or
    /// the part of `email` after `@` when no explicit domain was given.
    pub fn effective_domain(&self) -> Option<String> {
        if let Some(d) = &self.domain {
            return Some(d.to_lowercase());
        }
        self.email
            .as_ref()
            .and_then(|e| e.split('@').nth(1))
            .map(|d| d.to_lowercase())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Result of a single Check. `score` is pre-capped/clamped to `[0, 100]`
/// by the Check itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    pub score: u32,
    pub details: Value,
}

impl CheckResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 50,
            details: serde_json::json!({ "error": message.into() }),
        }
    }

    pub fn timeout() -> Self {
        Self::error("timeout")
    }

    pub fn blacklisted(&self) -> bool {
        self.details
            .get("blacklisted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Shared, swappable collaborators a Check may consult (DNS, domain age,
/// geolocation, ASN classification). Kept as trait objects so unit tests can
/// substitute fakes without any network I/O, and so collaborator failures
/// degrade silently rather than failing the Check.
#[derive(Clone)]
pub struct Collaborators {
    pub mx: Arc<dyn MxLookup>,
    pub domain_age: Arc<dyn DomainAgeLookup>,
    pub geo: Arc<dyn GeoLookup>,
    pub asn: Arc<dyn AsnLookup>,
}

/// Everything a Check needs beyond the input itself.
#[derive(Clone)]
pub struct CheckContext {
    pub hasher: Arc<Hasher>,
    pub refdata: Arc<ReferenceDataLayer>,
    pub velocity: Arc<VelocityCounters>,
    pub collaborators: Collaborators,
}

/// Shared contract every Check implements: `applicable` gates whether the
/// Check runs at all; `perform` executes it.
#[async_trait::async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &'static str;
    fn applicable(&self, input: &EvaluateInput, toggles: &CheckToggles) -> bool;
    async fn perform(&self, input: &EvaluateInput, ctx: &CheckContext) -> CheckResult;
}

/// Registry of the six Checks, indexed by name.
pub fn registry() -> Vec<Arc<dyn Check>> {
    vec![
        Arc::new(email::EmailCheck),
        Arc::new(domain::DomainCheck),
        Arc::new(ip::IpCheck),
        Arc::new(credit_card::CreditCardCheck),
        Arc::new(phone::PhoneCheck),
        Arc::new(user_agent::UserAgentCheck),
    ]
}

/// Cap additive sub-rule contributions at 100.
pub fn cap_score(score: u32) -> u32 {
    score.min(100)
}

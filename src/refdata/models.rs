//! Reference table row types. Mutated only by the Refresh Pipeline or
//! explicit admin action; Checks treat them as read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpVersion {
    V4,
    V6,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TorExitNode {
    pub ip: String,
    pub ip_version: i32,
    pub node_id: Option<String>,
    pub nickname: Option<String>,
    pub is_active: bool,
    pub last_seen_at: DateTime<Utc>,
    pub risk_weight: i32,
}

impl TorExitNode {
    pub const DEFAULT_RISK_WEIGHT: i32 = 90;
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DisposableEmailDomain {
    pub domain: String,
    pub source: String,
    pub is_active: bool,
    pub risk_weight: i32,
}

impl DisposableEmailDomain {
    pub const DEFAULT_RISK_WEIGHT: i32 = 80;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum AsnType {
    Datacenter,
    Residential,
    Mobile,
    Education,
    Government,
    Unknown,
}

impl AsnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsnType::Datacenter => "datacenter",
            AsnType::Residential => "residential",
            AsnType::Mobile => "mobile",
            AsnType::Education => "education",
            AsnType::Government => "government",
            AsnType::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "datacenter" => AsnType::Datacenter,
            "residential" => AsnType::Residential,
            "mobile" => AsnType::Mobile,
            "education" => AsnType::Education,
            "government" => AsnType::Government,
            _ => AsnType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asn {
    pub asn: i64,
    pub organization: String,
    pub country_code: String,
    pub asn_type: AsnType,
    pub is_hosting: bool,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub ip_ranges: Vec<String>,
    pub risk_weight: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserAgentType {
    Bot,
    Scraper,
    Browser,
    Malicious,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownUserAgent {
    pub ua_hash: String,
    pub ua_type: UserAgentType,
    pub name: Option<String>,
    pub version: Option<String>,
    pub risk_weight: i32,
    pub is_outdated: bool,
    pub eol_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlacklistEntry {
    pub keyed_hash: String,
    pub reason: String,
    pub risk_weight: i32,
    pub last_seen_at: DateTime<Utc>,
    pub report_count: i32,
}

impl BlacklistEntry {
    /// Effective weight bumped by report/chargeback volume, capped at 100.
    pub fn effective_weight(&self) -> i32 {
        (self.risk_weight + self.report_count.min(20)).min(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistKind {
    Email,
    Ip,
    CreditCard,
    Phone,
}

impl BlacklistKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            BlacklistKind::Email => "blacklisted_emails",
            BlacklistKind::Ip => "blacklisted_ips",
            BlacklistKind::CreditCard => "blacklisted_credit_cards",
            BlacklistKind::Phone => "blacklisted_phones",
        }
    }
}

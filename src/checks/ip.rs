//! IP risk check: reserved ranges, blacklist, ASN/proxy-VPN classification,
//! and geo/timezone consistency with the rest of the request.

use async_trait::async_trait;
use serde_json::json;
use std::net::IpAddr;

use crate::config::CheckToggles;
use crate::netutil;
use crate::refdata::models::{BlacklistKind, IpVersion};
use crate::velocity::Window;

use super::{cap_score, Check, CheckContext, CheckResult, EvaluateInput};

const PROXY_HEADERS: &[&str] = &[
    "X-Forwarded-For",
    "X-Real-IP",
    "X-Originating-IP",
    "X-Forwarded",
    "X-Cluster-Client-IP",
    "Forwarded-For",
    "Forwarded",
    "Via",
    "True-Client-IP",
    "CF-Connecting-IP",
];

pub struct IpCheck;

#[async_trait]
impl Check for IpCheck {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn applicable(&self, input: &EvaluateInput, toggles: &CheckToggles) -> bool {
        toggles.ip && input.ip.is_some()
    }

    async fn perform(&self, input: &EvaluateInput, ctx: &CheckContext) -> CheckResult {
        let raw_ip = input.ip.as_deref().unwrap_or_default();

        // 1. Parse; invalid -> hard fail.
        let ip: IpAddr = match netutil::parse(raw_ip) {
            Ok(ip) => ip,
            Err(_) => {
                return CheckResult {
                    passed: false,
                    score: 100,
                    details: json!({ "valid": false, "hard_fail": "malformed_ip" }),
                }
            }
        };

        let mut score: u32 = 0;
        let mut details = serde_json::Map::new();
        details.insert("valid".into(), json!(true));

        // 3. Reserved range: hard fail, early return (checked ahead of the
        //    blacklist lookup below, but scored identically either way since
        //    both short-circuit at >=80).
        if netutil::is_reserved(&ip) {
            return CheckResult {
                passed: false,
                score: 100,
                details: json!({ "valid": true, "reserved": true, "hard_fail": "reserved_range" }),
            };
        }

        // 2. Blacklisted IP by keyed-hash or raw value.
        let keyed_hash = ctx.hasher.hash(raw_ip);
        match ctx.refdata.lookup_blacklist(BlacklistKind::Ip, &keyed_hash).await {
            Ok(Some(entry)) => {
                score += entry.effective_weight() as u32;
                details.insert("blacklisted".into(), json!(true));
                details.insert("blacklist_reason".into(), json!(entry.reason));
            }
            Ok(None) => {
                details.insert("blacklisted".into(), json!(false));
            }
            Err(e) => return CheckResult::error(format!("reference store failure: {e}")),
        }

        // 4. Active Tor exit node.
        match ctx.refdata.lookup_tor_node(&ip).await {
            Ok(Some(_)) => {
                score += 90;
                details.insert("tor_exit_node".into(), json!(true));
            }
            Ok(None) => {
                details.insert("tor_exit_node".into(), json!(false));
            }
            Err(e) => return CheckResult::error(format!("reference store failure: {e}")),
        }

        // 5. ASN classification.
        let mut asn_score_detail = 0i64;
        match ctx.refdata.lookup_asn_by_ip(&ip).await {
            Ok(Some(asn)) => {
                score += asn.risk_weight.max(0) as u32;
                asn_score_detail = asn.risk_weight as i64;
                if matches!(asn.asn_type, crate::refdata::models::AsnType::Datacenter) {
                    score += 30;
                }
                if asn.is_vpn || asn.is_proxy {
                    score += 40;
                }
                details.insert("asn".into(), json!(asn.asn));
                details.insert("asn_type".into(), json!(asn.asn_type.as_str()));
                details.insert("is_hosting".into(), json!(asn.is_hosting));
                details.insert("is_vpn_or_proxy".into(), json!(asn.is_vpn || asn.is_proxy));
            }
            Ok(None) => {
                if let Some(info) = ctx.collaborators.asn.classify(&ip).await {
                    score += info.risk_weight.max(0) as u32;
                    asn_score_detail = info.risk_weight as i64;
                    if info.is_vpn || info.is_proxy {
                        score += 40;
                    }
                    details.insert("asn".into(), json!(info.asn));
                    details.insert("is_hosting".into(), json!(info.is_hosting));
                    details.insert("is_vpn_or_proxy".into(), json!(info.is_vpn || info.is_proxy));
                }
            }
            Err(e) => return CheckResult::error(format!("reference store failure: {e}")),
        }
        details.insert("asn_risk_weight".into(), json!(asn_score_detail));

        // 6. Geolocation consistency.
        let mut location_mismatches = 0u32;
        if let Some(geo) = ctx.collaborators.geo.lookup(&ip).await {
            if let (Some(declared), Some(observed)) = (&input.country, &geo.country) {
                if !declared.eq_ignore_ascii_case(observed) {
                    score += 30;
                    location_mismatches += 1;
                    details.insert("country_mismatch".into(), json!(true));
                }
            }
            if let Some(offset) = geo.timezone_offset_hours {
                if let Some(declared_tz) = &input.timezone {
                    if let Some(declared_offset) = timezone_offset_hours(declared_tz) {
                        if (declared_offset - offset).abs() > 3.0 {
                            score += 20;
                            location_mismatches += 1;
                            details.insert("timezone_mismatch".into(), json!(true));
                        }
                    }
                }
            }
        }
        details.insert("location_mismatches".into(), json!(location_mismatches));

        // 7. Velocity.
        let count = ctx.velocity.bump("ip", &keyed_hash, Window::Hour);
        let mut velocity_risk_score = 0u32;
        if count > 100 {
            velocity_risk_score = 30;
        } else if count > 50 {
            velocity_risk_score = 20;
        } else if count > 10 {
            velocity_risk_score = 10;
        }
        score += velocity_risk_score;
        details.insert(
            "velocity".into(),
            json!({ "hour_count": count, "risk_score": velocity_risk_score }),
        );

        // 8. Proxy headers.
        let mut has_proxy_header = false;
        let mut header_ip_mismatch = false;
        for header_name in PROXY_HEADERS {
            let values = input.header_values(header_name);
            if values.is_empty() {
                continue;
            }
            has_proxy_header = true;
            for value in values {
                if let Some(extracted) = extract_ip(value) {
                    if extracted != ip {
                        header_ip_mismatch = true;
                    }
                }
            }
        }
        if has_proxy_header {
            score += 10;
            details.insert("proxy_headers_present".into(), json!(true));
        }
        if header_ip_mismatch {
            score += 20;
            details.insert("proxy_header_ip_mismatch".into(), json!(true));
        }

        let score = cap_score(score);
        let passed = score < 80;
        details.insert("ip_version".into(), json!(match netutil::version(&ip) {
            4 => IpVersion::V4,
            _ => IpVersion::V6,
        }));
        CheckResult { passed, score, details: details.into() }
    }
}

fn extract_ip(header_value: &str) -> Option<IpAddr> {
    // `X-Forwarded-For` style values are comma-separated; take the first token
    // and strip a trailing port if present.
    let first = header_value.split(',').next()?.trim();
    let candidate = first.trim_start_matches("for=").trim_matches('"');
    if let Ok(ip) = netutil::parse(candidate) {
        return Some(ip);
    }
    // `[::1]:443` bracket+port notation: strip the brackets before trying a
    // plain IPv6 parse, and only fall back to a bare rsplit on ':' for IPv4,
    // where a single colon can only be the port separator.
    if let Some(inner) = candidate.strip_prefix('[') {
        if let Some((host, _port)) = inner.rsplit_once(']') {
            if let Ok(ip) = netutil::parse(host) {
                return Some(ip);
            }
        }
    }
    candidate.rsplit_once(':').and_then(|(host, _)| netutil::parse(host).ok())
}

/// Best-effort IANA timezone -> UTC offset in hours, covering common zones
/// well enough for the consistency check; unrecognized zones contribute 0
/// rather than failing the check.
fn timezone_offset_hours(tz: &str) -> Option<f64> {
    let offset = match tz {
        "UTC" | "Etc/UTC" => 0.0,
        "America/New_York" | "US/Eastern" => -5.0,
        "America/Chicago" | "US/Central" => -6.0,
        "America/Denver" | "US/Mountain" => -7.0,
        "America/Los_Angeles" | "US/Pacific" => -8.0,
        "Europe/London" => 0.0,
        "Europe/Paris" | "Europe/Berlin" => 1.0,
        "Europe/Moscow" => 3.0,
        "Asia/Kolkata" => 5.5,
        "Asia/Shanghai" | "Asia/Singapore" => 8.0,
        "Asia/Tokyo" => 9.0,
        "Australia/Sydney" => 10.0,
        _ => return None,
    };
    Some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_ip_from_simple_header() {
        assert_eq!(extract_ip("8.8.8.8"), Some("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn extract_ip_from_xff_list() {
        assert_eq!(extract_ip("1.2.3.4, 5.6.7.8"), Some("1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn extract_ip_with_bracketed_ipv6_and_port() {
        assert_eq!(extract_ip("[2001:db8::1]:443"), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn extract_ip_with_port() {
        assert_eq!(extract_ip("1.2.3.4:8080"), Some("1.2.3.4".parse().unwrap()));
    }
}

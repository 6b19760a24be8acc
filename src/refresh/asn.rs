//! ASN feed parsing. One record per line:
//! `<asn> <ISO-3166 country> <comma-separated CIDR list> <organization...>`.
//! `is_hosting`/`is_vpn`/`is_proxy` and `asn_type` are inferred from
//! organization-name keywords since the feed doesn't carry them directly.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::refdata::models::{Asn, AsnType};

static LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+([A-Za-z]{2})\s+([0-9./,:a-fA-F]+)\s+(.+)$").unwrap());

const HOSTING_KEYWORDS: &[&str] = &["hosting", "datacenter", "data center", "cloud", "server", "colo"];
const VPN_KEYWORDS: &[&str] = &["vpn", "proxy", "anonymiz"];

pub fn parse(body: &str) -> Vec<Asn> {
    body.lines().filter_map(parse_line).collect()
}

/// Parses one feed line, or `None` for a blank/comment/malformed line. Used
/// both by [`parse`] (whole-body parsing) and the refresh pipeline's
/// streaming line reader, so both paths reject the same lines the same way.
pub(crate) fn parse_line(line: &str) -> Option<Asn> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let caps = LINE_RE.captures(line)?;
    let asn: i64 = caps[1].parse().ok()?;
    let country_code = caps[2].to_uppercase();
    let ip_ranges: Vec<String> = caps[3].split(',').map(|s| s.trim().to_string()).collect();
    let organization = caps[4].trim().to_string();
    let lower_org = organization.to_lowercase();

    let is_hosting = HOSTING_KEYWORDS.iter().any(|k| lower_org.contains(k));
    let is_vpn = VPN_KEYWORDS.iter().any(|k| lower_org.contains(k));
    let asn_type = if is_hosting {
        AsnType::Datacenter
    } else if lower_org.contains("university") || lower_org.contains("college") {
        AsnType::Education
    } else if lower_org.contains("government") || lower_org.contains("gov.") {
        AsnType::Government
    } else if lower_org.contains("mobile") || lower_org.contains("wireless") || lower_org.contains("cellular") {
        AsnType::Mobile
    } else {
        AsnType::Residential
    };

    let risk_weight = if is_hosting { 40 } else if is_vpn { 60 } else { 10 };

    Some(Asn {
        asn,
        organization,
        country_code,
        asn_type,
        is_hosting,
        is_vpn,
        is_proxy: is_vpn,
        ip_ranges,
        risk_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_datacenter_line() {
        let line = "16509 US 52.0.0.0/8,35.0.0.0/8 Amazon Web Services Hosting";
        let asn = parse_line(line).unwrap();
        assert_eq!(asn.asn, 16509);
        assert_eq!(asn.country_code, "US");
        assert_eq!(asn.ip_ranges.len(), 2);
        assert_eq!(asn.asn_type, AsnType::Datacenter);
        assert!(asn.is_hosting);
    }

    #[test]
    fn skips_malformed_line() {
        assert!(parse_line("not a valid line").is_none());
    }
}

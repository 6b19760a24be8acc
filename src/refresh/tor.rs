//! Tor exit-node feed parsing: a newline-delimited IP list (one per line,
//! `#`-prefixed comments ignored) or a JSON array of
//! `{nickname, fingerprint, exit_addresses, last_seen}` objects.

use chrono::Utc;
use serde::Deserialize;

use crate::netutil;
use crate::refdata::models::TorExitNode;

#[derive(Deserialize)]
struct TorFeedEntry {
    nickname: Option<String>,
    fingerprint: Option<String>,
    exit_addresses: Vec<String>,
    #[allow(dead_code)]
    last_seen: Option<String>,
}

pub fn parse(body: &str) -> Vec<TorExitNode> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') {
        return parse_json(trimmed);
    }
    parse_lines(body)
}

fn parse_json(body: &str) -> Vec<TorExitNode> {
    let entries: Vec<TorFeedEntry> = match serde_json::from_str(body) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let now = Utc::now();
    entries
        .into_iter()
        .flat_map(|entry| {
            entry.exit_addresses.into_iter().filter_map(move |addr| {
                let ip = netutil::parse(&addr).ok()?;
                Some(TorExitNode {
                    ip: ip.to_string(),
                    ip_version: if matches!(ip, std::net::IpAddr::V4(_)) { 4 } else { 6 },
                    node_id: entry.fingerprint.clone(),
                    nickname: entry.nickname.clone(),
                    is_active: true,
                    last_seen_at: now,
                    risk_weight: TorExitNode::DEFAULT_RISK_WEIGHT,
                })
            })
        })
        .collect()
}

fn parse_lines(body: &str) -> Vec<TorExitNode> {
    body.lines().filter_map(parse_line).collect()
}

/// Parses one feed line, or `None` for a blank/comment/malformed line. Used
/// both by [`parse_lines`] (whole-body parsing) and the refresh pipeline's
/// streaming line reader.
pub(crate) fn parse_line(line: &str) -> Option<TorExitNode> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut parts = line.split_whitespace();
    let ip_str = parts.next()?;
    let nickname = parts.next().map(|s| s.to_string());
    let ip = netutil::parse(ip_str).ok()?;
    Some(TorExitNode {
        ip: ip.to_string(),
        ip_version: if matches!(ip, std::net::IpAddr::V4(_)) { 4 } else { 6 },
        node_id: None,
        nickname,
        is_active: true,
        last_seen_at: Utc::now(),
        risk_weight: TorExitNode::DEFAULT_RISK_WEIGHT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_ip_list_with_comments() {
        let body = "# tor exit list\n1.2.3.4\n5.6.7.8 relay-nickname\n\n";
        let nodes = parse(body);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].nickname.as_deref(), Some("relay-nickname"));
    }

    #[test]
    fn parses_json_feed() {
        let body = r#"[{"nickname":"relay1","fingerprint":"ABC","exit_addresses":["9.9.9.9"],"last_seen":"2024-01-01"}]"#;
        let nodes = parse(body);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].ip, "9.9.9.9");
    }

    #[test]
    fn skips_malformed_lines() {
        let body = "not-an-ip\n1.2.3.4\n";
        let nodes = parse(body);
        assert_eq!(nodes.len(), 1);
    }
}

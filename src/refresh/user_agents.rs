//! Known user-agent feed parsing: a JSON array of
//! `{pattern|userAgent, name|browser, version?}` objects. Each entry is
//! sha256-hashed to the `ua_hash` primary key so lookups never store the raw
//! string twice.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::refdata::models::{KnownUserAgent, UserAgentType};

#[derive(Deserialize)]
struct UserAgentFeedEntry {
    pattern: Option<String>,
    #[serde(rename = "userAgent")]
    user_agent: Option<String>,
    name: Option<String>,
    browser: Option<String>,
    version: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn parse(body: &str) -> Result<Vec<KnownUserAgent>, anyhow::Error> {
    let entries: Vec<UserAgentFeedEntry> = serde_json::from_str(body)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let pattern = entry.pattern.or(entry.user_agent)?;
            let name = entry.name.or(entry.browser);
            let ua_type = match entry.category.as_deref() {
                Some("bot") => UserAgentType::Bot,
                Some("scraper") => UserAgentType::Scraper,
                Some("malicious") => UserAgentType::Malicious,
                Some("browser") => UserAgentType::Browser,
                _ => UserAgentType::Unknown,
            };
            let risk_weight = match ua_type {
                UserAgentType::Malicious => 80,
                UserAgentType::Bot | UserAgentType::Scraper => 40,
                UserAgentType::Browser => 0,
                UserAgentType::Unknown => 10,
            };
            Some(KnownUserAgent {
                ua_hash: sha256_hex(&pattern),
                ua_type,
                name,
                version: entry.version,
                risk_weight,
                is_outdated: false,
                eol_date: None,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_with_mixed_field_names() {
        let body = r#"[
            {"pattern": "curl/7.0", "name": "curl", "category": "bot"},
            {"userAgent": "Mozilla/5.0 Chrome", "browser": "Chrome", "version": "120", "category": "browser"}
        ]"#;
        let agents = parse(body).unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].ua_type, UserAgentType::Bot);
        assert_eq!(agents[1].name.as_deref(), Some("Chrome"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse("not json").is_err());
    }
}

//! User-agent risk check: known-UA reputation, bot/automation/hacking
//! markers, malformed-string heuristics, and request velocity.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::CheckToggles;
use crate::refdata::models::UserAgentType;
use crate::velocity::Window;

use super::{cap_score, Check, CheckContext, CheckResult, EvaluateInput};

const BOT_MARKERS: &[&str] = &["bot", "spider", "crawler", "scraper"];
const AUTOMATION_MARKERS: &[&str] = &["headless", "phantomjs", "selenium", "puppeteer", "playwright"];
const MALICIOUS_MARKERS: &[&str] = &["sqlmap", "nikto", "nmap", "masscan", "zgrab", "metasploit"];
const LANGUAGE_MARKERS: &[&str] = &["curl", "python-requests", "go-http-client", "java/", "okhttp", "libwww-perl"];
const HACKING_MARKERS: &[&str] = &["hack", "exploit", "inject", "bypass", "penetration"];

static MSIE_VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"MSIE ([6-9])\.0").unwrap());

/// Out-of-charset scan: anything outside `[a-zA-Z0-9\s()\[\]/.,;:_+-]`.
static DISALLOWED_UA_CHAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s()\[\]/.,;:_+-]").unwrap());

/// Differentiated bump by MSIE version: the older the browser, the higher the score.
fn outdated_msie_bump(ua: &str) -> Option<u32> {
    let caps = MSIE_VERSION_RE.captures(ua)?;
    match &caps[1] {
        "6" => Some(90),
        "7" => Some(80),
        "8" => Some(70),
        "9" => Some(60),
        _ => None,
    }
}

pub struct UserAgentCheck;

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// True if any character repeats 10 or more times consecutively. The `regex`
/// crate has no backreference support, so this is a manual scan.
fn has_repeated_char_run(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(mut prev) = chars.next() else { return false };
    let mut run = 1;
    for c in chars {
        if c == prev {
            run += 1;
            if run >= 10 {
                return true;
            }
        } else {
            prev = c;
            run = 1;
        }
    }
    false
}

#[async_trait]
impl Check for UserAgentCheck {
    fn name(&self) -> &'static str {
        "user_agent"
    }

    fn applicable(&self, input: &EvaluateInput, toggles: &CheckToggles) -> bool {
        toggles.user_agent && input.user_agent.is_some()
    }

    async fn perform(&self, input: &EvaluateInput, ctx: &CheckContext) -> CheckResult {
        let ua = input.user_agent.as_deref().unwrap_or_default();

        if ua.trim().len() < 10 {
            return CheckResult {
                passed: false,
                score: 50,
                details: json!({ "too_short": true }),
            };
        }

        let mut score: u32 = 0;
        let mut details = serde_json::Map::new();
        let lower = ua.to_lowercase();

        // Known-UA table lookup.
        let ua_hash = sha256_hex(ua);
        let mut known_malicious = false;
        match ctx.refdata.lookup_known_user_agent(&ua_hash).await {
            Ok(Some(known)) => {
                score += known.risk_weight.max(0) as u32;
                if known.is_outdated {
                    score += 20;
                }
                if known.ua_type == UserAgentType::Malicious {
                    known_malicious = true;
                }
                details.insert("known_ua_type".into(), json!(format!("{:?}", known.ua_type)));
                details.insert("known_ua_outdated".into(), json!(known.is_outdated));
            }
            Ok(None) => {}
            Err(e) => return CheckResult::error(format!("reference store failure: {e}")),
        }

        // Pattern scans.
        if BOT_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 40;
            details.insert("bot_pattern".into(), json!(true));
        }
        if AUTOMATION_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 50;
            details.insert("automation_pattern".into(), json!(true));
        }
        if MALICIOUS_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 80;
            known_malicious = true;
            details.insert("malicious_pattern".into(), json!(true));
        }
        if LANGUAGE_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 30;
            details.insert("programming_language_client".into(), json!(true));
        }

        // Outdated-browser bumps.
        if let Some(bump) = outdated_msie_bump(ua) {
            score += bump;
            details.insert("outdated_browser".into(), json!(true));
        }

        // Suspicious characteristics.
        if ua.len() < 20 {
            score += 30;
        }
        if ua.len() > 500 {
            score += 20;
        }
        let has_engine_token = lower.contains("mozilla") || lower.contains("webkit") || lower.contains("gecko");
        if !has_engine_token {
            score += 25;
            details.insert("missing_engine_token".into(), json!(true));
        }
        if HACKING_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 60;
            details.insert("hacking_marker".into(), json!(true));
        }
        if has_repeated_char_run(ua) {
            score += 40;
            details.insert("repeated_char_run".into(), json!(true));
        }
        let out_of_charset = DISALLOWED_UA_CHAR_RE.is_match(ua);
        if out_of_charset {
            score += 50;
            details.insert("out_of_charset".into(), json!(true));
        }

        // Frequency: how many times this exact UA string has been seen today.
        let day_count = ctx.velocity.bump("user_agent_day", &ua_hash, Window::Day);
        let mut velocity_risk_score = 0u32;
        if day_count > 1000 {
            velocity_risk_score = 20;
        } else if day_count > 100 {
            velocity_risk_score = 10;
        }
        score += velocity_risk_score;
        details.insert(
            "velocity".into(),
            json!({ "day_count": day_count, "risk_score": velocity_risk_score }),
        );
        details.insert("known_malicious".into(), json!(known_malicious));

        let score = cap_score(score);
        let passed = !(known_malicious || score >= 80);
        CheckResult { passed, score, details: details.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bot_marker() {
        assert!(BOT_MARKERS.iter().any(|m| "Mozilla/5.0 (compatible; Googlebot/2.1)".to_lowercase().contains(m)));
    }

    #[test]
    fn detects_outdated_msie() {
        assert_eq!(outdated_msie_bump("Mozilla/4.0 (compatible; MSIE 6.0; Windows NT 5.1)"), Some(90));
        assert_eq!(outdated_msie_bump("Mozilla/4.0 (compatible; MSIE 7.0; Windows NT 5.1)"), Some(80));
        assert_eq!(outdated_msie_bump("Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 5.1)"), Some(70));
        assert_eq!(outdated_msie_bump("Mozilla/4.0 (compatible; MSIE 9.0; Windows NT 5.1)"), Some(60));
        assert_eq!(outdated_msie_bump("Mozilla/5.0 (compatible; MSIE 11.0; Windows NT 10.0)"), None);
    }

    #[test]
    fn flags_out_of_charset_symbols() {
        assert!(DISALLOWED_UA_CHAR_RE.is_match("Mozilla/5.0 <script>@evil#</script>"));
        assert!(!DISALLOWED_UA_CHAR_RE.is_match("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Gecko/20100101"));
    }

    #[test]
    fn detects_repeated_char_run() {
        assert!(has_repeated_char_run("aaaaaaaaaaaaaaaaaaaa"));
        assert!(!has_repeated_char_run("Mozilla/5.0 normal agent string"));
    }
}

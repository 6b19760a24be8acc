//! Email risk check: syntax/disposable/blacklist, domain reputation history,
//! and local-part pattern heuristics.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::config::CheckToggles;
use crate::refdata::models::BlacklistKind;

use super::{cap_score, Check, CheckContext, CheckResult, EvaluateInput};

// A pragmatic RFC-5322 validity regex (full grammar is impractical and the
// pack's own validators favor this kind of pragmatic subset too).
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$").unwrap()
});

static CONSECUTIVE_SEPARATORS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[._-]{2,}").unwrap());

const ROLE_PREFIXES: &[&str] = &[
    "admin", "support", "info", "contact", "sales", "help", "webmaster", "postmaster", "noreply",
    "no-reply", "donotreply", "abuse", "spam", "security", "billing", "legal", "privacy",
];

pub struct EmailCheck;

#[async_trait]
impl Check for EmailCheck {
    fn name(&self) -> &'static str {
        "email"
    }

    fn applicable(&self, input: &EvaluateInput, toggles: &CheckToggles) -> bool {
        toggles.email && input.email.is_some()
    }

    async fn perform(&self, input: &EvaluateInput, ctx: &CheckContext) -> CheckResult {
        let email = input.email.as_deref().unwrap_or_default();
        let normalized = email.trim().to_lowercase();

        // 1. RFC-5322 validity: hard fail and early return if invalid.
        if !EMAIL_RE.is_match(&normalized) {
            return CheckResult {
                passed: false,
                score: 100,
                details: json!({ "valid_format": false, "hard_fail": "invalid_format" }),
            };
        }

        let (local_part, domain) = match normalized.split_once('@') {
            Some(pair) => pair,
            None => {
                return CheckResult {
                    passed: false,
                    score: 100,
                    details: json!({ "valid_format": false, "hard_fail": "invalid_format" }),
                }
            }
        };

        let mut score: u32 = 0;
        let mut hard_fail = false;
        let mut details = serde_json::Map::new();
        details.insert("valid_format".into(), json!(true));

        // 2. Blacklist lookup by keyed-hash of email.
        let keyed_hash = ctx.hasher.hash(&normalized);
        match ctx.refdata.lookup_blacklist(BlacklistKind::Email, &keyed_hash).await {
            Ok(Some(entry)) => {
                score += entry.effective_weight() as u32;
                hard_fail = true;
                details.insert("blacklisted".into(), json!(true));
                details.insert("blacklist_reason".into(), json!(entry.reason));
            }
            Ok(None) => {
                details.insert("blacklisted".into(), json!(false));
            }
            Err(e) => return reference_store_failure(e),
        }

        // 3. Disposable-domain lookup by domain.
        match ctx.refdata.lookup_disposable_domain(domain).await {
            Ok(Some(entry)) => {
                score += 80;
                hard_fail = true;
                details.insert("disposable_domain".into(), json!(true));
                details.insert("disposable_source".into(), json!(entry.source));
            }
            Ok(None) => {
                details.insert("disposable_domain".into(), json!(false));
            }
            Err(e) => return reference_store_failure(e),
        }

        // 4. Role address.
        let is_role = ROLE_PREFIXES.iter().any(|p| local_part == *p || local_part.starts_with(p));
        if is_role {
            score += 30;
            details.insert("role_address".into(), json!(true));
        }

        // 5. Separator analysis.
        let separator_count = local_part.chars().filter(|c| matches!(c, '.' | '-' | '_')).count();
        if separator_count > 5 {
            score += 15;
        } else if separator_count > 3 {
            score += 10;
        }
        let has_consecutive_separators = CONSECUTIVE_SEPARATORS_RE.is_match(local_part);
        if has_consecutive_separators {
            score += 20;
        }
        details.insert("separator_count".into(), json!(separator_count));

        // 6. `+` tag.
        let has_plus_tag = local_part.contains('+');
        if has_plus_tag {
            score += 20;
            details.insert("has_plus_tag".into(), json!(true));
        }

        // 7. Composition.
        if local_part.len() < 3 {
            score += 20;
        }
        if local_part.len() > 30 {
            score += 15;
        }
        let all_digit = !local_part.is_empty() && local_part.chars().all(|c| c.is_ascii_digit());
        if all_digit {
            score += 30;
        }
        let random_pattern = looks_random(local_part);
        if random_pattern {
            score += 25;
            details.insert("random_pattern".into(), json!(true));
        }

        // 8. DNS check, skipped if already over 100.
        if score <= 100 {
            let has_mx = ctx.collaborators.mx.has_mail_exchanger(domain).await;
            let has_a = if has_mx { true } else { ctx.collaborators.mx.has_address_record(domain).await };
            if !has_mx && !has_a {
                score += 50;
                hard_fail = true;
                details.insert("dns_resolvable".into(), json!(false));
            } else {
                details.insert("dns_resolvable".into(), json!(true));
            }
        }

        // 9. Reputation: prior audit records for this keyed-hash in the last 6 months.
        match reputation(ctx, &keyed_hash).await {
            Ok((avg_score, prior_blocks)) => {
                if let Some(avg) = avg_score {
                    if avg > 70.0 {
                        score += 20;
                    }
                }
                if prior_blocks > 2 {
                    score += 30;
                }
                details.insert("reputation_avg_score".into(), json!(avg_score));
                details.insert("reputation_prior_blocks".into(), json!(prior_blocks));
            }
            Err(e) => return reference_store_failure(e),
        }

        let score = cap_score(score);
        let passed = !(hard_fail || score >= 80);
        CheckResult { passed, score, details: details.into() }
    }
}

fn reference_store_failure(e: sqlx::Error) -> CheckResult {
    // Surfaced as a capped failure rather than propagated, so one broken
    // lookup never aborts the whole evaluation.
    CheckResult::error(format!("reference store failure: {e}"))
}

async fn reputation(ctx: &CheckContext, keyed_hash: &str) -> Result<(Option<f64>, i64), sqlx::Error> {
    let since = Utc::now() - ChronoDuration::days(180);
    let row = sqlx::query_as::<_, (Option<f64>, i64)>(
        "SELECT AVG(risk_score), SUM(CASE WHEN decision = 'block' THEN 1 ELSE 0 END)
         FROM fraud_checks WHERE email_hash = ? AND created_at >= ? AND status = 'completed'",
    )
    .bind(keyed_hash)
    .bind(since)
    .fetch_one(ctx.refdata.pool())
    .await?;
    Ok((row.0, row.1))
}

/// Random-pattern detection: after stripping `._-`, either
/// (a) length >= 8 with unique-char ratio > 0.8 and a mix of lower/upper/digit,
/// or (b) a 16+ char run of `[a-z0-9]` or `[a-f0-9]`.
fn looks_random(local_part: &str) -> bool {
    let cleaned: String = local_part.chars().filter(|c| !matches!(c, '.' | '-' | '_')).collect();
    if cleaned.len() >= 8 {
        let unique: std::collections::HashSet<char> = cleaned.chars().collect();
        let ratio = unique.len() as f64 / cleaned.len() as f64;
        let has_lower = cleaned.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = cleaned.chars().any(|c| c.is_ascii_uppercase());
        let has_digit = cleaned.chars().any(|c| c.is_ascii_digit());
        if ratio > 0.8 && has_lower && has_upper && has_digit {
            return true;
        }
    }
    let lower = cleaned.to_lowercase();
    if lower.len() >= 16 {
        let all_alnum_lower = lower.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let all_hex = lower.chars().all(|c| c.is_ascii_hexdigit());
        if all_alnum_lower || all_hex {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_random_pattern_mixed_case() {
        assert!(looks_random("Xk9mQw2pL7"));
    }

    #[test]
    fn detects_random_pattern_long_hex() {
        assert!(looks_random("a1b2c3d4e5f6a7b8"));
    }

    #[test]
    fn normal_name_is_not_random() {
        assert!(!looks_random("john.doe"));
    }

    #[test]
    fn email_regex_rejects_malformed() {
        assert!(!EMAIL_RE.is_match("not-an-email"));
        assert!(!EMAIL_RE.is_match("@example.com"));
        assert!(EMAIL_RE.is_match("alice@example.com"));
    }

    #[test]
    fn role_prefix_matches_prefix_not_just_equality() {
        assert!(ROLE_PREFIXES.iter().any(|p| "admin-team".starts_with(p)));
        assert!(!ROLE_PREFIXES.iter().any(|p| "alexander".starts_with(p)));
    }
}

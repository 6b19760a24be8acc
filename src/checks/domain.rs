//! Domain-reputation check: registration age, MX presence, TLD risk tier.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::config::CheckToggles;

use super::{cap_score, Check, CheckContext, CheckResult, EvaluateInput};

static LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap());
static TLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{2,}$").unwrap());

const PARKED_INDICATORS: &[&str] = &[
    "this domain is parked",
    "buy this domain",
    "domain for sale",
    "this domain may be for sale",
    "related searches",
    "parkingcrew",
];

pub struct DomainCheck;

fn is_valid_hostname(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    if !labels.iter().all(|l| LABEL_RE.is_match(l)) {
        return false;
    }
    TLD_RE.is_match(labels.last().unwrap())
}

#[async_trait]
impl Check for DomainCheck {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn applicable(&self, input: &EvaluateInput, toggles: &CheckToggles) -> bool {
        toggles.domain && input.effective_domain().is_some()
    }

    async fn perform(&self, input: &EvaluateInput, ctx: &CheckContext) -> CheckResult {
        let domain = input.effective_domain().unwrap_or_default();

        if !is_valid_hostname(&domain) {
            return CheckResult {
                passed: false,
                score: 100,
                details: json!({ "valid_hostname": false, "hard_fail": "invalid_hostname" }),
            };
        }

        let mut score: u32 = 0;
        let mut details = serde_json::Map::new();
        details.insert("valid_hostname".into(), json!(true));

        // MX records present.
        let has_mx = ctx.collaborators.mx.has_mail_exchanger(&domain).await;
        if !has_mx {
            score += 50;
            details.insert("mx_present".into(), json!(false));
        } else {
            details.insert("mx_present".into(), json!(true));
        }

        // Domain age.
        let age_days = ctx.collaborators.domain_age.age_days(&domain).await;
        if let Some(age) = age_days {
            if age < 30 {
                score += 40;
            } else if age < 180 {
                score += 20;
            }
        }
        details.insert("age_days".into(), json!(age_days));

        // Parked-domain detection.
        if let Some(body) = ctx.collaborators.domain_age.fetch_body(&domain).await {
            let lower = body.to_lowercase();
            if PARKED_INDICATORS.iter().any(|ind| lower.contains(ind)) {
                score += 60;
                details.insert("parked".into(), json!(true));
            }
        }

        // DNS configuration: A/AAAA and SPF TXT.
        let has_address = ctx.collaborators.mx.has_address_record(&domain).await;
        if !has_address {
            score += 20;
            details.insert("has_address_record".into(), json!(false));
        }
        let has_spf = ctx.collaborators.mx.has_spf_record(&domain).await;
        if !has_spf {
            score += 10;
        }
        details.insert("has_spf_record".into(), json!(has_spf));

        // Historical reputation.
        match reputation(ctx, &domain).await {
            Ok((avg_score, prior_blocks)) => {
                if let Some(avg) = avg_score {
                    if avg > 70.0 {
                        score += 30;
                    }
                }
                if prior_blocks > 5 {
                    score += 40;
                }
                details.insert("reputation_avg_score".into(), json!(avg_score));
                details.insert("reputation_prior_blocks".into(), json!(prior_blocks));
            }
            Err(e) => return CheckResult::error(format!("reference store failure: {e}")),
        }

        let score = cap_score(score);
        let hard_fail = !has_mx;
        let passed = !(hard_fail || score >= 80);
        CheckResult { passed, score, details: details.into() }
    }
}

async fn reputation(ctx: &CheckContext, domain: &str) -> Result<(Option<f64>, i64), sqlx::Error> {
    let since = Utc::now() - ChronoDuration::days(180);
    sqlx::query_as::<_, (Option<f64>, i64)>(
        "SELECT AVG(risk_score), SUM(CASE WHEN decision = 'block' THEN 1 ELSE 0 END)
         FROM fraud_checks WHERE domain = ? AND created_at >= ? AND status = 'completed'",
    )
    .bind(domain)
    .bind(since)
    .fetch_one(ctx.refdata.pool())
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_hostnames() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("sub.example.co"));
    }

    #[test]
    fn invalid_hostnames() {
        assert!(!is_valid_hostname("not a domain"));
        assert!(!is_valid_hostname("-example.com"));
        assert!(!is_valid_hostname("example.1"));
        assert!(!is_valid_hostname("nodot"));
    }
}

//! Combines per-check results into a final risk score: weighted mean over
//! executed checks, then a strict sequence of multiplicative modifiers,
//! then a critical-failure floor.

use std::collections::HashMap;

use crate::checks::CheckResult;

const WEIGHTS: &[(&str, f64)] = &[
    ("email", 0.25),
    ("domain", 0.15),
    ("ip", 0.25),
    ("credit_card", 0.20),
    ("phone", 0.10),
    ("user_agent", 0.05),
];

fn weight_of(name: &str) -> f64 {
    WEIGHTS.iter().find(|(n, _)| *n == name).map(|(_, w)| *w).unwrap_or(0.0)
}

/// Weighted mean of executed checks' scores, divided by the sum of their
/// weights so a partial check set (e.g. no credit_card supplied) doesn't
/// silently deflate the score.
fn weighted_mean(results: &HashMap<String, CheckResult>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (name, result) in results {
        let w = weight_of(name);
        weighted_sum += w * result.score as f64;
        weight_total += w;
    }
    if weight_total <= 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}

fn count_high_scores(results: &HashMap<String, CheckResult>) -> usize {
    results.values().filter(|r| r.score >= 80).count()
}

fn detail_bool(result: &CheckResult, key: &str) -> bool {
    result.details.get(key).and_then(serde_json::Value::as_bool).unwrap_or(false)
}

fn is_tor_or_vpn_ip(results: &HashMap<String, CheckResult>) -> bool {
    results
        .get("ip")
        .map(|r| detail_bool(r, "tor_exit_node") || detail_bool(r, "is_vpn_or_proxy"))
        .unwrap_or(false)
}

fn is_new_domain(results: &HashMap<String, CheckResult>) -> bool {
    results
        .get("domain")
        .and_then(|r| r.details.get("age_days"))
        .and_then(serde_json::Value::as_i64)
        .map(|age| age < 30)
        .unwrap_or(false)
}

fn is_high_risk_ip(results: &HashMap<String, CheckResult>) -> bool {
    results.get("ip").map(|r| r.score >= 80).unwrap_or(false)
}

fn is_known_test_card(results: &HashMap<String, CheckResult>) -> bool {
    results.get("credit_card").map(|r| detail_bool(r, "known_test_card")).unwrap_or(false)
}

fn is_bot_or_automation_ua(results: &HashMap<String, CheckResult>) -> bool {
    results
        .get("user_agent")
        .map(|r| detail_bool(r, "bot_pattern") || detail_bool(r, "automation_pattern"))
        .unwrap_or(false)
}

fn location_mismatch_count(results: &HashMap<String, CheckResult>) -> i64 {
    results
        .get("ip")
        .and_then(|r| r.details.get("location_mismatches"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}

fn velocity_concern_count(results: &HashMap<String, CheckResult>) -> usize {
    results
        .values()
        .filter(|r| {
            r.details
                .get("velocity")
                .and_then(|v| v.get("risk_score"))
                .and_then(serde_json::Value::as_u64)
                .map(|s| s > 20)
                .unwrap_or(false)
        })
        .count()
}

fn is_critical_failure(results: &HashMap<String, CheckResult>) -> bool {
    if results.values().any(|r| r.blacklisted()) {
        return true;
    }
    if results.get("credit_card").map(|r| r.score == 100).unwrap_or(false) {
        return true;
    }
    if results
        .get("user_agent")
        .map(|r| r.details.get("known_malicious").and_then(serde_json::Value::as_bool).unwrap_or(false))
        .unwrap_or(false)
    {
        return true;
    }
    false
}

/// Combines executed Check results into a single `[0, 100]` risk score.
pub fn compute(results: &HashMap<String, CheckResult>) -> u32 {
    let mut score = weighted_mean(results);

    // Count-of-high-scores bump.
    let high_count = count_high_scores(results);
    if high_count >= 3 {
        score *= 1.30;
    } else if high_count >= 2 {
        score *= 1.15;
    }

    // Pattern bumps.
    if results.get("email").map(|r| detail_bool(r, "disposable_domain")).unwrap_or(false)
        && is_tor_or_vpn_ip(results)
    {
        score *= 1.40;
    }
    if is_new_domain(results) && is_high_risk_ip(results) {
        score *= 1.25;
    }
    if is_known_test_card(results) && is_bot_or_automation_ua(results) {
        score *= 1.50;
    }
    if location_mismatch_count(results) >= 2 {
        score *= 1.30;
    }

    // Velocity-concern bump.
    if velocity_concern_count(results) >= 2 {
        score *= 1.20;
    }

    let mut final_score = score.round().clamp(0.0, 100.0) as u32;

    // Critical-failure floor.
    if is_critical_failure(results) {
        final_score = final_score.max(90);
    }

    final_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(score: u32, details: serde_json::Value) -> CheckResult {
        CheckResult { passed: score < 80, score, details }
    }

    #[test]
    fn weighted_mean_over_partial_checks() {
        let mut results = HashMap::new();
        results.insert("email".to_string(), result(80, json!({})));
        results.insert("ip".to_string(), result(40, json!({})));
        // weight_total = 0.25 + 0.25 = 0.5; weighted_sum = 0.25*80 + 0.25*40 = 30
        let score = compute(&results);
        assert_eq!(score, 60);
    }

    #[test]
    fn critical_floor_forces_minimum_90() {
        let mut results = HashMap::new();
        results.insert("email".to_string(), result(10, json!({ "blacklisted": true })));
        let score = compute(&results);
        assert!(score >= 90);
    }

    #[test]
    fn disposable_plus_tor_applies_multiplier() {
        let mut results = HashMap::new();
        results.insert("email".to_string(), result(80, json!({ "disposable_domain": true })));
        results.insert("ip".to_string(), result(50, json!({ "tor_exit_node": true })));
        let unmultiplied = (0.25 * 80.0 + 0.25 * 50.0) / 0.5;
        let score = compute(&results);
        assert!(score as f64 > unmultiplied);
    }
}

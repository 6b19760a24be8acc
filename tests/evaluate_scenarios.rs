//! Exercises the scorer + decision pipeline against the concrete scenarios:
//! clean input, disposable+tor, Luhn-fail+bot-UA, reserved IP, new-domain+
//! high-risk-ip, and critical-floor-via-blacklist. These operate on
//! `CheckResult` maps directly rather than through HTTP, since the scoring
//! math -- not network plumbing -- is what each scenario is about.

use std::collections::HashMap;

use riskguard::checks::CheckResult;
use riskguard::config::DecisionThresholds;
use riskguard::decision::{self, Decision};
use riskguard::scorer;
use serde_json::json;

fn thresholds() -> DecisionThresholds {
    DecisionThresholds { auto_allow: 30, manual_review: 50, auto_block: 80 }
}

fn passing(score: u32) -> CheckResult {
    CheckResult { passed: score < 50, score, details: json!({}) }
}

#[test]
fn clean_input_allows() {
    let mut results = HashMap::new();
    results.insert("email".to_string(), passing(0));
    results.insert("domain".to_string(), passing(0));
    results.insert("ip".to_string(), passing(0));
    results.insert("user_agent".to_string(), passing(0));

    let score = scorer::compute(&results);
    assert_eq!(score, 0);
    assert_eq!(decision::map(score, &thresholds()), Decision::Allow);
}

#[test]
fn disposable_email_plus_tor_blocks() {
    let mut results = HashMap::new();
    results.insert(
        "email".to_string(),
        CheckResult { passed: false, score: 80, details: json!({ "disposable_domain": true }) },
    );
    results.insert(
        "ip".to_string(),
        CheckResult { passed: false, score: 90, details: json!({ "tor_exit_node": true }) },
    );

    let score = scorer::compute(&results);
    // weighted mean (80*0.25 + 90*0.25)/0.50 = 85, then x1.40 -> 119 -> clamped 100
    assert_eq!(score, 100);
    assert_eq!(decision::map(score, &thresholds()), Decision::Block);
}

#[test]
fn luhn_fail_plus_bot_ua_blocks() {
    let mut results = HashMap::new();
    results.insert(
        "credit_card".to_string(),
        CheckResult { passed: false, score: 100, details: json!({ "luhn_valid": false }) },
    );
    results.insert(
        "user_agent".to_string(),
        CheckResult { passed: true, score: 70, details: json!({ "bot_marker": true }) },
    );

    let score = scorer::compute(&results);
    // (100*0.20 + 70*0.05) / 0.25 = 94
    assert_eq!(score, 94);
    assert_eq!(decision::map(score, &thresholds()), Decision::Block);
}

#[test]
fn reserved_ip_blocks_alone() {
    let mut results = HashMap::new();
    results.insert(
        "ip".to_string(),
        CheckResult { passed: false, score: 100, details: json!({ "reserved": true }) },
    );

    let score = scorer::compute(&results);
    assert_eq!(score, 100);
    assert_eq!(decision::map(score, &thresholds()), Decision::Block);
}

#[test]
fn new_domain_plus_high_risk_ip_pattern_bump() {
    let mut results = HashMap::new();
    results.insert(
        "domain".to_string(),
        CheckResult { passed: true, score: 40, details: json!({ "age_days": 5 }) },
    );
    results.insert(
        "ip".to_string(),
        CheckResult { passed: false, score: 85, details: json!({ "asn_type": "datacenter", "is_vpn": true }) },
    );

    let score = scorer::compute(&results);
    // weighted mean (40*0.15 + 85*0.25)/0.40 = 68.125, then x1.25 -> 85.16 -> 85
    assert_eq!(score, 85);
    assert_eq!(decision::map(score, &thresholds()), Decision::Block);
}

#[test]
fn blacklist_hit_forces_critical_floor() {
    let mut results = HashMap::new();
    results.insert(
        "email".to_string(),
        CheckResult { passed: false, score: 55, details: json!({ "blacklisted": true }) },
    );

    let score = scorer::compute(&results);
    assert!(score >= 90, "blacklist hit must force the critical floor regardless of the modifier total");
    assert_eq!(decision::map(score, &thresholds()), Decision::Block);
}

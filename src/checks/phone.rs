//! Phone-number risk check: E.164 validity, number-type classification, and
//! dialing-country consistency.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::config::CheckToggles;
use crate::refdata::models::BlacklistKind;
use crate::velocity::Window;

use super::{cap_score, Check, CheckContext, CheckResult, EvaluateInput};

/// E.164-shaped: optional leading `+`, then 8-15 digits, first digit nonzero.
static E164_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[1-9][0-9]{7,14}$").unwrap());

const TOLL_FREE_PREFIXES: &[&str] = &["800", "833", "844", "855", "866", "877", "888"];
const PREMIUM_PREFIXES: &[&str] = &["900"];
const VOIP_PREFIXES: &[&str] = &["500"];

const DISPOSABLE_PREFIXES: &[&str] = &["+1500", "+1900", "5555555"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberType {
    Mobile,
    FixedLine,
    TollFree,
    PremiumRate,
    Voip,
    SharedCost,
    Unknown,
}

impl NumberType {
    fn as_str(self) -> &'static str {
        match self {
            NumberType::Mobile => "mobile",
            NumberType::FixedLine => "fixed_line",
            NumberType::TollFree => "toll_free",
            NumberType::PremiumRate => "premium_rate",
            NumberType::Voip => "voip",
            NumberType::SharedCost => "shared_cost",
            NumberType::Unknown => "unknown",
        }
    }
}

/// Best-effort number-type classification from the national significant
/// number, good enough to drive the scoring sub-rule without a full national
/// numbering plan database.
fn classify(national: &str) -> NumberType {
    if TOLL_FREE_PREFIXES.iter().any(|p| national.starts_with(p)) {
        NumberType::TollFree
    } else if PREMIUM_PREFIXES.iter().any(|p| national.starts_with(p)) {
        NumberType::PremiumRate
    } else if VOIP_PREFIXES.iter().any(|p| national.starts_with(p)) {
        NumberType::Voip
    } else if national.starts_with('7') && national.len() == 10 {
        NumberType::SharedCost
    } else if national.starts_with('1') || national.starts_with('2') || national.starts_with('3') {
        NumberType::Mobile
    } else if national.starts_with('4') || national.starts_with('5') || national.starts_with('6') {
        NumberType::FixedLine
    } else {
        NumberType::Unknown
    }
}

pub struct PhoneCheck;

#[async_trait]
impl Check for PhoneCheck {
    fn name(&self) -> &'static str {
        "phone"
    }

    fn applicable(&self, input: &EvaluateInput, toggles: &CheckToggles) -> bool {
        toggles.phone && input.phone.is_some()
    }

    async fn perform(&self, input: &EvaluateInput, ctx: &CheckContext) -> CheckResult {
        let raw = input.phone.as_deref().unwrap_or_default();
        let normalized: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();

        // 1. E.164-shaped parse; invalid -> hard fail.
        if !E164_RE.is_match(&normalized) {
            return CheckResult {
                passed: false,
                score: 100,
                details: json!({ "valid": false, "hard_fail": "invalid_format" }),
            };
        }

        let mut score: u32 = 0;
        let mut hard_fail = false;
        let mut details = serde_json::Map::new();
        details.insert("valid".into(), json!(true));

        // 2. Blacklist lookup by keyed-hash.
        let keyed_hash = ctx.hasher.hash(&normalized);
        match ctx.refdata.lookup_blacklist(BlacklistKind::Phone, &keyed_hash).await {
            Ok(Some(entry)) => {
                score += entry.effective_weight() as u32;
                hard_fail = true;
                details.insert("blacklisted".into(), json!(true));
                details.insert("blacklist_reason".into(), json!(entry.reason));
            }
            Ok(None) => {
                details.insert("blacklisted".into(), json!(false));
            }
            Err(e) => return CheckResult::error(format!("reference store failure: {e}")),
        }

        // 3. Number-type scoring.
        let national = national_significant_number(&normalized);
        let number_type = classify(&national);
        let type_score = match number_type {
            NumberType::Voip => 40,
            NumberType::TollFree => 50,
            NumberType::PremiumRate => 60,
            NumberType::SharedCost => 30,
            NumberType::FixedLine => 10,
            NumberType::Unknown => 20,
            NumberType::Mobile => 0,
        };
        score += type_score;
        details.insert("number_type".into(), json!(number_type.as_str()));

        // 4. Country mismatch: the declared country doesn't match the dialing code.
        if let Some(declared) = &input.country {
            if let Some(expected) = dialing_country(&normalized) {
                if !declared.eq_ignore_ascii_case(expected) {
                    score += 30;
                    details.insert("country_mismatch".into(), json!(true));
                }
            }
        }

        // 5. Format anomalies: repeated-digit runs, sequential digits, or
        // excess out-of-charset characters in the original input.
        if has_format_anomaly(raw, &national) {
            score += 15;
            details.insert("format_anomaly".into(), json!(true));
        }

        // 6. Disposable/VoIP-burner prefix match.
        if DISPOSABLE_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
            score += 50;
            details.insert("disposable_prefix".into(), json!(true));
        }

        // 7. Velocity.
        let hour_count = ctx.velocity.bump("phone_hour", &keyed_hash, Window::Hour);
        let day_count = ctx.velocity.bump("phone_day", &keyed_hash, Window::Day);
        let mut velocity_risk_score = 0u32;
        if hour_count > 5 {
            velocity_risk_score += 25;
        } else if hour_count > 2 {
            velocity_risk_score += 15;
        }
        if day_count > 10 {
            velocity_risk_score += 20;
        }
        score += velocity_risk_score;
        details.insert(
            "velocity".into(),
            json!({ "hour_count": hour_count, "day_count": day_count, "risk_score": velocity_risk_score }),
        );

        let score = cap_score(score);
        let passed = !(hard_fail || score >= 80);
        CheckResult { passed, score, details: details.into() }
    }
}

const ALLOWED_FORMAT_CHARS: &[char] = &['+', '-', '(', ')', '.'];

/// `raw` is the input as the caller supplied it, before digit-stripping, so
/// the out-of-charset count is still observable; `national` is the already
/// E.164-normalized national significant number.
fn has_format_anomaly(raw: &str, national: &str) -> bool {
    has_excess_format_chars(raw) || has_repeated_digit_run(national, 7) || has_sequential_run(national)
}

fn has_excess_format_chars(raw: &str) -> bool {
    raw.chars()
        .filter(|c| !(c.is_ascii_digit() || c.is_whitespace() || ALLOWED_FORMAT_CHARS.contains(c)))
        .count()
        > 2
}

/// True if any digit repeats `min_run` or more times in a row, anywhere in `national`.
fn has_repeated_digit_run(national: &str, min_run: usize) -> bool {
    let mut chars = national.chars();
    let Some(mut prev) = chars.next() else { return false };
    let mut run = 1;
    for c in chars {
        if c == prev {
            run += 1;
            if run >= min_run {
                return true;
            }
        } else {
            prev = c;
            run = 1;
        }
    }
    false
}

fn has_sequential_run(national: &str) -> bool {
    let digits: Vec<u32> = national.chars().filter_map(|c| c.to_digit(10)).collect();
    digits.windows(4).any(|w| {
        (w[1] == w[0] + 1 && w[2] == w[1] + 1 && w[3] == w[2] + 1)
            || (w[0] > 0 && w[1] == w[0] - 1 && w[2] == w[1].wrapping_sub(1) && w[3] == w[2].wrapping_sub(1))
    })
}

/// Known dialing codes and their lengths, longest first so a 2-digit code
/// like "44" is never mistaken for a 1-digit prefix.
const DIALING_CODES: &[(&str, &str)] = &[
    ("44", "GB"),
    ("91", "IN"),
    ("49", "DE"),
    ("33", "FR"),
    ("86", "CN"),
    ("81", "JP"),
    ("1", "US"),
];

fn dialing_country(e164: &str) -> Option<&'static str> {
    let digits = e164.trim_start_matches('+');
    DIALING_CODES.iter().find(|(code, _)| digits.starts_with(code)).map(|(_, country)| *country)
}

/// Strips the dialing code (as recognized by [`dialing_country`]) from an
/// E.164 number to get the national significant number. Numbers under an
/// unrecognized dialing code fall back to stripping a single digit, matching
/// the NANP (+1) convention most of our disposable/premium prefix tables
/// assume.
fn national_significant_number(e164: &str) -> String {
    let digits = e164.trim_start_matches('+');
    let code_len = DIALING_CODES.iter().find(|(code, _)| digits.starts_with(code)).map(|(code, _)| code.len()).unwrap_or(1);
    digits.chars().skip(code_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e164_validation() {
        assert!(E164_RE.is_match("+14155552671"));
        assert!(!E164_RE.is_match("not-a-phone"));
        assert!(!E164_RE.is_match("+0123"));
    }

    #[test]
    fn classifies_toll_free() {
        assert_eq!(classify("8005551234"), NumberType::TollFree);
    }

    #[test]
    fn detects_repeated_digit_anomaly() {
        assert!(has_format_anomaly("1111111111", "1111111111"));
        assert!(!has_format_anomaly("4155552671", "4155552671"));
    }

    #[test]
    fn detects_repeated_run_within_longer_number() {
        // a 7-digit run of '5' starting at index 1, not the whole number
        assert!(has_repeated_digit_run("155555555", 7));
        assert!(!has_repeated_digit_run("155555", 7));
    }

    #[test]
    fn excess_format_chars_require_more_than_two() {
        assert!(!has_excess_format_chars("+1 (415) 555-2671"));
        assert!(has_excess_format_chars("+1#415#555#2671#!!"));
    }

    #[test]
    fn dialing_country_lookup() {
        assert_eq!(dialing_country("+14155552671"), Some("US"));
        assert_eq!(dialing_country("+442071838750"), Some("GB"));
    }

    #[test]
    fn national_number_strips_two_digit_dialing_code() {
        // UK premium-rate number: +44 then national "9001234567".
        assert_eq!(national_significant_number("+449001234567"), "9001234567");
        assert_eq!(classify(&national_significant_number("+449001234567")), NumberType::PremiumRate);
    }

    #[test]
    fn national_number_strips_one_digit_nanp_code() {
        assert_eq!(national_significant_number("+14155552671"), "4155552671");
    }
}

//! Disposable-domain feed parsing: newline text with `#`/`//` comments and a
//! stripped leading `*.` wildcard, or a JSON array of domain strings.

use crate::refdata::models::DisposableEmailDomain;

/// Domain substrings that mark a feed entry as an especially blatant
/// disposable/burner provider, scored above the feed default.
const HIGH_RISK_KEYWORDS: &[&str] = &["temp", "trash", "fake", "burner", "guerrilla", "10minute", "throwaway"];
const KEYWORD_RISK_WEIGHT: i32 = 95;

pub fn parse(body: &str) -> Vec<DisposableEmailDomain> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') {
        return parse_json(trimmed);
    }
    parse_lines(body)
}

fn parse_json(body: &str) -> Vec<DisposableEmailDomain> {
    let domains: Vec<String> = match serde_json::from_str(body) {
        Ok(domains) => domains,
        Err(_) => return Vec::new(),
    };
    domains
        .into_iter()
        .map(|d| to_entry(&d))
        .collect()
}

fn parse_lines(body: &str) -> Vec<DisposableEmailDomain> {
    body.lines().filter_map(parse_line).collect()
}

/// Parses one feed line, or `None` for a blank/comment line. Used both by
/// [`parse_lines`] (whole-body parsing) and the refresh pipeline's streaming
/// line reader.
pub(crate) fn parse_line(line: &str) -> Option<DisposableEmailDomain> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
        return None;
    }
    Some(to_entry(line))
}

fn to_entry(raw: &str) -> DisposableEmailDomain {
    let domain = raw.trim().trim_start_matches("*.").to_lowercase();
    let risk_weight = if HIGH_RISK_KEYWORDS.iter().any(|k| domain.contains(k)) {
        KEYWORD_RISK_WEIGHT
    } else {
        DisposableEmailDomain::DEFAULT_RISK_WEIGHT
    };
    DisposableEmailDomain { domain, source: "refresh_pipeline".to_string(), is_active: true, risk_weight }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_with_comments_and_wildcards() {
        let body = "# header\nmailinator.com\n*.tempmail.org\n// trailing comment\nguerrillamail.com\n";
        let entries = parse(body);
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().any(|e| e.domain == "tempmail.org"));
    }

    #[test]
    fn parses_json_array() {
        let body = r#"["mailinator.com", "yopmail.com"]"#;
        let entries = parse(body);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn keyword_match_bumps_risk_weight_above_default() {
        let plain = to_entry("mailinator.com");
        assert_eq!(plain.risk_weight, DisposableEmailDomain::DEFAULT_RISK_WEIGHT);

        let bumped = to_entry("trashmail.com");
        assert_eq!(bumped.risk_weight, KEYWORD_RISK_WEIGHT);
        assert!(bumped.risk_weight > DisposableEmailDomain::DEFAULT_RISK_WEIGHT);
    }
}

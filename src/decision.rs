//! Maps a risk score onto an allow/review/block verdict.

use serde::{Deserialize, Serialize};

use crate::config::DecisionThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Review,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Review => "review",
            Decision::Block => "block",
        }
    }
}

/// `score >= auto_block -> Block`, `score >= manual_review -> Review`,
/// otherwise `Allow`. The zero-score case is subsumed by the final
/// `< manual_review` branch rather than given its own rule.
pub fn map(score: u32, thresholds: &DecisionThresholds) -> Decision {
    if score >= thresholds.auto_block {
        Decision::Block
    } else if score >= thresholds.manual_review {
        Decision::Review
    } else {
        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> DecisionThresholds {
        DecisionThresholds { auto_allow: 30, manual_review: 50, auto_block: 80 }
    }

    #[test]
    fn maps_boundaries() {
        let t = thresholds();
        assert_eq!(map(0, &t), Decision::Allow);
        assert_eq!(map(49, &t), Decision::Allow);
        assert_eq!(map(50, &t), Decision::Review);
        assert_eq!(map(79, &t), Decision::Review);
        assert_eq!(map(80, &t), Decision::Block);
        assert_eq!(map(100, &t), Decision::Block);
    }
}

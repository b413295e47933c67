// 🏷️ Segment Classifier - thresholds as data
// Ordered (predicate, label) rules on the composite RFM score.
// First match wins; a table is only accepted if it covers every score 3..=15.

use crate::error::{Result, RfmError};
use crate::scoring::ScoredMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// Lowest and highest composite score the scorer can produce
pub const MIN_RFM_SCORE: u8 = 3;
pub const MAX_RFM_SCORE: u8 = 15;

// ============================================================================
// SEGMENT LABELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "Loyal Customer")]
    LoyalCustomer,
    #[serde(rename = "Potential Loyalist")]
    PotentialLoyalist,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Churn Risk")]
    ChurnRisk,
}

impl Segment {
    /// The full value set, best segment first
    pub const ALL: [Segment; 4] = [
        Segment::LoyalCustomer,
        Segment::PotentialLoyalist,
        Segment::AtRisk,
        Segment::ChurnRisk,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::LoyalCustomer => "Loyal Customer",
            Segment::PotentialLoyalist => "Potential Loyalist",
            Segment::AtRisk => "At Risk",
            Segment::ChurnRisk => "Churn Risk",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Segment {
    type Err = RfmError;

    fn from_str(s: &str) -> Result<Self> {
        Segment::ALL
            .into_iter()
            .find(|segment| segment.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RfmError::InvalidRules(format!("unknown segment label: {:?}", s)))
    }
}

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRule {
    pub segment: Segment,

    /// Inclusive lower bound on the composite score
    #[serde(default)]
    pub min_score: Option<u8>,

    /// Exclusive upper bound on the composite score
    #[serde(default)]
    pub max_score: Option<u8>,

    #[serde(default)]
    pub description: Option<String>,
}

impl SegmentRule {
    pub fn new(segment: Segment, min_score: Option<u8>, max_score: Option<u8>) -> Self {
        SegmentRule {
            segment,
            min_score,
            max_score,
            description: None,
        }
    }

    pub fn matches(&self, rfm_score: u8) -> bool {
        self.min_score.map_or(true, |min| rfm_score >= min)
            && self.max_score.map_or(true, |max| rfm_score < max)
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRules {
    rules: Vec<SegmentRule>,
}

impl SegmentRules {
    /// Standard table:
    ///
    /// | score   | segment            |
    /// |---------|--------------------|
    /// | >= 12   | Loyal Customer     |
    /// | 9..12   | Potential Loyalist |
    /// | 6..9    | At Risk            |
    /// | < 6     | Churn Risk         |
    pub fn standard() -> Self {
        SegmentRules {
            rules: vec![
                SegmentRule::new(Segment::LoyalCustomer, Some(12), None),
                SegmentRule::new(Segment::PotentialLoyalist, Some(9), Some(12)),
                SegmentRule::new(Segment::AtRisk, Some(6), Some(9)),
                SegmentRule::new(Segment::ChurnRisk, None, Some(6)),
            ],
        }
    }

    /// Build a table, keeping rule order; rejects tables with coverage gaps
    pub fn from_rules(rules: Vec<SegmentRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(RfmError::InvalidRules("rule table is empty".to_string()));
        }

        let table = SegmentRules { rules };
        let uncovered: Vec<u8> = (MIN_RFM_SCORE..=MAX_RFM_SCORE)
            .filter(|score| table.find(*score).is_none())
            .collect();

        if !uncovered.is_empty() {
            return Err(RfmError::InvalidRules(format!(
                "scores {:?} match no rule",
                uncovered
            )));
        }

        Ok(table)
    }

    /// Load rules from a JSON array
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let rules: Vec<SegmentRule> = serde_json::from_str(&content)?;

        tracing::debug!(path = %path.as_ref().display(), rules = rules.len(), "segment rules loaded");
        SegmentRules::from_rules(rules)
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    fn find(&self, rfm_score: u8) -> Option<&SegmentRule> {
        self.rules.iter().find(|rule| rule.matches(rfm_score))
    }

    /// Segment for a composite score
    pub fn classify_score(&self, rfm_score: u8) -> Segment {
        // Tables are validated over 3..=15; scores outside that range cannot
        // come out of the scorer.
        self.find(rfm_score)
            .map(|rule| rule.segment)
            .unwrap_or(Segment::ChurnRisk)
    }

    pub fn classify(&self, scored: &ScoredMetrics) -> Segment {
        self.classify_score(scored.rfm_score)
    }

    /// Attach a segment to every scored customer
    pub fn classify_all(&self, scored: Vec<ScoredMetrics>) -> Vec<SegmentedCustomer> {
        scored
            .into_iter()
            .map(|s| {
                let segment = self.classify(&s);
                SegmentedCustomer { scored: s, segment }
            })
            .collect()
    }
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self::standard()
    }
}

/// Classify against the standard table
pub fn classify(scored: &ScoredMetrics) -> Segment {
    static STANDARD: OnceLock<SegmentRules> = OnceLock::new();
    STANDARD.get_or_init(SegmentRules::standard).classify(scored)
}

// ============================================================================
// SEGMENTED CUSTOMER
// ============================================================================

/// Terminal record of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedCustomer {
    pub scored: ScoredMetrics,
    pub segment: Segment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::CustomerMetrics;
    use crate::ledger::CustomerId;

    fn scored(r: u8, f: u8, m: u8) -> ScoredMetrics {
        let metrics = CustomerMetrics {
            customer_id: CustomerId::parse("17850").unwrap(),
            recency_days: 1,
            frequency: 1,
            monetary: 1.0,
        };
        ScoredMetrics::new(metrics, r, f, m)
    }

    #[test]
    fn test_standard_boundaries() {
        let rules = SegmentRules::standard();

        assert_eq!(rules.classify_score(15), Segment::LoyalCustomer);
        assert_eq!(rules.classify_score(12), Segment::LoyalCustomer);
        assert_eq!(rules.classify_score(11), Segment::PotentialLoyalist);
        assert_eq!(rules.classify_score(9), Segment::PotentialLoyalist);
        assert_eq!(rules.classify_score(8), Segment::AtRisk);
        assert_eq!(rules.classify_score(6), Segment::AtRisk);
        assert_eq!(rules.classify_score(5), Segment::ChurnRisk);
        assert_eq!(rules.classify_score(3), Segment::ChurnRisk);
    }

    #[test]
    fn test_every_score_maps_to_exactly_one_rule() {
        let rules = SegmentRules::standard();

        for score in MIN_RFM_SCORE..=MAX_RFM_SCORE {
            let matching = rules.rules().iter().filter(|r| r.matches(score)).count();
            assert_eq!(matching, 1, "score {}", score);
        }
    }

    #[test]
    fn test_classify_uses_composite_score() {
        assert_eq!(classify(&scored(5, 4, 3)), Segment::LoyalCustomer);
        assert_eq!(classify(&scored(1, 1, 3)), Segment::ChurnRisk);
        assert_eq!(classify(&scored(3, 3, 3)), Segment::PotentialLoyalist);
        assert_eq!(classify(&scored(2, 2, 2)), Segment::AtRisk);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = SegmentRules::from_rules(vec![
            SegmentRule::new(Segment::LoyalCustomer, Some(10), None),
            // overlaps the rule above; never reached for 10..
            SegmentRule::new(Segment::AtRisk, Some(8), None),
            SegmentRule::new(Segment::ChurnRisk, None, None),
        ])
        .unwrap();

        assert_eq!(rules.classify_score(10), Segment::LoyalCustomer);
        assert_eq!(rules.classify_score(9), Segment::AtRisk);
        assert_eq!(rules.classify_score(4), Segment::ChurnRisk);
    }

    #[test]
    fn test_gap_in_table_is_rejected() {
        let result = SegmentRules::from_rules(vec![
            SegmentRule::new(Segment::LoyalCustomer, Some(12), None),
            SegmentRule::new(Segment::ChurnRisk, None, Some(6)),
        ]);

        match result {
            Err(RfmError::InvalidRules(msg)) => assert!(msg.contains("[6, 7, 8, 9, 10, 11]")),
            other => panic!("expected InvalidRules, got {:?}", other),
        }

        assert!(SegmentRules::from_rules(vec![]).is_err());
    }

    #[test]
    fn test_rules_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.json");
        fs::write(
            &path,
            r#"[
                {"segment": "Loyal Customer", "min_score": 13},
                {"segment": "Potential Loyalist", "min_score": 10, "max_score": 13},
                {"segment": "At Risk", "min_score": 7, "max_score": 10, "description": "slipping"},
                {"segment": "Churn Risk"}
            ]"#,
        )
        .unwrap();

        let rules = SegmentRules::from_file(&path).unwrap();

        assert_eq!(rules.rules().len(), 4);
        assert_eq!(rules.classify_score(12), Segment::PotentialLoyalist);
        assert_eq!(rules.classify_score(13), Segment::LoyalCustomer);
        assert_eq!(rules.classify_score(6), Segment::ChurnRisk);
    }

    #[test]
    fn test_segment_labels_round_trip() {
        for segment in Segment::ALL {
            assert_eq!(segment.label().parse::<Segment>().unwrap(), segment);
        }
        assert!("VIP".parse::<Segment>().is_err());
        assert_eq!(
            serde_json::to_string(&Segment::PotentialLoyalist).unwrap(),
            "\"Potential Loyalist\""
        );
    }
}

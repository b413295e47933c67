// 🔗 Pipeline - normalize -> aggregate -> score -> classify
// Full barrier between stages; either every stage succeeds or nothing is
// returned.

use crate::aggregator::aggregate;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ledger::TransactionRecord;
use crate::normalizer::{normalize_with_stats, DateParser, NormalizeStats};
use crate::scoring::{DegeneratePolicy, QuintileModel};
use crate::segments::{SegmentRules, SegmentedCustomer};
use chrono::NaiveDateTime;

/// Everything a run produces
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub reference_date: NaiveDateTime,
    pub normalize_stats: NormalizeStats,
    pub model: QuintileModel,
    /// One per customer, ordered by customer id
    pub customers: Vec<SegmentedCustomer>,
}

pub struct Pipeline {
    dates: DateParser,
    policy: DegeneratePolicy,
    rules: SegmentRules,
}

impl Pipeline {
    pub fn new(dates: DateParser, policy: DegeneratePolicy, rules: SegmentRules) -> Self {
        Pipeline {
            dates,
            policy,
            rules,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Pipeline::new(
            config.date_parser(),
            config.degenerate_policy,
            config.load_rules()?,
        ))
    }

    pub fn rules(&self) -> &SegmentRules {
        &self.rules
    }

    pub fn run(&self, records: &[TransactionRecord]) -> Result<PipelineOutput> {
        let (cleaned, normalize_stats) = normalize_with_stats(records, &self.dates)?;

        let aggregation = aggregate(&cleaned)?;
        drop(cleaned);

        let model = QuintileModel::fit(&aggregation.metrics, self.policy)?;
        let scored = model.apply(&aggregation.metrics)?;
        let customers = self.rules.classify_all(scored);

        tracing::info!(
            customers = customers.len(),
            degenerate = ?model.degenerate_metrics(),
            "customers scored and segmented"
        );

        Ok(PipelineOutput {
            reference_date: aggregation.reference_date,
            normalize_stats,
            model,
            customers,
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new(
            DateParser::default(),
            DegeneratePolicy::default(),
            SegmentRules::standard(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RfmError, Stage};
    use crate::segments::Segment;

    fn record(customer: Option<&str>, date: &str, quantity: i64, price: f64) -> TransactionRecord {
        TransactionRecord::new(customer, "inv", date, quantity, price, 2)
    }

    #[test]
    fn test_end_to_end_three_customers() {
        let records = vec![
            // customer 1: bought yesterday relative to the cutoff, 2 lines
            record(Some("1"), "2011-12-09 10:00:00", 10, 50.0),
            record(Some("1"), "2011-12-08 10:00:00", 10, 50.0),
            // customer 2: long gone
            record(Some("2"), "2011-02-12 10:00:00", 1, 10.0),
            // customer 3: in between
            record(Some("3"), "2011-11-10 10:00:00", 5, 60.0),
            record(None, "2011-12-09 11:00:00", 1, 1.0),
        ];

        let output = Pipeline::default().run(&records).unwrap();

        assert_eq!(output.normalize_stats.missing_customer, 1);
        assert_eq!(output.customers.len(), 3);

        let segments: Vec<Segment> = output.customers.iter().map(|c| c.segment).collect();
        assert_eq!(
            segments,
            vec![Segment::LoyalCustomer, Segment::ChurnRisk, Segment::PotentialLoyalist]
        );
        assert_eq!(output.customers[0].scored.metrics.recency_days, 1);
    }

    #[test]
    fn test_all_guest_lines_is_empty_population() {
        let records = vec![record(None, "2011-12-09 10:00:00", 1, 1.0)];

        let err = Pipeline::default().run(&records).unwrap_err();
        assert!(matches!(
            err,
            RfmError::EmptyPopulation {
                stage: Stage::Aggregate,
                ..
            }
        ));
    }

    #[test]
    fn test_reject_policy_produces_no_output() {
        let pipeline = Pipeline::new(
            DateParser::default(),
            DegeneratePolicy::Reject,
            SegmentRules::standard(),
        );
        let records = vec![record(Some("1"), "2011-12-09 10:00:00", 1, 1.0)];

        assert!(matches!(
            pipeline.run(&records),
            Err(RfmError::DegenerateDistribution { .. })
        ));
    }
}

// 📈 Segment Report
// Count per segment, share of the population, and the five-number summary
// of each RFM metric inside each segment (the data behind a box plot).

use crate::scoring::Metric;
use crate::segments::{Segment, SegmentedCustomer};
use serde::{Deserialize, Serialize};

// ============================================================================
// DISTRIBUTION SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

impl FiveNumberSummary {
    /// `None` for an empty sample
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(FiveNumberSummary {
            min: sorted[0],
            q1: percentile(&sorted, 0.25),
            median: percentile(&sorted, 0.5),
            q3: percentile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCount {
    pub segment: Segment,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDistribution {
    pub segment: Segment,
    pub recency: FiveNumberSummary,
    pub frequency: FiveNumberSummary,
    pub monetary: FiveNumberSummary,
}

impl SegmentDistribution {
    pub fn metric(&self, metric: Metric) -> &FiveNumberSummary {
        match metric {
            Metric::Recency => &self.recency,
            Metric::Frequency => &self.frequency,
            Metric::Monetary => &self.monetary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub total_customers: usize,
    /// Largest segment first; equal counts keep segment order.
    /// Segments with no customers are listed with a zero count.
    pub counts: Vec<SegmentCount>,
    /// Only segments that have customers, in segment order
    pub distributions: Vec<SegmentDistribution>,
}

impl SegmentReport {
    pub fn build(customers: &[SegmentedCustomer]) -> Self {
        let total_customers = customers.len();

        let mut counts: Vec<SegmentCount> = Segment::ALL
            .iter()
            .map(|segment| {
                let count = customers.iter().filter(|c| c.segment == *segment).count();
                let percentage = if total_customers == 0 {
                    0.0
                } else {
                    count as f64 / total_customers as f64 * 100.0
                };
                SegmentCount {
                    segment: *segment,
                    count,
                    percentage,
                }
            })
            .collect();
        // stable sort keeps segment order for ties
        counts.sort_by(|a, b| b.count.cmp(&a.count));

        let distributions = Segment::ALL
            .iter()
            .filter_map(|segment| {
                let members: Vec<&SegmentedCustomer> =
                    customers.iter().filter(|c| c.segment == *segment).collect();
                let summarize = |metric: Metric| {
                    let values: Vec<f64> = members.iter().map(|c| metric.value(&c.scored.metrics)).collect();
                    FiveNumberSummary::from_values(&values)
                };

                Some(SegmentDistribution {
                    segment: *segment,
                    recency: summarize(Metric::Recency)?,
                    frequency: summarize(Metric::Frequency)?,
                    monetary: summarize(Metric::Monetary)?,
                })
            })
            .collect();

        SegmentReport {
            total_customers,
            counts,
            distributions,
        }
    }

    pub fn count(&self, segment: Segment) -> usize {
        self.counts
            .iter()
            .find(|c| c.segment == segment)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    pub fn distribution(&self, segment: Segment) -> Option<&SegmentDistribution> {
        self.distributions.iter().find(|d| d.segment == segment)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Console rendering
    pub fn print(&self) {
        println!("\n=== Segment Distribution ===");
        println!("Total customers: {}", self.total_customers);
        for c in &self.counts {
            println!(
                "  {:<20} {:>7} ({:>5.1}%)  {}",
                c.segment.label(),
                c.count,
                c.percentage,
                bar(c.percentage)
            );
        }

        for metric in Metric::ALL {
            println!("\n{} by segment:", metric.name());
            println!(
                "  {:<20} {:>10} {:>10} {:>10} {:>10} {:>10}",
                "Segment", "min", "Q1", "median", "Q3", "max"
            );
            for d in &self.distributions {
                let s = d.metric(metric);
                println!(
                    "  {:<20} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
                    d.segment.label(),
                    s.min,
                    s.q1,
                    s.median,
                    s.q3,
                    s.max
                );
            }
        }
    }
}

fn bar(percentage: f64) -> String {
    "█".repeat((percentage / 2.0).round() as usize)
}

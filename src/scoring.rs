// 🎯 RFM Scorer - quintile binning over the whole customer population
//
// Binning is a separate, first-class step: `QuintileModel::fit` looks at the
// entire population once and returns the boundary set of every metric;
// `QuintileModel::apply` turns those boundaries into per-customer scores.
//
// Ties never make the cut points degenerate. Each metric is ranked 1..n by
// (value, customer order) and the ranks are cut into quintiles, so equal
// values are split across adjacent bins in customer-id order.

use crate::aggregator::CustomerMetrics;
use crate::error::{Result, RfmError, Stage};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Number of quantile bins per metric
pub const BIN_COUNT: u8 = 5;

// ============================================================================
// METRICS & POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Recency,
    Frequency,
    Monetary,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Recency, Metric::Frequency, Metric::Monetary];

    pub fn name(&self) -> &str {
        match self {
            Metric::Recency => "Recency",
            Metric::Frequency => "Frequency",
            Metric::Monetary => "Monetary",
        }
    }

    pub fn value(&self, metrics: &CustomerMetrics) -> f64 {
        match self {
            Metric::Recency => metrics.recency_days as f64,
            Metric::Frequency => metrics.frequency as f64,
            Metric::Monetary => metrics.monetary,
        }
    }

    /// Map a value-ordered bin (1 = lowest values) to a score.
    /// Fewer days since the last purchase is better, so recency is inverted.
    pub fn score_for_bin(&self, bin: u8) -> u8 {
        match self {
            Metric::Recency => BIN_COUNT + 1 - bin,
            Metric::Frequency | Metric::Monetary => bin,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do when a metric has fewer than 5 distinct values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Bin by tie-broken rank anyway; equal values spread over adjacent bins
    #[default]
    Spread,
    /// Fail the run with `DegenerateDistribution`
    Reject,
}

// ============================================================================
// BIN BOUNDARIES
// ============================================================================

/// One non-empty bin of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinBoundary {
    /// Value-ordered bin, 1 = lowest values
    pub bin: u8,
    /// Score customers in this bin receive
    pub score: u8,
    pub first_rank: usize,
    pub last_rank: usize,
    pub min_value: f64,
    pub max_value: f64,
}

impl BinBoundary {
    pub fn size(&self) -> usize {
        self.last_rank - self.first_rank + 1
    }
}

/// Bin-boundary set of one metric over one population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBins {
    pub metric: Metric,
    pub population: usize,
    pub distinct_values: usize,
    /// Fewer than 5 distinct values; scores come from the tie-break alone
    pub degenerate: bool,
    /// Non-empty bins, lowest values first
    pub bins: Vec<BinBoundary>,
    /// 1-based tie-broken rank of each customer, in population order
    ranks: Vec<usize>,
}

impl MetricBins {
    /// Rank and bin one metric over the whole population.
    ///
    /// `values` must be in the population's stable order (customer id
    /// ascending); that order breaks ties.
    pub fn fit(metric: Metric, values: &[f64], policy: DegeneratePolicy) -> Result<MetricBins> {
        let population = values.len();
        if population == 0 {
            return Err(RfmError::empty(
                Stage::Score,
                format!("no customers to bin on {}", metric),
            ));
        }

        // -0.0 and 0.0 are one value: total_cmp would split them
        let values: Vec<f64> = values.iter().map(|v| v + 0.0).collect();

        let mut order: Vec<usize> = (0..population).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));

        let distinct_values = 1 + order
            .windows(2)
            .filter(|pair| values[pair[0]].total_cmp(&values[pair[1]]) != Ordering::Equal)
            .count();

        let degenerate = distinct_values < BIN_COUNT as usize;
        if degenerate {
            match policy {
                DegeneratePolicy::Reject => {
                    return Err(RfmError::DegenerateDistribution {
                        metric,
                        distinct_values,
                    });
                }
                DegeneratePolicy::Spread => {
                    tracing::warn!(
                        metric = %metric,
                        distinct_values,
                        population,
                        "fewer than 5 distinct values, binning by tie-broken rank"
                    );
                }
            }
        }

        let mut ranks = vec![0; population];
        for (position, &index) in order.iter().enumerate() {
            ranks[index] = position + 1;
        }

        let mut bins: Vec<BinBoundary> = Vec::new();
        for (position, &index) in order.iter().enumerate() {
            let rank = position + 1;
            let bin = bin_for_rank(rank, population);
            let value = values[index];

            match bins.last_mut() {
                Some(current) if current.bin == bin => {
                    current.last_rank = rank;
                    current.max_value = value;
                }
                _ => bins.push(BinBoundary {
                    bin,
                    score: metric.score_for_bin(bin),
                    first_rank: rank,
                    last_rank: rank,
                    min_value: value,
                    max_value: value,
                }),
            }
        }

        Ok(MetricBins {
            metric,
            population,
            distinct_values,
            degenerate,
            bins,
            ranks,
        })
    }

    /// Tie-broken rank of the customer at `index`
    pub fn rank_of(&self, index: usize) -> Option<usize> {
        self.ranks.get(index).copied()
    }

    /// Score of the customer at `index` in the fitted population
    pub fn score_of(&self, index: usize) -> Option<u8> {
        self.rank_of(index)
            .map(|rank| self.metric.score_for_bin(bin_for_rank(rank, self.population)))
    }
}

/// Quintile of a 1-based rank among `population` ranks.
///
/// Same cut as quantile-binning the ranks 1..=n with linearly interpolated
/// edges, right-closed bins and the lowest edge included:
/// `bin = max(1, ceil(5 * (rank - 1) / (n - 1)))`, in exact integer math.
/// A population of one has no spread and sits in the middle bin.
pub fn bin_for_rank(rank: usize, population: usize) -> u8 {
    if population <= 1 {
        return BIN_COUNT.div_ceil(2);
    }

    let numerator = BIN_COUNT as usize * (rank - 1);
    let denominator = population - 1;
    let bin = numerator.div_ceil(denominator).clamp(1, BIN_COUNT as usize);
    bin as u8
}

// ============================================================================
// QUINTILE MODEL
// ============================================================================

/// Bin-boundary sets for all three metrics over one population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuintileModel {
    pub recency: MetricBins,
    pub frequency: MetricBins,
    pub monetary: MetricBins,
}

impl QuintileModel {
    pub fn fit(metrics: &[CustomerMetrics], policy: DegeneratePolicy) -> Result<QuintileModel> {
        let fit_metric = |metric: Metric| {
            let values: Vec<f64> = metrics.iter().map(|m| metric.value(m)).collect();
            MetricBins::fit(metric, &values, policy)
        };

        Ok(QuintileModel {
            recency: fit_metric(Metric::Recency)?,
            frequency: fit_metric(Metric::Frequency)?,
            monetary: fit_metric(Metric::Monetary)?,
        })
    }

    pub fn population(&self) -> usize {
        self.recency.population
    }

    pub fn bins(&self, metric: Metric) -> &MetricBins {
        match metric {
            Metric::Recency => &self.recency,
            Metric::Frequency => &self.frequency,
            Metric::Monetary => &self.monetary,
        }
    }

    pub fn degenerate_metrics(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| self.bins(*m).degenerate)
            .collect()
    }

    /// Score the population this model was fitted on
    pub fn apply(&self, metrics: &[CustomerMetrics]) -> Result<Vec<ScoredMetrics>> {
        if metrics.len() != self.population() {
            return Err(RfmError::PopulationMismatch {
                expected: self.population(),
                actual: metrics.len(),
            });
        }

        let score = |bins: &MetricBins, index: usize| {
            bins.score_of(index).ok_or(RfmError::PopulationMismatch {
                expected: bins.population,
                actual: metrics.len(),
            })
        };

        let mut scored = Vec::with_capacity(metrics.len());
        for (index, m) in metrics.iter().enumerate() {
            scored.push(ScoredMetrics::new(
                m.clone(),
                score(&self.recency, index)?,
                score(&self.frequency, index)?,
                score(&self.monetary, index)?,
            ));
        }

        Ok(scored)
    }
}

// ============================================================================
// SCORED METRICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMetrics {
    pub metrics: CustomerMetrics,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    /// R, F, M digits in that order, e.g. "543"
    pub rfm_segment_code: String,
    /// r + f + m, 3..=15
    pub rfm_score: u8,
}

impl ScoredMetrics {
    pub fn new(metrics: CustomerMetrics, r_score: u8, f_score: u8, m_score: u8) -> Self {
        ScoredMetrics {
            metrics,
            r_score,
            f_score,
            m_score,
            rfm_segment_code: format!("{}{}{}", r_score, f_score, m_score),
            rfm_score: r_score + f_score + m_score,
        }
    }
}

/// Fit and apply in one go
pub fn score(metrics: &[CustomerMetrics], policy: DegeneratePolicy) -> Result<Vec<ScoredMetrics>> {
    let model = QuintileModel::fit(metrics, policy)?;
    model.apply(metrics)
}

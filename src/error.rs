// ⚠️ Error taxonomy for the RFM pipeline
// Every fatal error names the stage (and field, when there is one) it came from.

use crate::scoring::Metric;
use std::fmt;
use thiserror::Error;

/// Pipeline stage an error originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Normalize,
    Aggregate,
    Score,
    Classify,
    Export,
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::Read => "read",
            Stage::Normalize => "normalize",
            Stage::Aggregate => "aggregate",
            Stage::Score => "score",
            Stage::Classify => "classify",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum RfmError {
    /// Unparseable timestamp, non-numeric quantity/price or unreadable row.
    #[error("malformed input during {stage} at line {line}, field `{field}`: {reason} (value: {value:?})")]
    MalformedInput {
        stage: Stage,
        line: usize,
        field: &'static str,
        value: String,
        reason: String,
    },

    /// Nothing left to aggregate or score.
    #[error("empty population during {stage}: {detail}")]
    EmptyPopulation { stage: Stage, detail: String },

    /// Fewer than 5 distinct values for a metric under the `reject` policy.
    #[error("degenerate {metric} distribution: {distinct_values} distinct value(s), quintile binning needs at least 5")]
    DegenerateDistribution {
        metric: Metric,
        distinct_values: usize,
    },

    #[error("quintile model was fitted on {expected} customers but asked to score {actual}")]
    PopulationMismatch { expected: usize, actual: usize },

    #[error("invalid segment rules: {0}")]
    InvalidRules(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RfmError {
    pub fn malformed(
        stage: Stage,
        line: usize,
        field: &'static str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        RfmError::MalformedInput {
            stage,
            line,
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn empty(stage: Stage, detail: impl Into<String>) -> Self {
        RfmError::EmptyPopulation {
            stage,
            detail: detail.into(),
        }
    }

    /// Stage the error is attributed to, if it belongs to the core pipeline
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RfmError::MalformedInput { stage, .. } | RfmError::EmptyPopulation { stage, .. } => {
                Some(*stage)
            }
            RfmError::DegenerateDistribution { .. } | RfmError::PopulationMismatch { .. } => {
                Some(Stage::Score)
            }
            RfmError::InvalidRules(_) => Some(Stage::Classify),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RfmError>;

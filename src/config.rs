// ⚙️ Pipeline configuration
// JSON-loadable; every field has a default so an empty object `{}` is valid.

use crate::error::Result;
use crate::normalizer::{DateParser, DEFAULT_DATE_FORMATS};
use crate::scoring::DegeneratePolicy;
use crate::segments::SegmentRules;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// chrono layouts for invoice timestamps, tried after RFC 3339
    pub date_formats: Vec<String>,

    pub degenerate_policy: DegeneratePolicy,

    /// JSON segment table; the standard table when absent
    pub segment_rules: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
            degenerate_policy: DegeneratePolicy::default(),
            segment_rules: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn date_parser(&self) -> DateParser {
        DateParser::with_formats(self.date_formats.clone())
    }

    pub fn load_rules(&self) -> Result<SegmentRules> {
        match &self.segment_rules {
            Some(path) => SegmentRules::from_file(path),
            None => Ok(SegmentRules::standard()),
        }
    }
}

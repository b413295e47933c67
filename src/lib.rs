// RFM Segmentation - Core Library
// Ledger -> per-customer Recency/Frequency/Monetary -> quintile scores -> segments.
// Exposes all modules for use in the CLI and tests.

pub mod error;
pub mod ledger;         // CSV ledger reader
pub mod normalizer;     // Ledger Normalizer
pub mod aggregator;     // Customer Aggregator
pub mod scoring;        // RFM Scorer (quintile model)
pub mod segments;       // Segment Classifier
pub mod pipeline;
pub mod config;
pub mod export;         // CSV export contract + fingerprint
pub mod report;         // Segment counts and distributions
pub mod db;             // SQLite run store
pub mod publish;        // Staged run artifacts

// Re-export commonly used types
pub use error::{Result, RfmError, Stage};
pub use ledger::{CsvLedgerReader, CustomerId, LedgerReader, TransactionRecord};
pub use normalizer::{normalize, normalize_with_stats, CleanedRecord, DateParser, NormalizeStats};
pub use aggregator::{aggregate, Aggregation, CustomerMetrics};
pub use scoring::{
    bin_for_rank, score, BinBoundary, DegeneratePolicy, Metric, MetricBins, QuintileModel, ScoredMetrics,
};
pub use segments::{classify, Segment, SegmentRule, SegmentRules, SegmentedCustomer};
pub use pipeline::{Pipeline, PipelineOutput};
pub use config::PipelineConfig;
pub use export::{export_csv, fingerprint, load_segments, read_segments, to_csv_bytes, write_segments};
pub use report::{FiveNumberSummary, SegmentCount, SegmentDistribution, SegmentReport};
pub use publish::{publish, Published, RunTargets};
pub use db::{
    RunInsert, RunRecord,
    setup_database, insert_run, latest_run, list_runs, get_run_customers, count_runs,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

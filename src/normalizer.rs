// 🧹 Ledger Normalizer
// Raw ledger lines -> analysis-ready rows.
// Guest lines (no customer) are filtered silently; a bad timestamp on a
// surviving line fails the run because it anchors the reference date.

use crate::error::{Result, RfmError, Stage};
use crate::ledger::{CustomerId, TransactionRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ============================================================================
// TIMESTAMP FORMATS
// ============================================================================

/// Datetime layouts tried in order after RFC 3339.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Parses invoice timestamps into naive UTC datetimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateParser {
    formats: Vec<String>,
}

impl DateParser {
    pub fn new() -> Self {
        DateParser::with_formats(DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect())
    }

    pub fn with_formats(formats: Vec<String>) -> Self {
        DateParser { formats }
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// Returns `None` when no known layout matches
    ///
    /// Offsets are converted to UTC and dropped; a bare `YYYY-MM-DD` means
    /// midnight.
    pub fn parse(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }

        for format in &self.formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(dt);
            }
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

impl Default for DateParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CLEANED RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub customer_id: CustomerId,
    pub invoice_id: String,
    pub invoice_date: NaiveDateTime,
    pub quantity: i64,
    pub unit_price: f64,

    /// `quantity * unit_price`, negative for returns
    pub line_amount: f64,

    /// Source line of the raw record
    pub line_number: usize,
}

/// Counts describing what the normalizer kept and dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub missing_customer: usize,
    pub returns: usize,
}

// ============================================================================
// NORMALIZE
// ============================================================================

/// Clean raw records; see [`normalize_with_stats`] for the drop counts.
pub fn normalize(records: &[TransactionRecord], dates: &DateParser) -> Result<Vec<CleanedRecord>> {
    normalize_with_stats(records, dates).map(|(cleaned, _)| cleaned)
}

pub fn normalize_with_stats(
    records: &[TransactionRecord],
    dates: &DateParser,
) -> Result<(Vec<CleanedRecord>, NormalizeStats)> {
    let mut stats = NormalizeStats {
        rows_read: records.len(),
        ..NormalizeStats::default()
    };
    let mut cleaned = Vec::with_capacity(records.len());

    for record in records {
        let Some(customer_id) = record.customer_id.clone() else {
            stats.missing_customer += 1;
            tracing::debug!(line = record.line_number, invoice = %record.invoice_id, "dropping line without customer id");
            continue;
        };

        let invoice_date = dates.parse(&record.invoice_date).ok_or_else(|| {
            RfmError::malformed(
                Stage::Normalize,
                record.line_number,
                "InvoiceDate",
                &record.invoice_date,
                "unrecognised timestamp",
            )
        })?;

        // + 0.0 folds the -0.0 of a zero quantity at a negative price
        let line_amount = record.quantity as f64 * record.unit_price + 0.0;
        if !line_amount.is_finite() {
            return Err(RfmError::malformed(
                Stage::Normalize,
                record.line_number,
                "UnitPrice",
                &record.unit_price.to_string(),
                format!("line amount of {} units overflows", record.quantity),
            ));
        }
        if line_amount < 0.0 {
            stats.returns += 1;
        }

        cleaned.push(CleanedRecord {
            customer_id,
            invoice_id: record.invoice_id.clone(),
            invoice_date,
            quantity: record.quantity,
            unit_price: record.unit_price,
            line_amount,
            line_number: record.line_number,
        });
    }

    stats.rows_kept = cleaned.len();
    tracing::info!(
        rows_read = stats.rows_read,
        rows_kept = stats.rows_kept,
        missing_customer = stats.missing_customer,
        "ledger normalized"
    );

    Ok((cleaned, stats))
}

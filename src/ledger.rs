// 📒 Ledger Reader - CSV transaction source
// Turns a sales ledger (Online Retail layout) into TransactionRecords.
// No decision logic lives here: numeric fields are parsed, identifiers are
// canonicalised, everything else is carried through untouched.

use crate::error::{Result, RfmError, Stage};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

// ============================================================================
// CUSTOMER IDENTITY
// ============================================================================

/// Customer identifier as found in the ledger.
///
/// Ordering is numeric for numeric ids (so `"9999" < "12345"`), numeric ids
/// sort before non-numeric ones, and the raw text breaks any remaining tie.
/// This order is the stable tie-break order used by the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    /// Canonicalise a raw identifier; `None` when the ledger has no customer
    ///
    /// Missing markers: empty text, `NaN`, `null`, `None` (any case).
    /// Spreadsheet exports write integer ids as `17850.0`; the `.0` is dropped.
    pub fn parse(raw: &str) -> Option<CustomerId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let lower = trimmed.to_lowercase();
        if lower == "nan" || lower == "null" || lower == "none" {
            return None;
        }

        let canonical = match trimmed.strip_suffix(".0") {
            Some(integral) if !integral.is_empty() && integral.bytes().all(|b| b.is_ascii_digit()) => {
                integral
            }
            _ => trimmed,
        };

        Some(CustomerId(canonical.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u128> {
        self.0.parse().ok()
    }
}

impl Ord for CustomerId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CustomerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One raw ledger line
///
/// `invoice_date` is kept as the source text; the normalizer owns timestamp
/// parsing because a bad date only matters for lines that survive the
/// customer filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub customer_id: Option<CustomerId>,
    pub invoice_id: String,
    pub invoice_date: String,
    pub quantity: i64,
    pub unit_price: f64,

    /// 1-based line in the source, header included
    pub line_number: usize,
}

impl TransactionRecord {
    pub fn new(
        customer_id: Option<&str>,
        invoice_id: &str,
        invoice_date: &str,
        quantity: i64,
        unit_price: f64,
        line_number: usize,
    ) -> Self {
        TransactionRecord {
            customer_id: customer_id.and_then(CustomerId::parse),
            invoice_id: invoice_id.to_string(),
            invoice_date: invoice_date.to_string(),
            quantity,
            unit_price,
            line_number,
        }
    }
}

/// Columns a ledger must carry, each with its accepted spellings
const REQUIRED_COLUMNS: [(&str, &[&str]); 5] = [
    ("CustomerID", &["CustomerID", "Customer ID", "customer_id"]),
    ("InvoiceNo", &["InvoiceNo", "Invoice", "invoice_id"]),
    ("InvoiceDate", &["InvoiceDate", "invoice_date"]),
    ("Quantity", &["Quantity", "quantity"]),
    ("UnitPrice", &["UnitPrice", "Price", "unit_price"]),
];

/// Row shape of the CSV source. Column aliases cover the two public
/// releases of the Online Retail data set and snake_case exports.
#[derive(Debug, Deserialize)]
struct LedgerRow {
    #[serde(rename = "CustomerID", alias = "Customer ID", alias = "customer_id", default)]
    customer_id: Option<String>,

    #[serde(rename = "InvoiceNo", alias = "Invoice", alias = "invoice_id", default)]
    invoice_id: Option<String>,

    #[serde(rename = "InvoiceDate", alias = "invoice_date", default)]
    invoice_date: Option<String>,

    #[serde(rename = "Quantity", alias = "quantity", default)]
    quantity: Option<String>,

    #[serde(rename = "UnitPrice", alias = "Price", alias = "unit_price", default)]
    unit_price: Option<String>,
}

// ============================================================================
// READER TRAIT
// ============================================================================

/// LedgerReader - one implementation per source medium
pub trait LedgerReader {
    /// Read every line of the source into TransactionRecords
    fn read_path(&self, path: &Path) -> Result<Vec<TransactionRecord>>;

    /// Short name for logs
    fn format(&self) -> &str;
}

/// Comma-separated ledger with a header row
pub struct CsvLedgerReader {
    delimiter: u8,
}

impl CsvLedgerReader {
    pub fn new() -> Self {
        CsvLedgerReader { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        CsvLedgerReader { delimiter }
    }

    /// Parse from any reader (files, in-memory buffers in tests)
    pub fn read_from<R: Read>(&self, source: R) -> Result<Vec<TransactionRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        check_header(&headers)?;

        let mut records = Vec::new();
        // line of the previous record, for errors that carry no position
        let mut last_line = 1;

        for result in reader.records() {
            let raw = result.map_err(|e| {
                let line = e.position().map_or(last_line + 1, |p| p.line() as usize);
                RfmError::malformed(Stage::Read, line, "row", "", format!("unreadable CSV row: {}", e))
            })?;
            // quoted fields may span lines, so count from the record start
            let line = raw.position().map_or(last_line + 1, |p| p.line() as usize);
            last_line = line;

            let row: LedgerRow = raw.deserialize(Some(&headers)).map_err(|e| {
                RfmError::malformed(Stage::Read, line, "row", "", format!("unreadable CSV row: {}", e))
            })?;

            records.push(parse_row(row, line)?);
        }

        tracing::debug!(rows = records.len(), "ledger rows read");
        Ok(records)
    }
}

impl Default for CsvLedgerReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerReader for CsvLedgerReader {
    fn read_path(&self, path: &Path) -> Result<Vec<TransactionRecord>> {
        let file = File::open(path)?;
        self.read_from(file)
    }

    fn format(&self) -> &str {
        "csv"
    }
}

// ============================================================================
// FIELD PARSING
// ============================================================================

fn check_header(headers: &csv::StringRecord) -> Result<()> {
    for (column, spellings) in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| spellings.contains(&h)) {
            return Err(RfmError::malformed(
                Stage::Read,
                1,
                "header",
                &headers.iter().collect::<Vec<_>>().join(","),
                format!("missing column {}", column),
            ));
        }
    }
    Ok(())
}

fn parse_row(row: LedgerRow, line: usize) -> Result<TransactionRecord> {
    let quantity_raw = row.quantity.unwrap_or_default();
    let price_raw = row.unit_price.unwrap_or_default();

    Ok(TransactionRecord {
        customer_id: row.customer_id.as_deref().and_then(CustomerId::parse),
        invoice_id: row.invoice_id.unwrap_or_default(),
        invoice_date: row.invoice_date.unwrap_or_default(),
        quantity: parse_quantity(&quantity_raw, line)?,
        unit_price: parse_unit_price(&price_raw, line)?,
        line_number: line,
    })
}

/// Quantities are whole numbers; `6.0` is accepted, `6.5` is not.
fn parse_quantity(raw: &str, line: usize) -> Result<i64> {
    if raw.is_empty() {
        return Err(RfmError::malformed(Stage::Read, line, "Quantity", raw, "missing value"));
    }

    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }

    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    let range = i64::MIN as f64..i64::MAX as f64;

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && range.contains(&value) => {
            Ok(value as i64)
        }
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Err(RfmError::malformed(
            Stage::Read,
            line,
            "Quantity",
            raw,
            "outside the 64-bit integer range",
        )),
        Ok(_) => Err(RfmError::malformed(Stage::Read, line, "Quantity", raw, "not a whole number")),
        Err(_) => Err(RfmError::malformed(Stage::Read, line, "Quantity", raw, "not numeric")),
    }
}

fn parse_unit_price(raw: &str, line: usize) -> Result<f64> {
    if raw.is_empty() {
        return Err(RfmError::malformed(Stage::Read, line, "UnitPrice", raw, "missing value"));
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(RfmError::malformed(Stage::Read, line, "UnitPrice", raw, "not finite")),
        Err(_) => Err(RfmError::malformed(Stage::Read, line, "UnitPrice", raw, "not numeric")),
    }
}

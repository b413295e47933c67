// 📊 Customer Aggregator
// Collapses cleaned ledger lines into one Recency/Frequency/Monetary triple
// per customer, measured against a single global reference date.

use crate::error::{Result, RfmError, Stage};
use crate::ledger::CustomerId;
use crate::normalizer::CleanedRecord;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub customer_id: CustomerId,

    /// Whole days between the reference date and the last invoice
    pub recency_days: i64,

    /// Number of ledger lines, returns included
    pub frequency: usize,

    /// Sum of line amounts; negative when returns dominate
    pub monetary: f64,
}

/// Result of the aggregation stage
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// `max(invoice_date) + 1 day` over every cleaned record
    pub reference_date: NaiveDateTime,

    /// One entry per customer, ordered by customer id
    pub metrics: Vec<CustomerMetrics>,
}

/// Running totals while grouping
struct Accumulator {
    last_invoice: NaiveDateTime,
    lines: usize,
    amount: f64,
    last_line: usize,
}

/// Group cleaned lines by customer.
///
/// The reference date is fixed before grouping and shared by every customer.
/// Output order (ascending customer id) is the tie-break order the scorer
/// relies on, so it must not change between runs.
pub fn aggregate(records: &[CleanedRecord]) -> Result<Aggregation> {
    let latest = records
        .iter()
        .map(|r| r.invoice_date)
        .max()
        .ok_or_else(|| RfmError::empty(Stage::Aggregate, "no cleaned ledger lines to aggregate"))?;

    let reference_date = latest + Duration::days(1);

    let mut groups: BTreeMap<&CustomerId, Accumulator> = BTreeMap::new();
    for record in records {
        groups
            .entry(&record.customer_id)
            .and_modify(|acc| {
                acc.last_invoice = acc.last_invoice.max(record.invoice_date);
                acc.lines += 1;
                acc.amount += record.line_amount;
                acc.last_line = record.line_number;
            })
            .or_insert(Accumulator {
                last_invoice: record.invoice_date,
                lines: 1,
                amount: record.line_amount,
                last_line: record.line_number,
            });
    }

    let mut metrics = Vec::with_capacity(groups.len());
    for (customer_id, acc) in groups {
        if !acc.amount.is_finite() {
            return Err(RfmError::malformed(
                Stage::Aggregate,
                acc.last_line,
                "Monetary",
                customer_id.as_str(),
                "customer total overflows",
            ));
        }

        metrics.push(CustomerMetrics {
            customer_id: customer_id.clone(),
            recency_days: (reference_date - acc.last_invoice).num_days(),
            frequency: acc.lines,
            // no -0.0 totals
            monetary: acc.amount + 0.0,
        });
    }

    tracing::info!(
        customers = metrics.len(),
        reference_date = %reference_date,
        "customers aggregated"
    );

    Ok(Aggregation {
        reference_date,
        metrics,
    })
}

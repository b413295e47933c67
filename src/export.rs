// 📤 Segment export - fixed CSV column contract
// CustomerID,Recency,Frequency,Monetary,R_score,F_score,M_score,RFM_Segment,RFM_Score,Segment

use crate::aggregator::CustomerMetrics;
use crate::error::{Result, RfmError, Stage};
use crate::ledger::CustomerId;
use crate::scoring::ScoredMetrics;
use crate::segments::{Segment, SegmentedCustomer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Column order of the export
pub const EXPORT_COLUMNS: [&str; 10] = [
    "CustomerID",
    "Recency",
    "Frequency",
    "Monetary",
    "R_score",
    "F_score",
    "M_score",
    "RFM_Segment",
    "RFM_Score",
    "Segment",
];

/// Flat CSV row; field order is the column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "CustomerID")]
    pub customer_id: CustomerId,

    #[serde(rename = "Recency")]
    pub recency: i64,

    #[serde(rename = "Frequency")]
    pub frequency: usize,

    #[serde(rename = "Monetary")]
    pub monetary: f64,

    #[serde(rename = "R_score")]
    pub r_score: u8,

    #[serde(rename = "F_score")]
    pub f_score: u8,

    #[serde(rename = "M_score")]
    pub m_score: u8,

    #[serde(rename = "RFM_Segment")]
    pub rfm_segment: String,

    #[serde(rename = "RFM_Score")]
    pub rfm_score: u8,

    #[serde(rename = "Segment")]
    pub segment: Segment,
}

impl From<&SegmentedCustomer> for ExportRow {
    fn from(customer: &SegmentedCustomer) -> Self {
        let scored = &customer.scored;
        ExportRow {
            customer_id: scored.metrics.customer_id.clone(),
            recency: scored.metrics.recency_days,
            frequency: scored.metrics.frequency,
            monetary: scored.metrics.monetary,
            r_score: scored.r_score,
            f_score: scored.f_score,
            m_score: scored.m_score,
            rfm_segment: scored.rfm_segment_code.clone(),
            rfm_score: scored.rfm_score,
            segment: customer.segment,
        }
    }
}

impl ExportRow {
    /// Rebuild the record; scores must be 1..=5 and agree with the code/total
    pub fn into_customer(self, line: usize) -> Result<SegmentedCustomer> {
        for (field, score) in [("R_score", self.r_score), ("F_score", self.f_score), ("M_score", self.m_score)] {
            if !(1..=5).contains(&score) {
                return Err(RfmError::malformed(
                    Stage::Export,
                    line,
                    field,
                    &score.to_string(),
                    "score outside 1..=5",
                ));
            }
        }

        let scored = ScoredMetrics::new(
            CustomerMetrics {
                customer_id: self.customer_id,
                recency_days: self.recency,
                frequency: self.frequency,
                monetary: self.monetary,
            },
            self.r_score,
            self.f_score,
            self.m_score,
        );

        if scored.rfm_segment_code != self.rfm_segment {
            return Err(RfmError::malformed(
                Stage::Export,
                line,
                "RFM_Segment",
                &self.rfm_segment,
                format!("does not match scores ({})", scored.rfm_segment_code),
            ));
        }
        if scored.rfm_score != self.rfm_score {
            return Err(RfmError::malformed(
                Stage::Export,
                line,
                "RFM_Score",
                &self.rfm_score.to_string(),
                format!("does not match scores ({})", scored.rfm_score),
            ));
        }

        Ok(SegmentedCustomer {
            scored,
            segment: self.segment,
        })
    }
}

// ============================================================================
// WRITE
// ============================================================================

pub fn write_segments<W: Write>(writer: W, customers: &[SegmentedCustomer]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if customers.is_empty() {
        wtr.write_record(EXPORT_COLUMNS)?;
    }
    for customer in customers {
        wtr.serialize(ExportRow::from(customer))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Export as bytes; identical input gives identical bytes
pub fn to_csv_bytes(customers: &[SegmentedCustomer]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_segments(&mut buffer, customers)?;
    Ok(buffer)
}

/// SHA-256 of an export, hex encoded
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write the export to `path` and return its fingerprint
pub fn export_csv(path: &Path, customers: &[SegmentedCustomer]) -> Result<String> {
    let bytes = to_csv_bytes(customers)?;
    fs::write(path, &bytes)?;
    Ok(fingerprint(&bytes))
}

// ============================================================================
// READ BACK
// ============================================================================

pub fn read_segments<R: Read>(source: R) -> Result<Vec<SegmentedCustomer>> {
    let mut rdr = csv::Reader::from_reader(source);

    let headers = rdr.headers()?.clone();
    let found: Vec<&str> = headers.iter().collect();
    if found != EXPORT_COLUMNS {
        return Err(RfmError::malformed(
            Stage::Export,
            1,
            "header",
            &found.join(","),
            "unexpected columns",
        ));
    }

    let mut customers = Vec::new();
    for (index, result) in rdr.deserialize::<ExportRow>().enumerate() {
        let line = index + 2;
        let row = result.map_err(|e| {
            RfmError::malformed(Stage::Export, line, "row", "", format!("unreadable row: {}", e))
        })?;
        customers.push(row.into_customer(line)?);
    }

    Ok(customers)
}

pub fn load_segments(path: &Path) -> Result<Vec<SegmentedCustomer>> {
    let file = fs::File::open(path)?;
    read_segments(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmented(id: &str, recency: i64, frequency: usize, monetary: f64, scores: (u8, u8, u8), segment: Segment) -> SegmentedCustomer {
        SegmentedCustomer {
            scored: ScoredMetrics::new(
                CustomerMetrics {
                    customer_id: CustomerId::parse(id).unwrap(),
                    recency_days: recency,
                    frequency,
                    monetary,
                },
                scores.0,
                scores.1,
                scores.2,
            ),
            segment,
        }
    }

    #[test]
    fn test_column_contract() {
        let customers = vec![
            segmented("12346", 1, 10, 1000.0, (5, 5, 5), Segment::LoyalCustomer),
            segmented("12347", 300, 1, -12.5, (1, 1, 1), Segment::ChurnRisk),
        ];

        let bytes = to_csv_bytes(&customers).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "CustomerID,Recency,Frequency,Monetary,R_score,F_score,M_score,RFM_Segment,RFM_Score,Segment"
        );
        assert_eq!(lines[1], "12346,1,10,1000.0,5,5,5,555,15,Loyal Customer");
        assert_eq!(lines[2], "12347,300,1,-12.5,1,1,1,111,3,Churn Risk");
    }

    #[test]
    fn test_empty_export_still_has_header() {
        let text = String::from_utf8(to_csv_bytes(&[]).unwrap()).unwrap();
        assert_eq!(text.trim_end(), EXPORT_COLUMNS.join(","));
    }

    #[test]
    fn test_read_back_export() {
        let customers = vec![
            segmented("1", 3, 4, 99.5, (4, 3, 2), Segment::PotentialLoyalist),
            segmented("2", 40, 2, 10.0, (2, 2, 2), Segment::AtRisk),
        ];

        let bytes = to_csv_bytes(&customers).unwrap();
        let restored = read_segments(bytes.as_slice()).unwrap();

        assert_eq!(restored, customers);
    }

    #[test]
    fn test_read_rejects_inconsistent_code() {
        let text = format!("{}\n1,3,4,99.5,4,3,2,999,9,Potential Loyalist\n", EXPORT_COLUMNS.join(","));

        let err = read_segments(text.as_bytes()).unwrap_err();
        assert!(matches!(err, RfmError::MalformedInput { field: "RFM_Segment", line: 2, .. }));
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        let err = read_segments("a,b\n1,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RfmError::MalformedInput { field: "header", .. }));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let customers = vec![segmented("1", 3, 4, 99.5, (4, 3, 2), Segment::PotentialLoyalist)];

        let a = fingerprint(&to_csv_bytes(&customers).unwrap());
        let b = fingerprint(&to_csv_bytes(&customers).unwrap());

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}

use crate::aggregator::CustomerMetrics;
use crate::ledger::CustomerId;
use crate::pipeline::PipelineOutput;
use crate::scoring::ScoredMetrics;
use crate::segments::{Segment, SegmentedCustomer};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One stored segmentation run
/// The fingerprint is the SHA-256 of the CSV export: identical ledgers give
/// identical fingerprints, so a rerun is detected instead of stored twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub reference_date: NaiveDateTime,
    pub customer_count: i64,
    pub fingerprint: String,
    pub source: String,
}

/// Outcome of storing a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunInsert {
    Inserted(String),
    /// Same export already stored under this run id
    Unchanged(String),
}

impl RunInsert {
    pub fn run_id(&self) -> &str {
        match self {
            RunInsert::Inserted(id) | RunInsert::Unchanged(id) => id,
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Runs
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rfm_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL,
            reference_date TEXT NOT NULL,
            customer_count INTEGER NOT NULL,
            fingerprint TEXT UNIQUE NOT NULL,
            source TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Segmented customers (one row per customer per run)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS segmented_customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES rfm_runs(run_id),
            customer_id TEXT NOT NULL,
            recency INTEGER NOT NULL,
            frequency INTEGER NOT NULL,
            monetary REAL NOT NULL,
            r_score INTEGER NOT NULL,
            f_score INTEGER NOT NULL,
            m_score INTEGER NOT NULL,
            rfm_segment TEXT NOT NULL,
            rfm_score INTEGER NOT NULL,
            segment TEXT NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE (run_id, customer_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_segmented_run ON segmented_customers(run_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_segmented_segment ON segmented_customers(run_id, segment)",
        [],
    )?;

    Ok(())
}

/// Store a finished run; a run with an already stored fingerprint is skipped.
pub fn insert_run(
    conn: &Connection,
    output: &PipelineOutput,
    fingerprint: &str,
    source: &str,
) -> Result<RunInsert> {
    if let Some(existing) = find_run_by_fingerprint(conn, fingerprint)? {
        return Ok(RunInsert::Unchanged(existing.run_id));
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .context("Failed to start run transaction")?;

    tx.execute(
        "INSERT INTO rfm_runs (run_id, created_at, reference_date, customer_count, fingerprint, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run_id,
            Utc::now().to_rfc3339(),
            output.reference_date.format(REFERENCE_DATE_FORMAT).to_string(),
            output.customers.len() as i64,
            fingerprint,
            source,
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO segmented_customers (
                run_id, customer_id, recency, frequency, monetary,
                r_score, f_score, m_score, rfm_segment, rfm_score, segment, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        for (position, customer) in output.customers.iter().enumerate() {
            let scored = &customer.scored;
            stmt.execute(params![
                run_id,
                scored.metrics.customer_id.as_str(),
                scored.metrics.recency_days,
                scored.metrics.frequency as i64,
                scored.metrics.monetary,
                scored.r_score,
                scored.f_score,
                scored.m_score,
                scored.rfm_segment_code,
                scored.rfm_score,
                customer.segment.label(),
                position as i64,
            ])?;
        }
    }

    tx.commit().context("Failed to commit run")?;

    tracing::info!(%run_id, customers = output.customers.len(), "run stored");
    Ok(RunInsert::Inserted(run_id))
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, i64, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_run_record(raw: (String, String, String, i64, String, String)) -> Result<RunRecord> {
    let (run_id, created_at, reference_date, customer_count, fingerprint, source) = raw;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .with_context(|| format!("Bad created_at for run {}", run_id))?
        .with_timezone(&Utc);
    let reference_date = NaiveDateTime::parse_from_str(&reference_date, REFERENCE_DATE_FORMAT)
        .with_context(|| format!("Bad reference_date for run {}", run_id))?;

    Ok(RunRecord {
        run_id,
        created_at,
        reference_date,
        customer_count,
        fingerprint,
        source,
    })
}

const REFERENCE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const RUN_COLUMNS: &str = "run_id, created_at, reference_date, customer_count, fingerprint, source";

pub fn find_run_by_fingerprint(conn: &Connection, fingerprint: &str) -> Result<Option<RunRecord>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM rfm_runs WHERE fingerprint = ?1", RUN_COLUMNS),
            params![fingerprint],
            run_from_row,
        )
        .optional()?;

    raw.map(to_run_record).transpose()
}

/// Most recently stored run
pub fn latest_run(conn: &Connection) -> Result<Option<RunRecord>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM rfm_runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
            [],
            run_from_row,
        )
        .optional()?;

    raw.map(to_run_record).transpose()
}

pub fn list_runs(conn: &Connection) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM rfm_runs ORDER BY id DESC", RUN_COLUMNS))?;

    let raw = stmt
        .query_map([], run_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter().map(to_run_record).collect()
}

/// Customers of a run, in export order
pub fn get_run_customers(conn: &Connection, run_id: &str) -> Result<Vec<SegmentedCustomer>> {
    let mut stmt = conn.prepare(
        "SELECT customer_id, recency, frequency, monetary,
                r_score, f_score, m_score, segment
         FROM segmented_customers
         WHERE run_id = ?1
         ORDER BY position",
    )?;

    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, u8>(4)?,
                row.get::<_, u8>(5)?,
                row.get::<_, u8>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(customer_id, recency, frequency, monetary, r, f, m, segment)| -> Result<SegmentedCustomer> {
            let customer_id = CustomerId::parse(&customer_id)
                .with_context(|| format!("Empty customer id stored in run {}", run_id))?;
            let segment: Segment = segment.parse()?;

            Ok(SegmentedCustomer {
                scored: ScoredMetrics::new(
                    CustomerMetrics {
                        customer_id,
                        recency_days: recency,
                        frequency: frequency as usize,
                        monetary,
                    },
                    r,
                    f,
                    m,
                ),
                segment,
            })
        })
        .collect()
}

pub fn count_runs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM rfm_runs", [], |row| row.get(0))?;

    Ok(count)
}

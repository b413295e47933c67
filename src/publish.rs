// 📦 Run artifacts
// Export, JSON summary and stored run of one pipeline output. Files are
// staged next to their targets and only moved into place once every step,
// the run store included, has succeeded.

use crate::db::{insert_run, setup_database, RunInsert};
use crate::export::{fingerprint, to_csv_bytes};
use crate::pipeline::PipelineOutput;
use crate::report::SegmentReport;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where a run goes
#[derive(Debug, Clone)]
pub struct RunTargets {
    pub export: PathBuf,
    pub summary_json: Option<PathBuf>,
    pub db: Option<PathBuf>,
    /// Ledger the run was computed from, as recorded in the run store
    pub source: String,
}

#[derive(Debug)]
pub struct Published {
    pub fingerprint: String,
    pub report: SegmentReport,
    pub run: Option<RunInsert>,
}

pub fn publish(output: &PipelineOutput, targets: &RunTargets) -> Result<Published> {
    let bytes = to_csv_bytes(&output.customers)?;
    let print = fingerprint(&bytes);
    let report = SegmentReport::build(&output.customers);

    // Dropping a staged file deletes it, so any early return cleans up
    let export = stage(&targets.export, &bytes)?;
    let summary = match &targets.summary_json {
        Some(path) => Some((stage(path, report.to_json()?.as_bytes())?, path)),
        None => None,
    };

    let run = match &targets.db {
        Some(db_path) => {
            let conn = Connection::open(db_path)
                .with_context(|| format!("Failed to open database {}", db_path.display()))?;
            setup_database(&conn)?;
            Some(insert_run(&conn, output, &print, &targets.source)?)
        }
        None => None,
    };

    if let Some((file, path)) = summary {
        persist(file, path)?;
    }
    persist(export, &targets.export)?;

    tracing::info!(export = %targets.export.display(), fingerprint = %print, "run published");

    Ok(Published {
        fingerprint: print,
        report,
        run,
    })
}

fn stage(target: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage {}", target.display()))?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

fn persist(file: NamedTempFile, target: &Path) -> Result<()> {
    file.persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::count_runs;
    use crate::ledger::TransactionRecord;
    use crate::pipeline::Pipeline;
    use std::fs;

    fn sample_output() -> PipelineOutput {
        let records = vec![
            TransactionRecord::new(Some("17850"), "536365", "2010-12-01 08:26:00", 6, 2.55, 2),
            TransactionRecord::new(Some("13047"), "536367", "2010-12-03 08:34:00", 8, 2.75, 3),
            TransactionRecord::new(Some("12583"), "536370", "2010-12-01 08:45:00", 24, 3.75, 4),
        ];
        Pipeline::default().run(&records).unwrap()
    }

    #[test]
    fn test_publish_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let targets = RunTargets {
            export: dir.path().join("rfm_segments.csv"),
            summary_json: Some(dir.path().join("summary.json")),
            db: Some(dir.path().join("runs.db")),
            source: "ledger.csv".to_string(),
        };
        let output = sample_output();

        let published = publish(&output, &targets).unwrap();

        let written = fs::read(&targets.export).unwrap();
        assert_eq!(published.fingerprint, fingerprint(&written));
        assert_eq!(published.report.total_customers, 3);
        assert!(matches!(published.run, Some(RunInsert::Inserted(_))));

        let summary = fs::read_to_string(dir.path().join("summary.json")).unwrap();
        assert!(summary.contains("\"total_customers\": 3"));

        let again = publish(&output, &targets).unwrap();
        assert!(matches!(again.run, Some(RunInsert::Unchanged(_))));
        let conn = Connection::open(dir.path().join("runs.db")).unwrap();
        assert_eq!(count_runs(&conn).unwrap(), 1);
    }

    #[test]
    fn test_failed_run_store_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let targets = RunTargets {
            export: dir.path().join("rfm_segments.csv"),
            summary_json: Some(dir.path().join("summary.json")),
            db: Some(dir.path().join("missing").join("runs.db")),
            source: "ledger.csv".to_string(),
        };

        assert!(publish(&sample_output(), &targets).is_err());

        assert!(!targets.export.exists());
        assert!(!dir.path().join("summary.json").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_summary_leaves_no_export_or_run() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("runs.db");
        let targets = RunTargets {
            export: dir.path().join("rfm_segments.csv"),
            summary_json: Some(dir.path().join("missing").join("summary.json")),
            db: Some(db_path.clone()),
            source: "ledger.csv".to_string(),
        };

        assert!(publish(&sample_output(), &targets).is_err());

        assert!(!targets.export.exists());
        assert!(!db_path.exists());
    }
}

// End-to-end runs over ledger files on disk

use rfm_segmentation::{
    count_runs, export_csv, get_run_customers, insert_run, latest_run, load_segments,
    setup_database, to_csv_bytes, CsvLedgerReader, LedgerReader, Pipeline, PipelineConfig,
    RfmError, RunInsert, Segment, SegmentReport, Stage,
};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ONLINE_RETAIL: &str = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850.0,United Kingdom
536366,22633,HAND WARMER UNION JACK,6,2010-12-01 08:28:00,1.85,17850.0,United Kingdom
C536379,D,Discount,-1,2010-12-01 09:41:00,27.50,14527.0,United Kingdom
536380,22961,JAM MAKING SET PRINTED,24,2010-12-01 09:41:00,0.85,14527.0,United Kingdom
536381,22139,RETROSPOT TEA SET,12,2010-12-05 10:00:00,4.25,13047.0,United Kingdom
536390,22423,REGENCY CAKESTAND 3 TIER,10,not a date,12.75,,United Kingdom
536400,84879,ASSORTED COLOUR BIRD ORNAMENT,24,2010-12-08 12:00:00,1.69,12583.0,France
536401,22745,POPPY'S PLAYHOUSE BEDROOM,12,2010-12-09 12:00:00,2.10,12583.0,France
536402,23166,MEDIUM CERAMIC TOP STORAGE JAR,74215,2010-12-02 10:00:00,1.04,12346.0,United Kingdom
536403,21730,GLASS STAR FROSTED T-LIGHT HOLDER,48,2010-12-03 10:00:00,3.39,15100.0,United Kingdom
";

fn write_ledger(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run_file(path: &Path) -> rfm_segmentation::Result<rfm_segmentation::PipelineOutput> {
    let records = CsvLedgerReader::new().read_path(path)?;
    Pipeline::default().run(&records)
}

#[test]
fn test_online_retail_ledger() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(&dir, "online_retail.csv", ONLINE_RETAIL);

    let output = run_file(&ledger).unwrap();

    assert_eq!(output.normalize_stats.rows_read, 10);
    assert_eq!(output.normalize_stats.missing_customer, 1);
    assert_eq!(output.normalize_stats.returns, 1);
    assert_eq!(output.reference_date.to_string(), "2010-12-10 12:00:00");

    let ids: Vec<&str> = output
        .customers
        .iter()
        .map(|c| c.scored.metrics.customer_id.as_str())
        .collect();
    assert_eq!(ids, vec!["12346", "12583", "13047", "14527", "15100", "17850"]);

    // the return line still counts as a purchase line
    let discounted = &output.customers[3].scored;
    assert_eq!(discounted.metrics.frequency, 2);
    assert!((discounted.metrics.monetary - (24.0 * 0.85 - 27.5)).abs() < 1e-9);

    let newest = &output.customers[1].scored;
    assert_eq!(newest.metrics.recency_days, 1);
    assert_eq!(newest.r_score, 5);

    for customer in &output.customers {
        let scored = &customer.scored;
        assert!(scored.metrics.recency_days >= 0);
        assert_eq!(scored.rfm_score, scored.r_score + scored.f_score + scored.m_score);
        assert_eq!(customer.segment, rfm_segmentation::classify(scored));
    }
}

#[test]
fn test_three_customer_scenario() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(
        &dir,
        "three.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n\
         1,A1,2011-12-09 10:00:00,10,50\n\
         1,A2,2011-12-08 10:00:00,10,50\n\
         2,B1,2011-02-12 10:00:00,1,10\n\
         3,C1,2011-11-10 10:00:00,5,60\n",
    );

    let output = run_file(&ledger).unwrap();

    let codes: Vec<(&str, &str, Segment)> = output
        .customers
        .iter()
        .map(|c| {
            (
                c.scored.metrics.customer_id.as_str(),
                c.scored.rfm_segment_code.as_str(),
                c.segment,
            )
        })
        .collect();

    assert_eq!(
        codes,
        vec![
            ("1", "555", Segment::LoyalCustomer),
            ("2", "111", Segment::ChurnRisk),
            ("3", "333", Segment::PotentialLoyalist),
        ]
    );
}

#[test]
fn test_newer_ledger_layout_aliases() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(
        &dir,
        "online_retail_ii.csv",
        "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country\n\
         489434,85048,15CM CHRISTMAS GLASS BALL,12,2009-12-01 07:45:00,6.95,13085.0,United Kingdom\n\
         489435,22350,CAT BOWL,12,2009-12-01 07:46:00,2.55,13085.0,United Kingdom\n\
         489436,48173C,DOOR MAT BLACK FLOCK,10,2009-12-01 09:06:00,5.95,13078.0,United Kingdom\n",
    );

    let output = run_file(&ledger).unwrap();

    assert_eq!(output.customers.len(), 2);
    assert_eq!(output.customers[0].scored.metrics.customer_id.as_str(), "13078");
    assert_eq!(output.customers[1].scored.metrics.frequency, 2);
}

#[test]
fn test_export_is_byte_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(&dir, "online_retail.csv", ONLINE_RETAIL);
    let first_path = dir.path().join("first.csv");
    let second_path = dir.path().join("second.csv");

    let first = export_csv(&first_path, &run_file(&ledger).unwrap().customers).unwrap();
    let second = export_csv(&second_path, &run_file(&ledger).unwrap().customers).unwrap();

    assert_eq!(first, second);
    assert_eq!(fs::read(&first_path).unwrap(), fs::read(&second_path).unwrap());

    let text = fs::read_to_string(&first_path).unwrap();
    assert!(text.starts_with(
        "CustomerID,Recency,Frequency,Monetary,R_score,F_score,M_score,RFM_Segment,RFM_Score,Segment\n"
    ));
    assert_eq!(text.lines().count(), 7);

    let reloaded = load_segments(&first_path).unwrap();
    assert_eq!(reloaded, run_file(&ledger).unwrap().customers);
}

#[test]
fn test_bad_timestamp_on_customer_line_fails_run() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(
        &dir,
        "broken.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n\
         1,A1,2011-12-09 10:00:00,1,1\n\
         2,B1,31/31/2011,1,1\n",
    );

    let err = run_file(&ledger).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Normalize));
    assert!(matches!(
        err,
        RfmError::MalformedInput {
            line: 3,
            field: "InvoiceDate",
            ..
        }
    ));
}

#[test]
fn test_zero_quantity_at_negative_price_ties_with_zero() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(
        &dir,
        "zeros.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n\
         1,A1,2011-12-01 10:00:00,1,10\n\
         2,B1,2011-12-02 10:00:00,1,20\n\
         3,C1,2011-12-03 10:00:00,1,30\n\
         4,D1,2011-12-04 10:00:00,0,5\n\
         5,E1,2011-12-05 10:00:00,0,-5\n",
    );

    let output = run_file(&ledger).unwrap();

    let monetary = output.model.bins(rfm_segmentation::Metric::Monetary);
    assert_eq!(monetary.distinct_values, 4);
    assert!(monetary.degenerate);

    let m_scores: Vec<u8> = output.customers.iter().map(|c| c.scored.m_score).collect();
    assert_eq!(m_scores, vec![3, 4, 5, 1, 2]);

    let text = String::from_utf8(to_csv_bytes(&output.customers).unwrap()).unwrap();
    assert!(!text.contains("-0"));
}

#[test]
fn test_overflowing_amounts_fail_run() {
    let dir = TempDir::new().unwrap();
    let huge_quantity = write_ledger(
        &dir,
        "huge_quantity.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n1,A1,2011-12-01 10:00:00,1e30,1\n",
    );
    let huge_amount = write_ledger(
        &dir,
        "huge_amount.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n1,A1,2011-12-01 10:00:00,10000000000,1e300\n",
    );

    let err = run_file(&huge_quantity).unwrap_err();
    assert!(matches!(err, RfmError::MalformedInput { field: "Quantity", line: 2, .. }));

    let err = run_file(&huge_amount).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Normalize));
    assert!(matches!(err, RfmError::MalformedInput { field: "UnitPrice", line: 2, .. }));
}

#[test]
fn test_unknown_customer_column_fails_read() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(
        &dir,
        "renamed.csv",
        "Customer_Id,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n1,A1,2011-12-01 10:00:00,1,1\n",
    );

    let err = run_file(&ledger).unwrap_err();
    assert!(matches!(err, RfmError::MalformedInput { field: "header", line: 1, .. }));
}

#[test]
fn test_non_numeric_quantity_fails_read() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(
        &dir,
        "broken.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n1,A1,2011-12-09 10:00:00,six,1\n",
    );

    let err = run_file(&ledger).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Read));
}

#[test]
fn test_guest_only_ledger_is_empty_population() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(
        &dir,
        "guests.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n,A1,2011-12-09 10:00:00,1,1\nNaN,A2,2011-12-09 10:00:00,1,1\n",
    );

    let err = run_file(&ledger).unwrap_err();
    assert!(matches!(err, RfmError::EmptyPopulation { .. }));
}

#[test]
fn test_config_file_drives_pipeline() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join("rules.json");
    fs::write(
        &rules,
        r#"[
            {"segment": "Loyal Customer", "min_score": 14},
            {"segment": "Churn Risk", "max_score": 14}
        ]"#,
    )
    .unwrap();
    let config_path = dir.path().join("rfm.json");
    fs::write(
        &config_path,
        format!(
            r#"{{"date_formats": ["%d.%m.%Y %H:%M"], "segment_rules": {:?}}}"#,
            rules.display().to_string()
        ),
    )
    .unwrap();
    let ledger = write_ledger(
        &dir,
        "dotted.csv",
        "CustomerID,InvoiceNo,InvoiceDate,Quantity,UnitPrice\n\
         1,A1,09.12.2011 10:00,10,50\n\
         1,A2,08.12.2011 10:00,10,50\n\
         2,B1,12.02.2011 10:00,1,10\n\
         3,C1,10.11.2011 10:00,5,60\n",
    );

    let config = PipelineConfig::from_file(&config_path).unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();
    let records = CsvLedgerReader::new().read_path(&ledger).unwrap();
    let output = pipeline.run(&records).unwrap();

    let segments: Vec<Segment> = output.customers.iter().map(|c| c.segment).collect();
    assert_eq!(
        segments,
        vec![Segment::LoyalCustomer, Segment::ChurnRisk, Segment::ChurnRisk]
    );
}

#[test]
fn test_run_store_skips_identical_rerun() {
    let dir = TempDir::new().unwrap();
    let ledger = write_ledger(&dir, "online_retail.csv", ONLINE_RETAIL);
    let conn = Connection::open(dir.path().join("runs.db")).unwrap();
    setup_database(&conn).unwrap();

    let output = run_file(&ledger).unwrap();
    let print = rfm_segmentation::fingerprint(&to_csv_bytes(&output.customers).unwrap());

    let first = insert_run(&conn, &output, &print, "online_retail.csv").unwrap();
    assert!(matches!(first, RunInsert::Inserted(_)));

    let rerun = run_file(&ledger).unwrap();
    let second = insert_run(&conn, &rerun, &print, "online_retail.csv").unwrap();
    assert_eq!(second.run_id(), first.run_id());
    assert!(matches!(second, RunInsert::Unchanged(_)));
    assert_eq!(count_runs(&conn).unwrap(), 1);

    let latest = latest_run(&conn).unwrap().unwrap();
    let stored = get_run_customers(&conn, &latest.run_id).unwrap();
    assert_eq!(stored, output.customers);

    let report = SegmentReport::build(&stored);
    assert_eq!(report.total_customers, 6);
    assert_eq!(report.counts.iter().map(|c| c.count).sum::<usize>(), 6);
}

// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rfm_segmentation::{
    load_segments, publish, CsvLedgerReader, DegeneratePolicy, LedgerReader, Metric, Pipeline,
    PipelineConfig, RunInsert, RunTargets, SegmentReport, SegmentRules,
};

#[derive(Parser)]
#[command(name = "rfm-segmentation", version, about = "RFM customer segmentation from a transaction ledger")]
struct Cli {
    /// Debug-level logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score and segment every customer of a ledger
    Run {
        /// Transaction ledger (CSV with header)
        #[arg(short, long)]
        input: PathBuf,

        /// Segmented customer export
        #[arg(short, long, default_value = "rfm_segments.csv")]
        output: PathBuf,

        /// JSON pipeline configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON segment table (overrides the config)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Behaviour when a metric has fewer than 5 distinct values (overrides the config)
        #[arg(long, value_enum)]
        on_degenerate: Option<DegeneratePolicy>,

        /// Also store the run in this SQLite database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write the segment report as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Print segment counts and distributions of an export
    Report {
        #[arg(short, long)]
        segments: PathBuf,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Interactive segment dashboard
    View {
        /// Segmented customer export
        #[arg(short, long, conflicts_with = "db", required_unless_present = "db")]
        segments: Option<PathBuf>,

        /// Latest run stored in this database
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            input,
            output,
            config,
            rules,
            on_degenerate,
            db,
            summary_json,
        } => run_segmentation(RunArgs {
            input,
            output,
            config,
            rules,
            on_degenerate,
            db,
            summary_json,
        }),
        Command::Report { segments, json } => run_report(&segments, json),
        Command::View { segments, db } => run_ui_mode(segments, db),
    }
}

struct RunArgs {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    rules: Option<PathBuf>,
    on_degenerate: Option<DegeneratePolicy>,
    db: Option<PathBuf>,
    summary_json: Option<PathBuf>,
}

fn run_segmentation(args: RunArgs) -> Result<()> {
    println!("📊 RFM Segmentation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Configuration
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(rules) = args.rules {
        config.segment_rules = Some(rules);
    }
    if let Some(policy) = args.on_degenerate {
        config.degenerate_policy = policy;
    }
    let pipeline = Pipeline::from_config(&config).context("Invalid pipeline configuration")?;
    print_rules(pipeline.rules());

    // 2. Read ledger
    println!("\n📂 Loading ledger...");
    let reader = CsvLedgerReader::new();
    let records = reader
        .read_path(&args.input)
        .with_context(|| format!("Failed to read ledger {}", args.input.display()))?;
    println!("✓ Read {} {} lines from {}", records.len(), reader.format(), args.input.display());

    // 3. Pipeline
    println!("\n🧮 Scoring customers...");
    let output = pipeline.run(&records).context("Segmentation failed")?;
    let stats = &output.normalize_stats;
    println!(
        "✓ Kept {} of {} lines ({} without customer, {} returns)",
        stats.rows_kept, stats.rows_read, stats.missing_customer, stats.returns
    );
    println!("✓ Reference date: {}", output.reference_date);
    println!("✓ Scored {} customers", output.customers.len());
    for metric in output.model.degenerate_metrics() {
        let bins = output.model.bins(metric);
        println!(
            "⚠️  {} has only {} distinct values; scores spread by customer order",
            metric, bins.distinct_values
        );
    }
    print_bins(&output.model);

    // 4. Export, summary and run store (all or nothing)
    println!("\n💾 Writing outputs...");
    let targets = RunTargets {
        export: args.output,
        summary_json: args.summary_json,
        db: args.db,
        source: args.input.display().to_string(),
    };
    let published = publish(&output, &targets)?;
    println!("✓ Wrote {}", targets.export.display());
    println!("✓ Fingerprint: {}", published.fingerprint);
    if let Some(path) = &targets.summary_json {
        println!("✓ Wrote report {}", path.display());
    }
    match &published.run {
        Some(RunInsert::Inserted(run_id)) => println!("✓ Stored run {}", run_id),
        Some(RunInsert::Unchanged(run_id)) => {
            println!("✓ Identical export already stored as run {}", run_id)
        }
        None => {}
    }

    // 5. Report
    published.report.print();

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Segmentation complete");

    Ok(())
}

fn print_rules(rules: &SegmentRules) {
    println!("\n📋 Segment rules:");
    for rule in rules.rules() {
        let range = match (rule.min_score, rule.max_score) {
            (Some(min), Some(max)) => format!("{} <= score < {}", min, max),
            (Some(min), None) => format!("score >= {}", min),
            (None, Some(max)) => format!("score < {}", max),
            (None, None) => "any score".to_string(),
        };
        println!("   {:<20} {}", rule.segment.label(), range);
    }
}

fn print_bins(model: &rfm_segmentation::QuintileModel) {
    for metric in Metric::ALL {
        let bins = model.bins(metric);
        println!("\n   {} bins:", metric);
        for b in &bins.bins {
            println!(
                "     bin {} (score {}): {:>6} customers, {} .. {}",
                b.bin,
                b.score,
                b.size(),
                b.min_value,
                b.max_value
            );
        }
    }
}

fn run_report(segments: &Path, json: bool) -> Result<()> {
    let customers = load_segments(segments)
        .with_context(|| format!("Failed to load export {}", segments.display()))?;
    let report = SegmentReport::build(&customers);

    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print();
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(segments: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    println!("🖥️  Loading segment dashboard...\n");

    let (source, customers) = match (segments, db) {
        (Some(path), _) => {
            let customers = load_segments(&path)
                .with_context(|| format!("Failed to load export {}", path.display()))?;
            (path.display().to_string(), customers)
        }
        (None, Some(db_path)) => {
            if !db_path.exists() {
                eprintln!("❌ Database not found!");
                eprintln!("   Run: rfm-segmentation run --input <ledger> --db {}", db_path.display());
                std::process::exit(1);
            }
            let conn = rusqlite::Connection::open(&db_path)?;
            let run = match rfm_segmentation::latest_run(&conn)? {
                Some(run) => run,
                None => {
                    eprintln!("❌ No runs stored in {}", db_path.display());
                    std::process::exit(1);
                }
            };
            let customers = rfm_segmentation::get_run_customers(&conn, &run.run_id)?;
            (format!("{} (run {})", run.source, run.created_at.format("%Y-%m-%d %H:%M")), customers)
        }
        (None, None) => anyhow::bail!("view needs --segments or --db"),
    };

    println!("✓ Loaded {} customers\n", customers.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(source, customers);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_segments: Option<PathBuf>, _db: Option<PathBuf>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or print the report: rfm-segmentation report --segments <export>");
    std::process::exit(1);
}

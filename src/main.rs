//! marketload: load marketplace sales into a store, report on them, or
//! generate a synthetic dataset.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use marketload::generate::generate_dataset;
use marketload::reports::run_analysis;
use marketload::store::cassandra::CassandraOptions;
use marketload::{
    run_job, AnalyzeConfig, CassandraStore, GenerateConfig, JobOutcome, JobSummary, LoadConfig,
    MemoryStore, SqliteStore, Store, StoreTarget, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY,
};

#[derive(Debug, Parser)]
#[command(name = "marketload")]
#[command(about = "Bulk-load marketplace sales and report on them")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a Parquet file into the store in concurrent batches
    Load(LoadArgs),
    /// Scan the store and write the aggregation reports
    Analyze(AnalyzeArgs),
    /// Write a synthetic sales dataset
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Parquet file to load
    #[arg(long, default_value = "data/raw/marketplace_bigdata_1M.parquet")]
    source: PathBuf,

    /// Store address: cassandra://host[,host]:port/keyspace, sqlite:PATH or memory:
    #[arg(long, default_value = "cassandra://127.0.0.1:9042/marketplace_ks")]
    store: String,

    /// Records per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Maximum simultaneous writes per batch
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-write deadline in milliseconds
    #[arg(long)]
    write_timeout_ms: Option<u64>,

    /// Rows to read back after loading
    #[arg(long, default_value_t = 5)]
    validate_limit: usize,

    /// Skip the read-back after loading
    #[arg(long)]
    no_validate: bool,

    /// Write ids of records that were not written to this file
    #[arg(long)]
    failed_ids: Option<PathBuf>,

    /// Only load the ids listed in this file
    #[arg(long)]
    only_ids: Option<PathBuf>,

    /// Create the sales table if it does not exist
    #[arg(long)]
    create_table: bool,

    /// Write the final job summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Store address
    #[arg(long, default_value = "cassandra://127.0.0.1:9042/marketplace_ks")]
    store: String,

    /// Rows fetched per page
    #[arg(long, default_value_t = 10_000)]
    page_size: usize,

    /// Directory for the CSV reports
    #[arg(long, default_value = "data/processed")]
    output_dir: PathBuf,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Number of records
    #[arg(long, default_value_t = 1_000_000)]
    rows: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output Parquet file
    #[arg(long, default_value = "data/raw/marketplace_bigdata_1M.parquet")]
    output: PathBuf,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // Driver crates stay at warn unless RUST_LOG says otherwise.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,marketload={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn install_interrupt_handler() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            eprintln!("Interrupt received, finishing in-flight writes...");
        }
    }) {
        warn!("Failed to install Ctrl-C handler: {e}");
    }
    stop
}

fn write_summary(path: &Path, outcome: &JobOutcome) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &JobSummary::from(outcome))
        .context("Failed to write job summary")?;
    Ok(())
}

fn finish_load(outcome: &JobOutcome, summary_json: Option<&Path>) -> Result<ExitCode> {
    if let Some(path) = summary_json {
        write_summary(path, outcome)?;
        info!("Summary written to {}", path.display());
    }
    Ok(ExitCode::from(outcome.exit_code() as u8))
}

fn run_load(args: LoadArgs) -> Result<ExitCode> {
    let store = match args.store.parse() {
        Ok(store) => store,
        Err(e) => {
            error!("Load aborted: {e}");
            return finish_load(&JobOutcome::aborted(e), args.summary_json.as_deref());
        }
    };
    let config = LoadConfig {
        source: args.source,
        store,
        batch_size: args.batch_size,
        concurrency: args.concurrency,
        write_timeout: args.write_timeout_ms.map(Duration::from_millis),
        validate: !args.no_validate,
        validate_limit: args.validate_limit,
        failed_ids: args.failed_ids,
        only_ids: args.only_ids,
        create_table: args.create_table,
    };
    let stop = install_interrupt_handler();

    let outcome = match config.store.clone() {
        StoreTarget::Cassandra {
            hosts,
            port,
            keyspace,
        } => {
            let options = CassandraOptions {
                write_timeout: config.write_timeout,
                create_table: config.create_table,
            };
            run_job(
                &config,
                |_| CassandraStore::connect(&hosts, port, &keyspace, &options),
                stop,
            )
        }
        StoreTarget::Sqlite { path } => {
            run_job(&config, |c| SqliteStore::open(&path, c.create_table), stop)
        }
        StoreTarget::Memory => run_job(&config, |_| Ok(MemoryStore::new()), stop),
    };

    finish_load(&outcome, args.summary_json.as_deref())
}

fn analyze_store<S: Store>(store: S, config: &AnalyzeConfig) -> Result<()> {
    let reports = run_analysis(&store, config)?;
    info!("Analysis finished: {} reports", reports.len());
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<ExitCode> {
    let config = AnalyzeConfig {
        store: args.store.parse()?,
        page_size: args.page_size,
        output_dir: args.output_dir,
        ..Default::default()
    };
    info!("Connecting to {}", config.store);
    match &config.store {
        StoreTarget::Cassandra {
            hosts,
            port,
            keyspace,
        } => analyze_store(
            CassandraStore::connect(hosts, *port, keyspace, &CassandraOptions::default())?,
            &config,
        )?,
        StoreTarget::Sqlite { path } => analyze_store(SqliteStore::open(path, false)?, &config)?,
        StoreTarget::Memory => analyze_store(MemoryStore::new(), &config)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn run_generate(args: GenerateArgs) -> Result<ExitCode> {
    let config = GenerateConfig {
        rows: args.rows,
        seed: args.seed,
        output: args.output,
        ..Default::default()
    };
    generate_dataset(&config)?;
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Load(args) => run_load(args),
        Commands::Analyze(args) => run_analyze(args),
        Commands::Generate(args) => run_generate(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

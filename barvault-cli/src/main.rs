//! BarVault CLI — ingestion runs, resume, status, and store inspection.
//!
//! Commands:
//! - `run` — generate tasks for the universe and drive the worker pool
//! - `resume` — re-queue failed tasks and run them again
//! - `status` — report registry counts, failure breakdown, and ETA
//! - `validate` — read-only integrity report for one stored series
//! - `store-status` — what the store holds, per category and symbol
//! - `import` — load bars from a CSV file into the store

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use barvault_core::ingest;
use barvault_core::loader::QueryLoader;
use barvault_core::provider::rest::RestProvider;
use barvault_core::store::{PartitionedStore, WriteMode};
use barvault_core::timeframe::Timeframe;
use barvault_core::universe::Universe;
use barvault_core::SeriesKey;
use barvault_runner::pool;
use barvault_runner::registry::{Registry, SharedRegistry};
use barvault_runner::report::RunReport;
use barvault_runner::{RunConfig, StopCause};

#[derive(Parser)]
#[command(name = "barvault", about = "BarVault CLI — OHLCV history ingestion")]
struct Cli {
    /// Path to the run config TOML. Defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate tasks for the universe and drive the worker pool.
    Run {
        /// Restrict to these categories (default: all in the universe).
        #[arg(long)]
        category: Vec<String>,

        /// Timeframes to ingest (e.g. 1d 15m). Defaults from config.
        #[arg(long)]
        timeframe: Vec<String>,

        /// Worker count override.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Re-queue failed tasks and run them again.
    Resume {
        /// Worker count override.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Report registry counts, failure breakdown, and ETA.
    Status,
    /// Read-only integrity report for one stored series.
    Validate {
        category: String,
        symbol: String,
        /// Timeframe (e.g. 1d).
        timeframe: String,
    },
    /// What the store holds, per category and symbol.
    StoreStatus,
    /// Load bars from a CSV file (ts,open,high,low,close,volume) into the store.
    Import {
        csv: PathBuf,
        #[arg(long)]
        category: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: String,
        /// Replace partition content instead of merging.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunConfig::default(),
    };

    match cli.command {
        Commands::Run {
            category,
            timeframe,
            workers,
        } => run_ingestion(config, category, timeframe, workers, false),
        Commands::Resume { workers } => run_ingestion(config, Vec::new(), Vec::new(), workers, true),
        Commands::Status => print_status(&config),
        Commands::Validate {
            category,
            symbol,
            timeframe,
        } => print_validation(&config, &category, &symbol, &timeframe),
        Commands::StoreStatus => print_store_status(&config),
        Commands::Import {
            csv,
            category,
            symbol,
            timeframe,
            overwrite,
        } => import_csv(&config, &csv, &category, &symbol, &timeframe, overwrite),
    }
}

fn parse_timeframes(config: &RunConfig, requested: &[String]) -> Result<Vec<Timeframe>> {
    if requested.is_empty() {
        return Ok(config.timeframes.clone());
    }
    requested
        .iter()
        .map(|s| s.parse::<Timeframe>().map_err(Into::into))
        .collect()
}

fn load_universe(config: &RunConfig, categories: &[String]) -> Result<Universe> {
    let universe = match &config.universe_path {
        Some(path) => Universe::from_file(path)
            .with_context(|| format!("loading universe {}", path.display()))?,
        None => Universe::default_nse(),
    };
    if categories.is_empty() {
        return Ok(universe);
    }
    let selected = universe.select(categories);
    if selected.categories.is_empty() {
        bail!(
            "none of the requested categories exist in the universe \
             (available: {})",
            universe.category_names().join(", ")
        );
    }
    Ok(selected)
}

fn run_ingestion(
    mut config: RunConfig,
    categories: Vec<String>,
    timeframes: Vec<String>,
    workers: Option<usize>,
    resume: bool,
) -> Result<()> {
    if let Some(workers) = workers {
        config.workers = workers;
    }
    let timeframes = parse_timeframes(&config, &timeframes)?;

    let mut registry = Registry::open(&config.registry_path)?;
    let repaired = registry.repair_stale(config.stale_age())?;
    if repaired > 0 {
        println!("repaired {repaired} stale in-progress task(s)");
    }

    if resume {
        let requeued = registry.resume_failed()?;
        println!("re-queued {requeued} failed task(s)");
    } else {
        let universe = load_universe(&config, &categories)?;
        let summary = registry.generate(&universe, &timeframes)?;
        println!(
            "generated {} new task(s), {} already present",
            summary.added, summary.existing
        );
    }

    let provider_config = config.provider_config().context(
        "provider is not configured; set provider.base_url and provider.token_path in the config",
    )?;
    let breaker = Arc::new(config.breaker());
    let provider = RestProvider::new(provider_config, breaker.clone())
        .map_err(|e| anyhow::anyhow!("building provider client: {e}"))?;
    let store = PartitionedStore::new(&config.store_root);

    let shared = SharedRegistry::new(registry);
    let stop = AtomicBool::new(false);
    let outcome = pool::run(
        &shared,
        &provider,
        &breaker,
        &store,
        &config.pool_config(),
        &stop,
    );

    let report = shared.with(|r| RunReport::compile(r, outcome.elapsed));
    print!("{report}");

    match outcome.stopped {
        Some(StopCause::AuthFailure) => {
            bail!("run stopped: authentication failed — refresh the access token, then `resume`")
        }
        Some(StopCause::RateLimitPause) => {
            println!(
                "run paused: provider rate limit (cooldown {}s remaining) — `resume` later",
                breaker.remaining().as_secs()
            );
            Ok(())
        }
        Some(StopCause::External) | None => Ok(()),
    }
}

fn print_status(config: &RunConfig) -> Result<()> {
    if !config.registry_path.exists() {
        bail!("no registry at {}", config.registry_path.display());
    }
    let registry = Registry::open(&config.registry_path)?;
    let elapsed = (registry.updated_at() - registry.started_at())
        .to_std()
        .unwrap_or(Duration::ZERO);
    let report = RunReport::compile(&registry, elapsed);
    print!("{report}");
    Ok(())
}

fn print_validation(
    config: &RunConfig,
    category: &str,
    symbol: &str,
    timeframe: &str,
) -> Result<()> {
    let timeframe: Timeframe = timeframe.parse()?;
    let store = PartitionedStore::new(&config.store_root);
    let key = SeriesKey::new(category, symbol, timeframe);
    let report = store.validate(&key)?;

    println!("series: {key}");
    println!("records: {}", report.record_count);
    println!("duplicate timestamps: {}", report.duplicate_count);
    println!("invalid OHLC rows: {}", report.invalid_ohlc_count);
    println!("unreadable partitions: {}", report.unreadable_partitions);
    for (column, nulls) in &report.null_counts {
        if *nulls > 0 {
            println!("null {column}: {nulls}");
        }
    }
    if let Some((first, last)) = report.ts_range {
        println!("range: {} .. {}", format_ts(first), format_ts(last));
    }
    println!("valid: {}", report.is_valid());
    Ok(())
}

fn print_store_status(config: &RunConfig) -> Result<()> {
    let store = PartitionedStore::new(&config.store_root);
    let loader = QueryLoader::new(&store);

    let categories = loader.available_categories();
    if categories.is_empty() {
        println!("store at {} is empty", config.store_root.display());
        return Ok(());
    }

    for category in categories {
        let symbols = loader.available_symbols(&category)?;
        println!("{category}: {} symbol(s)", symbols.len());
        for symbol in symbols {
            for tf in loader.available_timeframes(&category, &symbol)? {
                let key = SeriesKey::new(category.clone(), symbol.clone(), tf);
                match store.meta(&key) {
                    Some(meta) => println!(
                        "  {symbol} {tf}: {} .. {}",
                        format_ts(meta.first_ts),
                        format_ts(meta.last_ts)
                    ),
                    None => println!("  {symbol} {tf}"),
                }
            }
        }
    }
    Ok(())
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn import_csv(
    config: &RunConfig,
    csv: &std::path::Path,
    category: &str,
    symbol: &str,
    timeframe: &str,
    overwrite: bool,
) -> Result<()> {
    let timeframe: Timeframe = timeframe.parse()?;
    let bars = ingest::bars_from_csv(csv)?;
    let batch = ingest::ingest(symbol, bars)?;

    let store = PartitionedStore::new(&config.store_root);
    let key = SeriesKey::new(category, symbol, timeframe);
    let mode = if overwrite {
        WriteMode::Overwrite
    } else {
        WriteMode::Append
    };
    let summary = store.write(&key, &batch.bars, mode)?;

    println!(
        "imported {} bar(s) into {key} ({} partition(s), {} in-file duplicate(s) collapsed)",
        summary.written, summary.partitions_touched, batch.duplicates_dropped
    );
    Ok(())
}

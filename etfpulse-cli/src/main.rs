//! ETFPulse CLI: fetch ETF market data and persist one JSON file per symbol.
//!
//! Commands:
//! - `fetch <category>`: one category run over the whole catalog
//! - `fetch-all`: several categories side by side
//! - `watch <category>`: repeat a category run on an interval
//! - `status <category>`: which symbols are missing, failed or fresh
//! - `catalog`: print the flattened instrument catalog
//! - `init-config`: write the default configuration file

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use etfpulse_core::data::{YahooCapability, YahooProvider};
use etfpulse_core::{Catalog, Category, IndicatorStep, InstrumentDescriptor, RecordState};
use etfpulse_runner::{
    run_concurrently, scan, CancelToken, CategoryJob, Pipeline, PipelineConfig, PoolSize, RunLog,
    RunSummary,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG_FILE: &str = "etfpulse.toml";

#[derive(Parser)]
#[command(
    name = "etfpulse",
    version,
    about = "ETFPulse: fetch-and-persist engine for ETF market data"
)]
struct Cli {
    /// Config file (TOML). Defaults to ./etfpulse.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase stderr log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one category for every catalog instrument.
    Fetch {
        /// quote, metadata, financials or technical.
        category: Category,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Fetch several categories concurrently, one thread per category.
    FetchAll {
        /// Categories to run. Defaults to all four.
        #[arg(long, value_delimiter = ',')]
        categories: Vec<Category>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Re-run one category on a fixed interval.
    Watch {
        category: Category,

        /// Seconds between run starts.
        #[arg(long, default_value_t = 3600)]
        interval: u64,

        /// Stop after this many runs. Runs forever when omitted.
        #[arg(long)]
        runs: Option<u64>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Report the record state of every catalog symbol for a category.
    Status {
        category: Category,

        #[command(flatten)]
        paths: PathArgs,
    },
    /// Print the flattened instrument catalog.
    Catalog {
        /// Print a starter catalog as JSON instead of reading one.
        #[arg(long, default_value_t = false)]
        sample: bool,

        #[command(flatten)]
        paths: PathArgs,
    },
    /// Write the default configuration file.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Args, Clone)]
struct PathArgs {
    /// Instrument catalog file (JSON, or TOML by extension).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Root directory for per-category output.
    #[arg(long)]
    output_root: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    paths: PathArgs,

    /// Directory for per-category run logs.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Worker count, or "per_item" for one worker per instrument.
    #[arg(long, value_parser = parse_pool_size)]
    workers: Option<PoolSize>,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Stop dispatching new instruments after this many seconds.
    #[arg(long)]
    deadline: Option<u64>,
}

fn parse_pool_size(s: &str) -> Result<PoolSize, String> {
    if s == "per_item" {
        return Ok(PoolSize::PerItem);
    }
    match s.parse::<usize>() {
        Ok(0) => Err("worker count must be at least 1".into()),
        Ok(n) => Ok(PoolSize::Bounded(n)),
        Err(_) => Err(format!("expected a number or \"per_item\", got '{s}'")),
    }
}

impl PathArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(catalog) = &self.catalog {
            config.catalog = catalog.clone();
        }
        if let Some(root) = &self.output_root {
            config.output_root = root.clone();
        }
    }
}

impl RunArgs {
    /// CLI flags win over file values for the categories being run.
    fn apply(&self, config: &mut PipelineConfig, categories: &[Category]) {
        self.paths.apply(config);
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        for category in categories {
            let o = config.categories.get_mut(*category);
            if self.workers.is_some() {
                o.workers = self.workers;
            }
            if self.max_attempts.is_some() {
                o.max_attempts = self.max_attempts;
            }
            if self.retry_delay_ms.is_some() {
                o.retry_delay_ms = self.retry_delay_ms;
            }
        }
    }

    fn cancel_token(&self) -> CancelToken {
        match self.deadline {
            Some(secs) => CancelToken::with_deadline(Duration::from_secs(secs)),
            None => CancelToken::new(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch { category, run } => run_fetch(config, category, &run),
        Commands::FetchAll { categories, run } => run_fetch_all(config, categories, &run),
        Commands::Watch {
            category,
            interval,
            runs,
            run,
        } => run_watch(config, category, interval, runs, &run),
        Commands::Status { category, paths } => run_status(config, category, &paths),
        Commands::Catalog { sample, paths } => run_catalog(config, sample, &paths),
        Commands::InitConfig { path, force } => run_init_config(&path, force),
    }
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()
        .context("install logger")?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            log::debug!("using {DEFAULT_CONFIG_FILE}");
            PipelineConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("load config {DEFAULT_CONFIG_FILE}"))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn load_catalog(config: &PipelineConfig) -> Result<Catalog> {
    let catalog = Catalog::from_file(&config.catalog)
        .with_context(|| format!("load catalog {}", config.catalog.display()))?;
    if catalog.is_empty() {
        log::warn!("catalog {} lists no instruments", config.catalog.display());
    }
    Ok(catalog)
}

/// Pipeline for a category, with the indicator step for `technical`.
fn pipeline<'a>(
    config: &PipelineConfig,
    capability: &'a YahooCapability,
    step: &'a IndicatorStep,
    category: Category,
) -> Pipeline<'a> {
    let pipeline = Pipeline::new(capability, config.settings(category));
    if category == Category::Technical {
        pipeline.with_post_process(step)
    } else {
        pipeline
    }
}

fn open_run_log(config: &PipelineConfig, category: Category) -> Result<RunLog> {
    let path = config.settings(category).log_path;
    RunLog::create(&path).with_context(|| format!("open run log {}", path.display()))
}

fn run_fetch(mut config: PipelineConfig, category: Category, run: &RunArgs) -> Result<()> {
    run.apply(&mut config, &[category]);
    config.validate()?;
    let catalog = load_catalog(&config)?;

    let provider = Arc::new(YahooProvider::new()?);
    let cap = provider.capability(category);
    let step = IndicatorStep;
    let log = open_run_log(&config, category)?;

    let summary = pipeline(&config, &cap, &step, category).run(
        catalog.instruments(),
        &log,
        &run.cancel_token(),
    );
    print_summary(&summary, &config, category);
    Ok(())
}

fn run_fetch_all(
    mut config: PipelineConfig,
    categories: Vec<Category>,
    run: &RunArgs,
) -> Result<()> {
    let categories = if categories.is_empty() {
        Category::ALL.to_vec()
    } else {
        dedup(categories)
    };
    run.apply(&mut config, &categories);
    config.validate()?;
    let catalog = load_catalog(&config)?;

    let provider = Arc::new(YahooProvider::new()?);
    let caps: Vec<YahooCapability> = categories
        .iter()
        .map(|c| provider.capability(*c))
        .collect();
    let step = IndicatorStep;

    let mut jobs = Vec::with_capacity(categories.len());
    for (cap, category) in caps.iter().zip(&categories) {
        jobs.push(CategoryJob {
            pipeline: pipeline(&config, cap, &step, *category),
            log: open_run_log(&config, *category)?,
        });
    }

    let summaries = run_concurrently(&jobs, catalog.instruments(), &run.cancel_token());
    for summary in &summaries {
        print_summary(summary, &config, summary.category);
    }
    if summaries.len() < jobs.len() {
        bail!(
            "{} of {} category runs aborted",
            jobs.len() - summaries.len(),
            jobs.len()
        );
    }
    Ok(())
}

fn run_watch(
    mut config: PipelineConfig,
    category: Category,
    interval: u64,
    runs: Option<u64>,
    run: &RunArgs,
) -> Result<()> {
    run.apply(&mut config, &[category]);
    config.validate()?;
    let mut instruments: Vec<InstrumentDescriptor> = load_catalog(&config)?.into_instruments();

    let provider = Arc::new(YahooProvider::new()?);
    let cap = provider.capability(category);
    let step = IndicatorStep;
    let pipeline = pipeline(&config, &cap, &step, category);
    // Truncated once; every iteration appends.
    let log = open_run_log(&config, category)?;
    let interval = Duration::from_secs(interval);

    let mut iteration: u64 = 0;
    loop {
        iteration += 1;
        let started = Instant::now();

        match Catalog::from_file(&config.catalog) {
            Ok(catalog) => instruments = catalog.into_instruments(),
            Err(e) => {
                log.error(format_args!("catalog reload failed, keeping previous list: {e}"));
                log::error!("run {iteration}: catalog reload failed: {e}");
            }
        }

        let summary = pipeline.run(&instruments, &log, &run.cancel_token());
        log::info!("run {iteration} finished");
        print_summary(&summary, &config, category);

        if runs.is_some_and(|max| iteration >= max) {
            return Ok(());
        }
        let wait = interval.saturating_sub(started.elapsed());
        log::info!("next {category} run in {}s", wait.as_secs());
        std::thread::sleep(wait);
    }
}

fn run_status(mut config: PipelineConfig, category: Category, paths: &PathArgs) -> Result<()> {
    paths.apply(&mut config);
    let catalog = load_catalog(&config)?;
    let dir = config.settings(category).output_dir;
    let report = scan(&dir, catalog.instruments());

    println!("{category} records in {}", dir.display());
    for state in [
        RecordState::Succeeded,
        RecordState::Failed,
        RecordState::Unreadable,
        RecordState::Missing,
    ] {
        println!("  {:<11} {}", format!("{state:?}:"), report.count(state));
    }
    for state in [RecordState::Failed, RecordState::Unreadable] {
        let symbols = report.symbols_in(state);
        if !symbols.is_empty() {
            println!("{state:?}: {}", symbols.join(", "));
        }
    }
    Ok(())
}

fn run_catalog(mut config: PipelineConfig, sample: bool, paths: &PathArgs) -> Result<()> {
    if sample {
        println!("{}", serde_json::to_string_pretty(&Catalog::sample_tree())?);
        return Ok(());
    }

    paths.apply(&mut config);
    let catalog = load_catalog(&config)?;
    let mut last: Option<(&str, &str)> = None;
    for inst in catalog.instruments() {
        if last != Some((inst.sector.as_str(), inst.domain.as_str())) {
            println!("{} / {}", inst.sector, inst.domain);
            last = Some((inst.sector.as_str(), inst.domain.as_str()));
        }
        println!("  {:<8} {}", inst.symbol, inst.name);
    }
    println!(
        "{} instruments in {} sectors",
        catalog.len(),
        catalog.sector_names().len()
    );
    Ok(())
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let text = PipelineConfig::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &PipelineConfig, category: Category) {
    let settings = config.settings(category);
    println!("{summary}");
    println!("  records: {}", settings.output_dir.display());
    if summary.failed > 0 || summary.write_failures > 0 {
        println!("  errors:  {}", settings.log_path.display());
    }
}

fn dedup(categories: Vec<Category>) -> Vec<Category> {
    let mut out: Vec<Category> = Vec::with_capacity(categories.len());
    for c in categories {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

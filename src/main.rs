//! Tora-Harvest main entry point
//!
//! This is the command-line interface for the Tora-Harvest scraper.

use clap::Parser;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::ExitCode;
use tora_harvest::config::{load_config_with_hash, Config, TargetConfig};
use tora_harvest::crawler::{
    Coordinator, HttpFetcher, HttpSessionFactory, RateLimiter, RunSettings,
};
use tora_harvest::extract::{NextDataExtractor, SkillNames};
use tora_harvest::output::{load_dataset_statistics, print_dataset_statistics, print_statistics};
use tora_harvest::storage::{JsonStore, ResourceCache};
use tora_harvest::{ConfigError, HarvestError};
use tracing_subscriber::EnvFilter;

/// Tora-Harvest: a paced scraper for JavaScript-rendered sites
///
/// Tora-Harvest discovers detail pages on a listing page, fetches them through
/// a small pool of worker threads sharing one rate limiter, and merges the
/// extracted records into deduplicated JSON datasets.
#[derive(Parser, Debug)]
#[command(name = "tora-harvest")]
#[command(version)]
#[command(about = "A paced, fail-soft dataset harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only harvest the named target(s)
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,

    /// Delete the selected targets' datasets before harvesting
    #[arg(long)]
    fresh: bool,

    /// Override the configured worker count
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=32))]
    workers: Option<u32>,

    /// Override the minimum spacing between navigations (milliseconds)
    #[arg(long, value_name = "MS")]
    min_interval: Option<u64>,

    /// Override the random extra delay bound (milliseconds)
    #[arg(long, value_name = "MS")]
    jitter: Option<u64>,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show record counts of the configured datasets and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            match e {
                HarvestError::SessionUnavailable(_) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), HarvestError> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    apply_overrides(&mut config, &cli);
    let targets = select_targets(&config, &cli.only)?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &targets);
        Ok(())
    } else if cli.stats {
        handle_stats(&targets)
    } else {
        handle_harvest(&config, &targets, cli.fresh)
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tora_harvest=info,warn"),
            1 => EnvFilter::new("tora_harvest=debug,info"),
            2 => EnvFilter::new("tora_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .init();
}

/// Applies command-line overrides on top of the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if let Some(min_interval) = cli.min_interval {
        config.crawler.min_interval = min_interval;
    }
    if let Some(jitter) = cli.jitter {
        config.crawler.jitter = jitter;
    }
}

/// Resolves `--only` names to targets; no names selects every target
fn select_targets(config: &Config, only: &[String]) -> Result<Vec<TargetConfig>, HarvestError> {
    if only.is_empty() {
        return Ok(config.targets.clone());
    }

    only.iter()
        .map(|name| {
            config.target(name).cloned().ok_or_else(|| {
                ConfigError::Validation(format!("unknown target '{}'", name)).into()
            })
        })
        .collect()
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config, targets: &[TargetConfig]) {
    println!("=== Tora-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Minimum interval: {}ms", config.crawler.min_interval);
    println!("  Jitter: {}ms", config.crawler.jitter);
    println!("  Retries: {}", config.crawler.retries);
    println!("  Backoff base: {}ms", config.crawler.backoff_base);
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSession:");
    println!("  Server: {}", config.session.server);
    println!("  Locale: {}", config.session.locale);

    println!("\nOutput:");
    println!("  Thumbnails: {}", config.output.thumbs_dir.display());
    for path in &config.output.skill_names {
        println!("  Skill names candidate: {}", path.display());
    }

    println!("\nTargets ({}):", targets.len());
    for target in targets {
        println!("  - {}", target.name);
        println!("    * Listing: {}", target.listing_url);
        println!("    * Detail pattern: {}", target.detail_pattern);
        println!("    * Events: {}", target.events_path.display());
        println!(
            "    * Entities: {} (key {}, fields {}*)",
            target.entities_path.display(),
            target.entity_key,
            target.entity_prefix
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows dataset record counts
fn handle_stats(targets: &[TargetConfig]) -> Result<(), HarvestError> {
    let store = JsonStore::new();
    let stats = load_dataset_statistics(&store, targets)?;
    print_dataset_statistics(&stats);
    Ok(())
}

/// Handles the main harvest operation
fn handle_harvest(config: &Config, targets: &[TargetConfig], fresh: bool) -> Result<(), HarvestError> {
    if targets.is_empty() {
        tracing::warn!("No targets configured; nothing to harvest");
        return Ok(());
    }

    if fresh {
        tracing::info!("Starting fresh harvest (removing existing datasets)");
        for target in targets {
            remove_datasets(target)?;
        }
    }

    // Shared services live for the whole process and are lent to every run
    let user_agent = config.user_agent.header_value();
    let skills = SkillNames::load(&config.output.skill_names);
    let limiter = RateLimiter::new(config.crawler.min_interval(), config.crawler.jitter());
    let store = JsonStore::new();
    let cache = ResourceCache::new(Box::new(HttpFetcher::new(&user_agent)?));
    let factory =
        HttpSessionFactory::new(user_agent, config.crawler.fetch_timeout()).with_pacer(&limiter);

    for target in targets {
        tracing::info!("Harvesting target '{}' from {}", target.name, target.listing_url);

        let extractor = NextDataExtractor::new(target, &skills, &config.session.locale)?;
        let settings = RunSettings::from_config(config, target);
        let coordinator = Coordinator::new(settings, &factory, &extractor, &limiter, &store, &cache);

        let stats = coordinator.run(&target.listing_url)?;
        print_statistics(&target.name, &stats);
    }

    Ok(())
}

fn remove_datasets(target: &TargetConfig) -> Result<(), HarvestError> {
    for path in target.dataset_paths() {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::info!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

//! Opinion-Harvest main entry point
//!
//! This is the command-line interface for the Opinion-Harvest forum crawler.

use anyhow::{bail, Context};
use clap::Parser;
use opinion_harvest::config::{load_config_with_hash, Config, Credentials};
use opinion_harvest::crawler::AbortSignal;
use opinion_harvest::harvest::harvest;
use opinion_harvest::inference::{InferenceClient, ServingStatus};
use opinion_harvest::storage::RunStatus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Opinion-Harvest: an authenticated forum crawler
///
/// Opinion-Harvest logs into a review forum, extracts one opinion record per
/// post and runs every record through language detection, vectorization and
/// persistence. Later runs only pick up posts newer than the stored checkpoint.
#[derive(Parser, Debug)]
#[command(name = "opinion-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An authenticated forum crawler with an enrichment pipeline", long_about = None)]
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

    /// Visit every post, ignoring the last opinion date checkpoint
    #[arg(long)]
    full_scan: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "check_inference", "predict"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "check_inference", "predict"])]
    stats: bool,

    /// Ask the inference service whether it is serving and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "predict"])]
    check_inference: bool,

    /// Classify a review text with the inference service and exit
    #[arg(
        long,
        value_name = "TEXT",
        conflicts_with_all = ["dry_run", "stats", "check_inference"]
    )]
    predict: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.check_inference {
        handle_check_inference(&config).await?;
    } else if let Some(text) = &cli.predict {
        handle_predict(&config, text).await?;
    } else {
        handle_harvest(config, &config_hash, cli.full_scan).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("opinion_harvest=info,warn"),
            1 => EnvFilter::new("opinion_harvest=debug,info"),
            2 => EnvFilter::new("opinion_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Opinion-Harvest Dry Run ===\n");

    println!("Forum:");
    println!("  Base URL: {}", config.forum.base_url);
    println!("  Login page: {}", config.forum.login_path);
    println!("  Opinions page: {}", config.forum.opinions_path);

    println!("\nCrawler Configuration:");
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Download delay: {}ms", config.crawler.download_delay);
    println!("  Full scan delay: {}ms", config.crawler.full_scan_delay);
    println!(
        "  Auto-throttle: {}ms start, {}ms max, target concurrency {}",
        config.crawler.autothrottle_start_delay,
        config.crawler.autothrottle_max_delay,
        config.crawler.autothrottle_target_concurrency
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nKeywords:");
    let keywords = &config.keywords;
    println!("  Excluded ({}): {}", keywords.excluded.len(), keywords.excluded.join(", "));
    println!("  Included ({}): {}", keywords.included.len(), keywords.included.join(", "));

    println!("\nPipeline:");
    println!("  Target language: {}", config.pipeline.target_language);
    println!("  Persist policy: {:?}", config.pipeline.persist_policy);
    println!("  Workers: {}", config.pipeline.workers);
    match &config.pipeline.inference_url {
        Some(url) => println!("  Inference service: {}", url),
        None => println!("  Inference service: none (records stored without vectors)"),
    }

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!("  Base delay: {}s", config.retry.base_delay);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(feed) = &config.output.feed_path {
        println!("  Feed: {}", feed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use opinion_harvest::output::{load_statistics, print_statistics};
    use opinion_harvest::storage::open_storage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

fn inference_client(config: &Config) -> anyhow::Result<InferenceClient> {
    let Some(url) = &config.pipeline.inference_url else {
        bail!("No inference-url configured in [pipeline]");
    };
    let timeout = Duration::from_secs(config.crawler.request_timeout);
    Ok(InferenceClient::new(url, timeout)?)
}

/// Handles the --check-inference mode
async fn handle_check_inference(config: &Config) -> anyhow::Result<()> {
    let client = inference_client(config)?;
    match client.health().await? {
        ServingStatus::Serving => {
            println!("✓ Inference service is serving");
            Ok(())
        }
        ServingStatus::NotServing => bail!("Inference service is not serving"),
    }
}

/// Handles the --predict mode: classifies one review text
async fn handle_predict(config: &Config, text: &str) -> anyhow::Result<()> {
    let client = inference_client(config)?;
    let prediction = client.predict(text).await?;
    println!("Label: {}", prediction.label);
    println!("Confidence: {:.3}", prediction.confidence);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    config_hash: &str,
    full_scan: bool,
) -> anyhow::Result<()> {
    // Credentials are checked before any network activity
    let credentials = Credentials::from_env(&config.credentials)?;

    if full_scan {
        tracing::info!("Starting full scan (ignoring checkpoint)");
    } else {
        tracing::info!("Starting incremental scan");
    }

    let abort = Arc::new(AbortSignal::new());
    let signal = Arc::clone(&abort);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight pages");
            signal.abort();
        }
    });

    let report = harvest(config, config_hash, credentials, full_scan, abort).await?;
    match report.status {
        RunStatus::Completed => {
            tracing::info!(
                "Harvest completed: {} scraped, {} persisted",
                report.metrics.opinions_scraped,
                report.pipeline.persisted
            );
            Ok(())
        }
        RunStatus::Aborted => {
            tracing::warn!("Harvest aborted; {} records persisted", report.pipeline.persisted);
            Ok(())
        }
        RunStatus::Failed | RunStatus::Running => bail!(
            "Harvest failed after {} attempt(s): {}",
            report.attempts,
            report.error.unwrap_or_default()
        ),
    }
}

//! The `catalog-monitor` binary (§6): the operational entry point that
//! wires the full dependency graph — stores, towers, dispatcher, pattern
//! learner, crawler, orchestrator, notification channel — and exposes the
//! run surface as command-line flags rather than subcommands, matching how
//! this system is invoked from a scheduler rather than interactively.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use secrecy::ExposeSecret;

use catalog_crawler::browser::{BrowserExtractor, ProfileManager};
use catalog_crawler::config::default_registry;
use catalog_crawler::notify::TracingNotificationChannel;
use catalog_crawler::{CancellationToken, CatalogCrawler, Config, ExtractionDispatcher, Orchestrator, RateLimiterRegistry, RunRequest};
use catalog_extraction::ai::{HttpLlmProvider, HttpVisionProvider};
use catalog_extraction::markdown::{MarkdownExtractor, MarkdownServiceClient};
use catalog_extraction::stores::SqliteStore;
use catalog_extraction::types::{Lifecycle, RunState, RunType, Tower};
use catalog_extraction::{ExtractionTower, Store, StorePatternLearner};

#[derive(Parser, Debug)]
#[command(name = "catalog-monitor")]
#[command(about = "Retail catalog ingestion and change-detection monitor")]
#[command(version)]
struct Cli {
    /// Run every configured retailer and category.
    #[arg(long)]
    all: bool,

    /// Run only the self-test/component checks, no network access.
    #[arg(long)]
    components_only: bool,

    /// Run only the integration checks against live dependencies.
    #[arg(long)]
    integration_only: bool,

    /// Limit to a single page per retailer/category for a fast smoke check.
    #[arg(long)]
    quick: bool,

    /// Allow the run to hit live retailer sites (default is dry/self-test).
    #[arg(long)]
    include_live: bool,

    /// Run as a scheduled weekly monitoring pass (Monitoring run type).
    #[arg(long)]
    weekly_monitoring: bool,

    /// Establish a new baseline instead of monitoring for changes.
    #[arg(long)]
    baseline: bool,

    /// Comma-separated retailer ids to restrict the run to.
    #[arg(long, value_delimiter = ',')]
    retailers: Vec<String>,

    /// Comma-separated category names to restrict the run to.
    #[arg(long, value_delimiter = ',')]
    categories: Vec<String>,

    /// List CatalogObservations awaiting manual review and exit.
    #[arg(long)]
    pending_reviews: bool,

    /// Write the handed-off batch file to this path instead of the
    /// configured output directory's deterministic name.
    #[arg(long)]
    batch_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&config.database_url).await.context("opening store")?);

    if cli.pending_reviews {
        return print_pending_reviews(store.as_ref(), &cli).await;
    }

    if cli.components_only {
        return run_self_test(store.as_ref()).await;
    }

    let registry = default_registry();

    let retailers = if cli.all || cli.retailers.is_empty() { registry.keys().cloned().collect() } else { cli.retailers.clone() };
    let categories = if cli.categories.is_empty() {
        catalog_crawler::config::DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    } else {
        cli.categories.clone()
    };

    let run_type = if cli.baseline {
        RunType::Baseline
    } else if cli.weekly_monitoring || cli.integration_only {
        RunType::Monitoring
    } else {
        RunType::Recheck
    };

    if !cli.include_live && !cli.integration_only {
        println!("{}", "dry run: pass --include-live or --integration-only to reach live retailer sites".yellow());
        return Ok(());
    }

    let preferred: HashMap<String, Tower> = registry.iter().map(|(id, cfg)| (id.clone(), cfg.preferred_tower)).collect();

    let markdown_client = MarkdownServiceClient::new(config.markdown_service_url.clone(), config.credentials.markdown_service_token.as_ref().map(|t| t.expose_secret().to_string()));
    let primary_llm = Arc::new(HttpLlmProvider::new("primary", config.primary_llm_base_url.clone(), config.primary_llm_model.clone(), config.credentials.primary_llm_api_key.clone()));
    let secondary_llm = Arc::new(HttpLlmProvider::new("secondary", config.secondary_llm_base_url.clone(), config.secondary_llm_model.clone(), config.credentials.secondary_llm_api_key.clone()));
    let markdown_tower: Arc<dyn ExtractionTower> = Arc::new(MarkdownExtractor::new(store.clone(), primary_llm, secondary_llm, markdown_client));

    let vision = Arc::new(HttpVisionProvider::new("vision", config.vision_base_url.clone(), config.vision_model.clone(), config.credentials.vision_api_key.clone()));
    let pattern_learner = Arc::new(StorePatternLearner::new(store.clone()));
    let profiles = ProfileManager::new(config.browser_profile_root.clone());
    let browser_tower: Arc<dyn ExtractionTower> = Arc::new(BrowserExtractor::new(profiles, vision, pattern_learner));

    let dispatcher = Arc::new(ExtractionDispatcher::new(markdown_tower, browser_tower, preferred));
    let rate_limiters = Arc::new(RateLimiterRegistry::new(registry.values().map(|cfg| (cfg.id.clone(), cfg.anti_bot_severity))));
    let crawler = Arc::new(CatalogCrawler::new(dispatcher, store.clone(), rate_limiters));

    let notification_channel = Arc::new(TracingNotificationChannel);
    let output_dir = cli.batch_file.clone().unwrap_or_else(|| std::path::PathBuf::from(&config.output_dir));
    let concurrency_cap = if cli.quick { 1 } else { config.concurrency_cap };

    let orchestrator = Orchestrator::new(registry, crawler, store.clone(), notification_channel, output_dir, concurrency_cap);

    let request = RunRequest { retailers, categories, run_type };
    let run = orchestrator.run(request, CancellationToken::new()).await.context("running monitoring pass")?;

    match run.state {
        RunState::Completed => {
            println!("{} products_crawled={} new={} queued_for_review={}", "run completed".green(), run.products_crawled, run.new_products_found, run.products_queued_for_review);
            Ok(())
        }
        RunState::Partial => {
            println!("{} products_crawled={} new={} errors={}", "run completed with partial failures".yellow(), run.products_crawled, run.new_products_found, run.error_log.len());
            std::process::exit(1);
        }
        RunState::Failed | RunState::Running => {
            println!("{}", "run failed".red());
            std::process::exit(1);
        }
    }
}

async fn print_pending_reviews(store: &dyn Store, cli: &Cli) -> Result<()> {
    let registry = default_registry();
    let retailers = if cli.retailers.is_empty() { registry.keys().cloned().collect::<Vec<_>>() } else { cli.retailers.clone() };
    let categories = if cli.categories.is_empty() {
        catalog_crawler::config::DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    } else {
        cli.categories.clone()
    };

    let mut total = 0usize;
    for retailer in &retailers {
        for category in &categories {
            let observations = store.list_observations_by_lifecycle(retailer, category, Lifecycle::PendingReview).await?;
            for observation in observations {
                total += 1;
                println!("{} {} {} {}", observation.retailer.cyan(), observation.category, observation.title, observation.url);
            }
        }
    }
    println!("{} pending review", total);
    Ok(())
}

async fn run_self_test(store: &dyn Store) -> Result<()> {
    let stats = store.get_statistics().await?;
    println!(
        "{} products={} observations={} active_baselines={} monitoring_runs={}",
        "store reachable".green(),
        stats.product_count,
        stats.observation_count,
        stats.active_baseline_count,
        stats.monitoring_run_count
    );
    Ok(())
}

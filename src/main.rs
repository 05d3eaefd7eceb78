//! Novel-Fetch main entry point
//!
//! A diagnostic command-line tool that builds one site's fetch stack from
//! the configuration file and pushes URLs through it.

use anyhow::{anyhow, Context};
use clap::Parser;
use novel_fetch::config::{load_config_with_hash, Config, SiteConfig};
use novel_fetch::{build_site_fetcher, with_deadline, ConfigError, Fetcher, SiteFetcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Novel-Fetch: a resilient fetch stack for novel sites
///
/// Loads the site configuration, builds the retry, circuit breaker and
/// base fetch layers for one site, and fetches the given URLs concurrently
/// through them.
#[derive(Parser, Debug)]
#[command(name = "novel-fetch")]
#[command(version)]
#[command(about = "Fetch pages through a site's resilient fetch stack", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Name of the site whose fetch stack is used
    #[arg(short, long)]
    site: String,

    /// URLs to fetch
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Deadline for each fetch in milliseconds, retries included
    #[arg(long, value_name = "MS")]
    deadline: Option<u64>,

    /// Validate config and show the site's fetch stack without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let site = find_site(&config, &cli.site)?;
    let urls = parse_urls(&cli.urls)?;

    if cli.dry_run {
        handle_dry_run(site, &urls);
        return Ok(());
    }

    let fetcher = build_site_fetcher(site)
        .with_context(|| format!("failed to build fetch stack for site '{}'", site.name))?;
    handle_fetch(Arc::new(fetcher), urls, cli.deadline.map(Duration::from_millis)).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("novel_fetch=info,warn"),
            1 => EnvFilter::new("novel_fetch=debug,info"),
            2 => EnvFilter::new("novel_fetch=trace,debug"),
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

fn find_site<'a>(config: &'a Config, name: &str) -> Result<&'a SiteConfig, ConfigError> {
    config
        .site(name)
        .ok_or_else(|| ConfigError::UnknownSite(name.to_string()))
}

/// Rejects anything that is not an absolute http(s) URL
fn parse_urls(raw: &[String]) -> anyhow::Result<Vec<Url>> {
    raw.iter()
        .map(|s| {
            let url = Url::parse(s).with_context(|| format!("invalid URL '{}'", s))?;
            match url.scheme() {
                "http" | "https" => Ok(url),
                other => Err(anyhow!("unsupported scheme '{}' in URL '{}'", other, s)),
            }
        })
        .collect()
}

/// Handles the --dry-run mode: shows the fetch stack that would be built
fn handle_dry_run(site: &SiteConfig, urls: &[Url]) {
    println!("=== Novel-Fetch Dry Run ===\n");

    println!("Site: {}", site.name);

    println!("\nDecoder:");
    let method = if site.decoder.method.is_empty() {
        "(pass-through)"
    } else {
        site.decoder.method.as_str()
    };
    println!("  Method: {}", method);

    println!("\nFetcher:");
    println!("  Request timeout: {}ms", site.fetcher.request_timeout);
    if let Some(user_agent) = &site.fetcher.user_agent {
        println!("  User agent: {}", user_agent);
    }

    let breaker = &site.circuit_breaker;
    println!("\nCircuit Breaker:");
    println!("  Open threshold: {}", breaker.open_threshold);
    println!("  Max concurrency: {}", breaker.max_concurrency);
    println!("  Acquire timeout: {}ms", breaker.acquire_timeout);
    println!("  Open duration: {}ms", breaker.open_duration);
    println!("  Recover ladder: {:?}", breaker.recover_ladder);
    println!("  Recover stage duration: {}ms", breaker.recover_stage_duration);
    println!("  Failure checks ({}):", breaker.failure_checks.len());
    for check in &breaker.failure_checks {
        println!("    - {} {}", check.kind, describe_value(check.value.as_ref()));
    }

    match &site.retry {
        Some(retry) => {
            println!("\nRetry:");
            println!("  Max retry weight: {}", retry.max_retry_weight);
            println!("  Conditions ({}):", retry.conditions.len());
            for condition in &retry.conditions {
                println!(
                    "    - {} {} (weight {}, pause {}ms {})",
                    condition.kind,
                    describe_value(condition.value.as_ref()),
                    condition.weight,
                    condition.pause_interval,
                    condition.pause_interval_type
                );
            }
        }
        None => println!("\nRetry: disabled"),
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would fetch {} URLs", urls.len());
}

fn describe_value(value: Option<&toml::Value>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Handles the main fetch operation
async fn handle_fetch(
    fetcher: Arc<SiteFetcher>,
    urls: Vec<Url>,
    deadline: Option<Duration>,
) -> anyhow::Result<()> {
    tracing::info!("Fetching {} URLs from site '{}'", urls.len(), fetcher.name());

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();
    for (index, url) in urls.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let cancel = match deadline {
            Some(after) => with_deadline(&shutdown, after),
            None => shutdown.child_token(),
        };
        tasks.spawn(async move {
            let _deadline = cancel.clone().drop_guard();
            let start = Instant::now();
            let result = fetcher.fetch(&cancel, url.as_str()).await;
            (index, url, result, start.elapsed())
        });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok(outcome)) => outcomes.push(outcome),
                Some(Err(e)) => tracing::error!("Fetch task failed: {}", e),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !shutdown.is_cancelled() => {
                tracing::warn!("Interrupted, cancelling outstanding fetches");
                shutdown.cancel();
            }
        }
    }
    outcomes.sort_by_key(|(index, ..)| *index);

    let mut failures = 0;
    for (_, url, result, elapsed) in &outcomes {
        match result {
            Ok(body) => println!("OK   {} ({} chars, {:?})", url, body.chars().count(), elapsed),
            Err(e) => {
                failures += 1;
                println!("FAIL {} ({}, {:?})", url, e, elapsed);
            }
        }
    }

    let snapshot = fetcher.snapshot();
    println!(
        "\nCircuit: {} (failures: {}, half-open level: {}, available permits: {})",
        snapshot.status,
        snapshot.failure_count,
        snapshot.half_open_level,
        snapshot.available_permits
    );

    if failures > 0 {
        return Err(anyhow!("{} of {} fetches failed", failures, outcomes.len()));
    }

    tracing::info!("All fetches completed successfully");
    Ok(())
}

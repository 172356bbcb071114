//! rowline - Drive delimited-text objects through a processing API
//!
//! Reads an object from a filesystem or HTTP object store, splits it
//! into rows, and submits them downstream with retry, circuit-breaker,
//! and adaptive batch sizing. One invocation processes one object.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rowline_core::{CircuitBreaker, RetryPolicy, init_logging};
use rowline_engine::{
    FsObjectStore, HttpObjectStore, HttpProcessApi, ObjectStore, ProcessApi, ProcessingOrchestrator,
    ResilientApi, SimulatedApi, handle,
};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rowline")]
#[command(about = "Drive delimited-text objects through a processing API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress everything below warnings
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./rowline.toml or ~/.config/rowline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Process one object and print the invocation response
    Process(ProcessArgs),
    /// Show current configuration
    Config,
}

#[derive(clap::Args)]
struct ProcessArgs {
    /// Bucket holding the object
    #[arg(required_unless_present = "event")]
    bucket: Option<String>,

    /// Object key within the bucket
    #[arg(required_unless_present = "event")]
    key: Option<String>,

    /// Read a full invocation event from a JSON file instead ("-" for stdin)
    #[arg(long, conflicts_with_all = ["bucket", "key"])]
    event: Option<PathBuf>,

    /// Processing priority: high, standard, or low
    #[arg(long, default_value = "standard")]
    priority: String,

    /// Explicit batch size (otherwise derived from object size and priority)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Submit rows one at a time instead of concurrently
    #[arg(long)]
    sequential: bool,

    /// Disable batch submission (rows go to the per-row endpoint)
    #[arg(long)]
    no_batch: bool,

    /// Stream the object in segments instead of one full read
    #[arg(long)]
    chunked: bool,

    /// Worker threads for concurrent mode (default from config)
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.debug);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Process(args) => process(args, &config),
        Command::Config => {
            eprintln!("store backend:     {}", config.store.backend);
            eprintln!("store root:        {}", config.store.root.display());
            eprintln!("store base URL:    {}", config.store.base_url);
            eprintln!("api backend:       {}", config.api.backend);
            eprintln!("api base URL:      {}", config.api.base_url);
            eprintln!(
                "api key:           {}",
                if config.api.api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                }
            );
            eprintln!("api timeout:       {}s", config.api.timeout_secs);
            eprintln!("retry attempts:    {}", config.retry.max_attempts);
            eprintln!("backoff factor:    {}", config.retry.backoff_factor);
            eprintln!("breaker threshold: {}", config.breaker.failure_threshold);
            eprintln!(
                "breaker reset:     {}s",
                config.breaker.reset_timeout_secs
            );
            eprintln!(
                "workers:           {} (max: {})",
                config.workers.default, config.workers.max
            );
            Ok(())
        }
    }
}

fn process(args: ProcessArgs, config: &Config) -> Result<()> {
    let event = build_event(&args)?;

    let store: Arc<dyn ObjectStore> = match config.store.backend.as_str() {
        "fs" => Arc::new(FsObjectStore::new(config.store.root.clone())),
        "http" => Arc::new(HttpObjectStore::new(config.store.base_url.clone())),
        other => bail!("unknown store backend: {other} (expected \"fs\" or \"http\")"),
    };

    let api: Arc<dyn ProcessApi> = match config.api.backend.as_str() {
        "simulated" => Arc::new(SimulatedApi::default()),
        "http" => Arc::new(HttpProcessApi::new(
            config.api.base_url.clone(),
            config.api.api_key.clone(),
            Duration::from_secs(config.api.timeout_secs),
        )),
        other => bail!("unknown api backend: {other} (expected \"simulated\" or \"http\")"),
    };

    let resilient = ResilientApi::new(
        api,
        Arc::new(CircuitBreaker::new(
            "process-api",
            config.breaker.failure_threshold,
            config.breaker.reset_timeout(),
        )),
        RetryPolicy::new(config.retry.max_attempts, config.retry.backoff_factor),
    );

    let workers = args
        .workers
        .unwrap_or(config.workers.default)
        .min(config.workers.max);
    let orchestrator = ProcessingOrchestrator::new(store, resilient, workers);

    let response = handle(&event, &orchestrator);
    println!("{}", serde_json::to_string_pretty(&response.to_json())?);

    if response.status_code != 200 {
        bail!("processing failed with status {}", response.status_code);
    }
    Ok(())
}

/// Assemble the invocation event from a file, stdin, or the flags.
fn build_event(args: &ProcessArgs) -> Result<serde_json::Value> {
    if let Some(path) = &args.event {
        let content = if path.as_os_str() == "-" {
            std::io::read_to_string(std::io::stdin()).context("Failed to read event from stdin")?
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read event file: {}", path.display()))?
        };
        return serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse event JSON: {}", path.display()));
    }

    let now = chrono::Utc::now();
    let (Some(bucket), Some(key)) = (&args.bucket, &args.key) else {
        bail!("bucket and key are required without --event");
    };
    let mut options = serde_json::json!({
        "useAsync": !args.sequential,
        "useBatch": !args.no_batch,
        "priority": args.priority,
        "chunkedProcessing": args.chunked,
    });
    if let Some(batch_size) = args.batch_size {
        options["batchSize"] = batch_size.into();
    }
    Ok(serde_json::json!({
        "bucket": bucket,
        "key": key,
        "source": "rowline-cli",
        "time": now.to_rfc3339(),
        "id": format!("cli-{}", now.timestamp_millis()),
        "options": options,
    }))
}

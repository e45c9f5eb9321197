//! Quill - command line driver
//!
//! Runs the gateway operations from the command line. Output is JSON on
//! stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use quill_common::{init_tracing, ClientId, JobId, QuillError};
use quill_config::{Config, StoreBackend};
use quill_gateway::{ErrorResponse, Gateway, GenerateRequest};

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (TOML or JSON)
    #[arg(short = 'c', long = "config", env = "QUILL_CONFIG", global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file and exit
    Test,

    /// Generate an answer synchronously
    Generate {
        /// Client identifier used for rate limiting
        #[arg(long = "client", env = "QUILL_CLIENT_ID")]
        client: String,

        /// Number of sentences to return
        #[arg(short = 'n', long = "sentences", default_value_t = 3)]
        sentences: u32,

        prompt: String,
    },

    /// Submit a job, run workers in-process and wait for its outcome
    Submit {
        /// Client identifier used for rate limiting
        #[arg(long = "client", env = "QUILL_CLIENT_ID")]
        client: String,

        /// Number of sentences to return
        #[arg(short = 'n', long = "sentences", default_value_t = 3)]
        sentences: u32,

        /// Delay between polls
        #[arg(long = "poll-interval-ms", default_value_t = 500)]
        poll_interval_ms: u64,

        /// Give up waiting after this long
        #[arg(long = "wait-secs", default_value_t = 300)]
        wait_secs: u64,

        prompt: String,
    },

    /// Show the record of a job kept in the shared store
    Status { job_id: String },

    /// Check that the shared store is reachable
    Health,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    init_tracing(default_level)?;

    let config = load_config(cli.config.as_deref())?;

    if let Commands::Test = cli.command {
        return test_config(&config, cli.config.as_deref());
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    rt.block_on(run(cli.command, config))
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            info!(path = %path, "Loading configuration file");
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => {
            info!("Using embedded default configuration");
            Config::default_embedded().context("Failed to load embedded configuration")?
        }
    };
    Ok(config.with_env_overrides())
}

/// Validate configuration and exit
fn test_config(config: &Config, path: Option<&str>) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        store = ?config.store.backend,
        strategy = ?config.rate_limit.strategy,
        model = %config.backend.model,
        "Configuration test successful"
    );

    println!(
        "quill: configuration file {} test is successful",
        path.unwrap_or("(embedded)")
    );
    Ok(())
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let gateway = Gateway::connect(config).await?;

    match command {
        Commands::Test => Ok(()),
        Commands::Generate {
            client,
            sentences,
            prompt,
        } => {
            let result = gateway
                .generate(&ClientId::new(client), GenerateRequest::new(prompt, sentences))
                .await;
            emit(result)
        }
        Commands::Submit {
            client,
            sentences,
            poll_interval_ms,
            wait_secs,
            prompt,
        } => {
            gateway.spawn_workers();
            let result = submit_and_wait(
                &gateway,
                ClientId::new(client),
                GenerateRequest::new(prompt, sentences),
                Duration::from_millis(poll_interval_ms),
                Duration::from_secs(wait_secs),
            )
            .await;
            gateway.shutdown().await;
            emit(result)
        }
        Commands::Status { job_id } => {
            if gateway.config().store.backend == StoreBackend::Memory {
                warn!("The memory store is empty in a new process; configure a redis store to look up jobs");
            }
            let job_id: JobId = job_id.parse().context("Invalid job id")?;
            emit(gateway.poll(&job_id).await)
        }
        Commands::Health => {
            let report = gateway.health().await;
            let healthy = report.healthy;
            print_json(&report)?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn submit_and_wait(
    gateway: &Gateway,
    client: ClientId,
    request: GenerateRequest,
    poll_interval: Duration,
    wait: Duration,
) -> Result<quill_gateway::JobStatusResponse, QuillError> {
    let submitted = gateway.submit(&client, request).await?;
    info!(job_id = %submitted.job_id, "Waiting for job");

    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let status = gateway.poll(&submitted.job_id).await?;
        if status.status.is_terminal() || tokio::time::Instant::now() >= deadline {
            return Ok(status);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn emit<T: Serialize>(result: Result<T, QuillError>) -> Result<()> {
    match result {
        Ok(body) => print_json(&body),
        Err(e) => {
            warn!(error = %e, "Request failed");
            print_json(&ErrorResponse::from(&e))?;
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", text);
    Ok(())
}

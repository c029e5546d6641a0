//! Mentoring invoice builder.
//!
//! Builds the monthly invoice of a mentor:
//! - Session feed ingestion for the billing month
//! - Financing status lookup for every student seen
//! - Pricing and a text or HTML billing report

mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use invoice_core::{Invoice, StudentRegistry};
use platform_client::{Connector, Credentials, HttpProfileSource, HttpSessionFeed, PlatformConfig};
use telemetry::{init_tracing_from_env, metrics};
use worker::{BillingWindow, EnrichmentConfig, EnrichmentWorker, IngestionPipeline, PipelineConfig};

/// Creates a mentoring invoice.
#[derive(Debug, Parser)]
#[command(name = "mentor-invoice", version, about)]
struct Args {
    /// Month number (1-12), defaults to the current month
    #[arg(value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Option<u32>,

    /// Print a plain text report instead of HTML
    #[arg(long)]
    text: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Concurrent profile lookups
    #[arg(long, env = "INVOICE_WORKERS")]
    workers: Option<usize>,
}

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    platform: PlatformConfig,

    #[serde(default)]
    pipeline: PipelineConfig,

    #[serde(default)]
    enrichment: EnrichmentConfig,

    /// Keep known students between runs
    #[serde(default = "default_persistent_students")]
    persistent_students: bool,

    #[serde(default = "default_students_path")]
    students_path: PathBuf,
}

fn default_persistent_students() -> bool {
    true
}

fn default_students_path() -> PathBuf {
    PathBuf::from("students.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            pipeline: PipelineConfig::default(),
            enrichment: EnrichmentConfig::default(),
            persistent_students: default_persistent_students(),
            students_path: default_students_path(),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing_from_env(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("An error occurred: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Starting mentor-invoice v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config()?;
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }

    let today = Utc::now();
    let month = args.month.unwrap_or_else(|| today.month());
    let window = BillingWindow::for_month(today.year(), month)?;

    let started = Instant::now();

    let connector = Arc::new(
        Connector::connect(config.platform.clone(), Credentials::from_env())
            .await
            .context("Failed to connect to the platform")?,
    );

    let registry = if config.persistent_students {
        StudentRegistry::persistent(&config.students_path)
            .context("Failed to load the student snapshot")?
    } else {
        StudentRegistry::new()
    };

    let pipeline = IngestionPipeline::with_config(
        Arc::new(HttpSessionFeed::new(connector.clone())),
        Arc::new(HttpProfileSource::new(connector)),
        config.pipeline.clone(),
    )
    .with_enrichment(EnrichmentWorker::with_config(config.enrichment.clone())?);

    let cancel = pipeline.cancellation_token();
    let shutdown = tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let outcome = pipeline.run(window, registry).await;
    shutdown.abort();
    let outcome = outcome.context("Failed to collect sessions")?;

    let invoice = Invoice::build(&outcome.aggregate, started.elapsed())
        .with_context(|| format!("No session found for {}-{:02}", window.year(), month))?;

    let report = if args.text {
        render::render_text(&invoice)
    } else {
        render::render_html(&invoice)
    };
    println!("{report}");

    let snapshot = metrics().snapshot();
    info!(metrics = ?snapshot, "Run metrics");

    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("INVOICE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    config.platform.validate()?;
    Ok(config)
}

/// Cancels the run on Ctrl+C or SIGTERM.
async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }

    cancel.cancel();
}

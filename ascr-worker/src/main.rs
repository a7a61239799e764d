//! ascr-worker - curation job runner
//!
//! Curates the articles given on the command line, one task per file, and
//! saves the curated records as drafts under the data root. Progress is
//! logged and, when `curation.relay_url` is configured, relayed as JSON to
//! whoever serves live subscribers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ascr_common::config::{resolve_root_folder, AscrConfig, ROOT_ENV_VAR};
use ascr_common::db::init_database;
use ascr_store::{FileRecordStore, IdentityRule};
use ascr_tasks::{PublisherSet, RelayPublisher, TaskProgressTracker};
use ascr_worker::pipeline::DEFAULT_INSTRUCTIONS;
use ascr_worker::{CurationWorker, HttpCurationPipeline};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Command-line arguments for ascr-worker
#[derive(Parser, Debug)]
#[command(name = "ascr-worker")]
#[command(about = "Curation worker for ASCR")]
#[command(version)]
struct Args {
    /// Data root (records, task database)
    #[arg(short, long)]
    root_folder: Option<String>,

    /// TOML configuration file
    #[arg(short, long, env = "ASCR_CONFIG")]
    config: Option<PathBuf>,

    /// Re-run tasks from their retained input
    #[arg(long = "retry", value_name = "TASK_ID")]
    retry: Vec<String>,

    /// Remove expired task rows before running
    #[arg(long)]
    purge: bool,

    /// Articles to curate
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting ascr-worker");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = AscrConfig::load_or_default(args.config.as_deref());
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_ENV_VAR, args.config.as_deref());
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let store = FileRecordStore::from_settings(root_folder.join("data"), &config.store)
        .context("Invalid store settings")?;

    // Stage transitions are already logged by the tracker
    let mut publishers = PublisherSet::new();
    let relay = config.curation.relay_url.as_ref().map(|url| {
        info!("Relaying progress events to {}", url);
        RelayPublisher::spawn(url.clone(), config.tasks.event_capacity)
    });
    if let Some(relay) = &relay {
        publishers = publishers.with(Arc::new(relay.clone()));
    }

    let db_path = root_folder.join("tasks.db");
    info!("Task database: {}", db_path.display());
    let pool = init_database(&db_path).await.context("Failed to open task database")?;
    let tracker = Arc::new(
        TaskProgressTracker::open(pool, config.tasks.clone(), Arc::new(publishers))
            .await
            .context("Failed to initialize task tracker")?,
    );

    if args.purge {
        let summary = tracker.purge_expired().await?;
        info!("Purged {} expired task row(s)", summary.total());
    }

    let pipeline = HttpCurationPipeline::new(
        config.curation.endpoint.clone(),
        Duration::from_secs(config.curation.request_timeout_secs),
    )?;
    let instructions = load_instructions(config.curation.instructions_path.as_deref());
    let worker = CurationWorker::new(
        tracker,
        Arc::new(store),
        Arc::new(pipeline),
        IdentityRule::from_settings(&config.store),
        instructions,
    );

    let mut task_ids = Vec::new();
    for task_id in &args.retry {
        match worker.retry(task_id).await {
            Ok(new_task_id) => task_ids.push(new_task_id),
            Err(e) => warn!("Cannot retry task {}: {}", task_id, e),
        }
    }
    for path in &args.files {
        let document = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        task_ids.push(worker.submit(&label, &document).await?);
    }

    if task_ids.is_empty() {
        info!("Nothing to curate");
    }
    for task_id in &task_ids {
        let result = worker.run(task_id).await?;
        info!(task_id = %task_id, "Result: {}", result);
    }

    if let Some(relay) = relay {
        if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, relay.close()).await.is_err() {
            warn!("Relay did not drain within {:?}; remaining events dropped", RELAY_DRAIN_TIMEOUT);
        }
    }
    info!("Worker finished {} task(s)", task_ids.len());
    Ok(())
}

fn load_instructions(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_INSTRUCTIONS.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot read instructions {}: {}; using built-in instructions", path.display(), e);
            DEFAULT_INSTRUCTIONS.to_string()
        }
    }
}

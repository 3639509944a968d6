//! `medialibd`: runs the scan, import, export, retention and janitor
//! loops for every configured endpoint until interrupted.

use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::Parser;

use medialib::logging;
use medialib::{
    default_export_handlers, default_import_handlers, load_config, Database, EndpointRegistry,
    WorkerContext, WorkerPool,
};

#[derive(Parser, Debug)]
#[command(name = "medialibd", version, about = "Media library job daemon")]
struct Args {
    /// Path to the YAML config file
    #[arg(short, long, env = "MEDIALIB_CONFIG")]
    config: PathBuf,

    /// Database path; overrides `database_path` in the config
    #[arg(long, env = "MEDIALIB_DATABASE")]
    database: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = logging::DEFAULT_FILTER)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args.log_level, args.json_logs).context("Failed to initialize logging")?;

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let db_path = args
        .database
        .clone()
        .or_else(|| config.database_path())
        .context("No database path configured and no home directory found")?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let registry = EndpointRegistry::new(config.endpoints.clone())?;
    log::info!("Loaded {} endpoint(s)", registry.len());

    let ctx = WorkerContext::new(
        db,
        registry,
        default_import_handlers(),
        default_export_handlers(),
    )
    .with_intervals(config.intervals.clone())
    .with_retention(config.retention.clone());

    let pool = WorkerPool::start(ctx)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to install signal handler")?;

    log::info!("medialibd running, press Ctrl-C to stop");
    // A closed channel also means the handler is gone; stop either way.
    let _ = rx.recv();

    log::info!("Shutting down workers");
    pool.shutdown();
    pool.wait();
    log::info!("Stopped");

    Ok(())
}

//! Process-wide logging setup.
//!
//! Library code logs through the `log` macros and opens `tracing` spans;
//! [`init`] installs one `tracing` subscriber and routes `log` records
//! into it.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the caller gives one.
pub const DEFAULT_FILTER: &str = "medialib=info,medialibd=info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// `RUST_LOG` when set, else `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs the global subscriber. Call once, early in `main`.
pub fn init(filter: &str, json: bool) -> Result<(), LoggingError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_target(true)
        .with_thread_names(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    tracing_log::LogTracer::init()?;

    Ok(())
}

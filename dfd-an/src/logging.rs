//! Tracing setup
//!
//! Configuration is resolved before the final subscriber can be built (the
//! level and log file come from it), so resolution runs under a scoped
//! bootstrap subscriber that writes to stderr at the command-line level.

use anyhow::{Context, Result};
use dfd_common::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` if set, else `level` for our crates and `info` for tower-http
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dfd_an={0},dfd_common={0},tower_http=info", level).into())
}

/// Subscriber used while the configuration is being resolved
pub fn bootstrap_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
}

/// Install the global subscriber; writes to a file when configured
pub fn init(logging: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&logging.level);

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

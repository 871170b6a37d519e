//! dfd-an - Video authenticity analysis microservice
//!
//! Accepts a video file, runs it through upload, a staged multi-evaluator
//! analysis and aggregation, and streams progress over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;

use dfd_an::config::{CliOverrides, ServiceConfig};
use dfd_an::logging;
use dfd_an::services::{InputGate, JsonReportExporter, WorkflowOrchestrator};
use dfd_an::AppState;
use dfd_common::config::{CompiledDefaults, RootFolderInitializer};
use dfd_common::events::EventBus;

/// Command-line arguments for dfd-an
#[derive(Parser, Debug)]
#[command(name = "dfd-an")]
#[command(about = "Video authenticity analysis microservice")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "DFD_AN_PORT")]
    port: Option<u16>,

    /// Root folder for reports
    #[arg(short, long, env = "DFD_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (default: ~/.config/dfd/dfd-an.toml)
    #[arg(short, long, env = "DFD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let bootstrap_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().log_level);
    let bootstrap = logging::bootstrap_subscriber(logging::env_filter(&bootstrap_level), std::io::stderr);
    let config = tracing::subscriber::with_default(bootstrap, || {
        ServiceConfig::resolve(&CliOverrides {
            port: args.port,
            root_folder: args.root_folder,
            log_level: args.log_level,
            config: args.config,
        })
    })
    .context("Failed to load configuration")?;

    logging::init(&config.logging)?;

    info!("Starting dfd-an (Analysis) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config.config_path {
        info!("Config file: {}", path.display());
    }

    let initializer = RootFolderInitializer::new(config.root_folder.clone());
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Root folder: {}", initializer.root_folder().display());

    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    let orchestrator = Arc::new(WorkflowOrchestrator::from_settings(&config.analysis, event_bus));
    info!(
        evaluators = ?orchestrator.evaluator_names(),
        failure_policy = ?config.analysis.failure_policy,
        "Analysis workflow ready"
    );

    let state = AppState::new(
        orchestrator,
        InputGate::new(config.analysis.max_upload_bytes),
        Arc::new(JsonReportExporter::new(initializer.reports_path())),
    );

    let app = dfd_an::build_router(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop a run still in flight so its task does not outlive the server
    state.orchestrator.session().cancel().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

//! ldfleet server entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ldfleet::core::{AppConfig, APP_NAME, VERSION};
use ldfleet::{api, build_orchestrator};

#[derive(Parser, Debug)]
#[command(name = "ldfleet", version, about = "REST control plane for LDPlayer instances")]
struct Args {
    /// Configuration file; defaults to the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `server.bind`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let args = Args::parse();
    info!("{} v{} starting...", APP_NAME, VERSION);

    let mut config = match args.config {
        Some(ref path) => AppConfig::load_from(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load().await.context("Failed to load config")?,
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let cancel = CancellationToken::new();
    let orchestrator = build_orchestrator(&config, cancel.clone());
    info!("Using console at {}", orchestrator.console().program().display());
    let app = api::router(orchestrator);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .context("Server error")?;

    info!("{} stopped", APP_NAME);
    Ok(())
}

/// Resolve on Ctrl-C and cancel every in-flight wait
async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    cancel.cancel();
}

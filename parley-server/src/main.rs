//! Parley server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley_core::ParleyConfig;
use parley_server::{AppState, backends, serve};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "parley-server")]
#[command(about = "Dialogue backend for game NPCs", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "parley.toml")]
    config: PathBuf,

    /// Listen port, overriding configuration and SERVER_PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_found = cli.config.exists();
    let mut config = if file_found {
        ParleyConfig::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        ParleyConfig::default()
    };
    config.apply_env().context("applying environment overrides")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter())),
        )
        .init();

    if !file_found {
        warn!(path = %cli.config.display(), "Config file not found; using defaults");
    }

    for dir in config.paths.writable_dirs() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let dispatcher = backends::build_dispatcher(&config, |var| std::env::var(var).ok())
        .context("configuring backends")?;
    let state = AppState::new(Arc::new(dispatcher));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    serve(listener, state, shutdown_signal()).await?;
    info!("Parley server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use std::env;
use std::net::SocketAddr;
use tracing::info;

use homecare_server::{create_app, logging, AppConfig, HomeCareServer};

/// HomeCare Engine HTTP + WebSocket server
#[derive(Parser, Debug)]
#[command(name = "homecare-server")]
#[command(about = "Care workflow orchestration API server")]
struct Args {
    /// Configuration file path (optional; environment variables override it)
    #[arg(short, long, env = "HOMECARE_CONFIG")]
    config: Option<String>,

    /// Override `server.host`
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = dotenvy::dotenv();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let production = env::var("HOMECARE_ENV").is_ok_and(|value| value == "production");
    let json_logs = production || config.logging.json;
    logging::init_tracing(args.verbose, json_logs)?;
    if !json_logs {
        logging::print_startup_banner();
    }

    info!("{}", format!("Starting {}", config.server.name).bright_cyan());
    info!(version = env!("CARGO_PKG_VERSION"), "Build");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.server.host, config.server.port))?;

    let server = HomeCareServer::new(config).await?;
    let app = create_app(server);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!("{}", format!("HomeCare Engine running on http://{addr}").bright_green());
    info!("{}", format!("Health check: http://{addr}/health").bright_blue());
    info!("{}", format!("API v1: http://{addr}/api/v1").bright_blue());
    info!("{}", format!("Real-time channel: ws://{addr}/ws").bright_blue());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

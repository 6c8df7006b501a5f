//! Archon binary — thin CLI shell over the [`archon_server`] library crate.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use archon_server::config::Config;
use archon_server::AppState;

/// Archon — forensic document investigation platform: ingestion pipeline and hybrid retrieval API.
#[derive(Parser)]
#[command(name = "archon", version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to built-in defaults + env vars)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind to 0.0.0.0 instead of the configured/default host
    #[arg(long)]
    bind_all: bool,

    /// Override the listening port
    #[arg(long)]
    port: Option<u16>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down..."),
        _ = terminate => info!("received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("archon_server=info".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config)?;
    if cli.bind_all {
        config.bind_addr = "0.0.0.0".to_string();
    }
    if let Some(port) = cli.port {
        config.port = Some(port);
    }
    let port = config.port.unwrap_or(8080);
    let bind_addr = config.bind_addr.clone();

    let state = AppState::new(config).await.map_err(|e| {
        error!(error = %e, "failed to initialize application state");
        e
    })?;

    // Periodic sweep of expired/overflowing chat sessions (spec §5), mirroring
    // the background cleanup loop the teacher runs for its file watcher.
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            if let Ok(mut sessions) = cleanup_state.chat_sessions.lock() {
                sessions.evict_expired(std::time::Instant::now());
            }
        }
    });

    let app = archon_server::routes::build(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{bind_addr}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Archon listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

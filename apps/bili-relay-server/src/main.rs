//! Bili Relay Server
//!
//! Relays chunked video uploads to bilibili and publishes them.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bili_relay_server::config::Config;
use bili_relay_server::remote::{BilibiliClient, RemoteUploadClient};
use bili_relay_server::routes;
use bili_relay_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "bili_relay_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Bili Relay Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform base URL: {}", config.bilibili.base_url);
    tracing::info!(
        ttl_secs = config.upload.session_ttl_secs,
        sweep_secs = config.upload.sweep_interval_secs,
        renew_on_chunk = config.upload.renew_on_chunk,
        "Session expiry policy"
    );

    let remote = BilibiliClient::new(&config.bilibili).context("failed to build platform client")?;
    if !remote.is_authenticated() {
        tracing::warn!("No platform credentials configured; uploads will be rejected upstream");
    }

    let app_state = AppState::new(config.clone(), Arc::new(remote));

    // Session reaper, stopped on shutdown
    let cancel = CancellationToken::new();
    let reaper = app_state
        .sessions()
        .clone()
        .start_cleanup_task(config.upload.sweep_interval(), cancel.clone());

    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("Bili Relay Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancel.cancel();
    if let Err(e) = reaper.await {
        tracing::warn!("Session reaper ended abnormally: {}", e);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

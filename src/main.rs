//! Arena Matchmaker - headless matchmaking server
//!
//! Runs both providers against the log-only world backend and exposes:
//! - A public health check
//! - Admin endpoints for provider stats, running matches and stopping a match

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_matchmaker::app::{AppState, Registry, Services};
use arena_matchmaker::config::Config;
use arena_matchmaker::game::ArenaCatalog;
use arena_matchmaker::headless::{HeadlessLobby, HeadlessWorld, LogScoreboard};
use arena_matchmaker::http::build_router;
use arena_matchmaker::notify::{LogNotifier, Notifier, WebhookNotifier};
use arena_matchmaker::rating::MemoryRatingStore;
use arena_matchmaker::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting Arena Matchmaker");
    info!("Server address: {}", config.server_addr);

    let arenas = ArenaCatalog::load_dir(&config.arena_dir)?;
    config.check_arena_fit(&arenas)?;
    if arenas.is_empty() {
        warn!(dir = %config.arena_dir.display(), "No arenas loaded, every match will fail to start");
    } else {
        info!(count = arenas.len(), "Arenas loaded");
    }

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering match events to webhook");
            Arc::new(WebhookNotifier::new(url.clone(), config.webhook_secret.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    let services = Services {
        registry: Arc::new(Registry::new()),
        world: Arc::new(HeadlessWorld),
        lobby: Arc::new(HeadlessLobby::default()),
        scoreboard: Arc::new(LogScoreboard),
        ratings: Arc::new(MemoryRatingStore::default()),
        notifier,
        arenas: Arc::new(arenas),
    };

    let state = AppState::new(config.clone(), services);
    let matchmaking = state.matchmaking.clone();
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    matchmaking.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}

//! bookfeed - order book feed handler
//!
//! Connects to the exchange websocket feed, maintains per-symbol L3
//! book state, and publishes consistent snapshots over IPC.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookfeed::normalizer::StatsSnapshot;
use bookfeed::orderbook::BookRegistry;
use bookfeed::websocket::FeedSession;
use bookfeed::{AppState, Config, FeedNormalizer, Publisher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting bookfeed feed handler");

    let config = Arc::new(Config::load()?);
    info!(products = ?config.products, channels = ?config.channels, "Configuration loaded");

    let registry = Arc::new(BookRegistry::new());
    let normalizer = Arc::new(FeedNormalizer::new(registry));

    let publisher = config
        .ipc_socket_path
        .as_deref()
        .map(|path| Arc::new(Publisher::new(path)));

    let state = Arc::new(AppState {
        normalizer: normalizer.clone(),
        config: config.clone(),
    });

    // Health/stats HTTP surface
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Periodic book status logging
    let status_state = state.clone();
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(status_state.config.status_interval_secs);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for snapshot in status_state
                .normalizer
                .registry()
                .snapshot_all(status_state.config.depth_levels)
            {
                if let Some(mid) = snapshot.metrics.midpoint {
                    info!(
                        symbol = %snapshot.symbol,
                        midpoint = %mid,
                        spread_bps = ?snapshot.metrics.spread_bps,
                        imbalance = %snapshot.metrics.imbalance,
                        levels = snapshot.metrics.bid_levels + snapshot.metrics.ask_levels,
                        "Book status"
                    );
                }
            }
        }
    });

    let (session, handle) = FeedSession::new(config.clone(), normalizer, publisher);
    for product in &config.products {
        handle.subscribe(product, &config.channels)?;
    }

    let session_task = tokio::spawn(session.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.close()?;
    session_task.await??;

    Ok(())
}

/// HTTP server exposing liveness and feed counters
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .with_state(state);

    info!(addr = %addr, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "bookfeed",
        "ready": state.normalizer.is_ready(),
        "symbols": state.normalizer.registry().symbols(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.normalizer.stats())
}

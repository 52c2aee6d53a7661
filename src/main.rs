use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use termbingo::{api, broadcast, config::GameConfig, inventory::TermInventory, state::AppState, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "termbingo=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting termbingo...");

    let config = GameConfig::from_env();

    let inventory = match &config.terms_file {
        Some(path) => match TermInventory::from_json_file(path) {
            Ok(inventory) => inventory,
            Err(e) => {
                tracing::warn!(
                    "Failed to load terms from {}: {}. Using built-in catalog.",
                    path.display(),
                    e
                );
                TermInventory::builtin()
            }
        },
        None => TermInventory::builtin(),
    };
    if let Err(e) = inventory.ensure_playable() {
        tracing::warn!("{}. Rooms cannot be created until the catalog is fixed.", e);
    }

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(inventory, config));

    // Polling fallback for participants that missed a room notification
    broadcast::spawn_reconcile_poller(state.clone());

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

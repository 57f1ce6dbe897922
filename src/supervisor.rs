//! Supervisor (C8): startup, HTTP/WS bind, the reaper task, and graceful
//! drain on SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::time::interval;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::connection::handle_socket;
use crate::registry::NetworkRegistry;
use crate::store;

#[derive(Clone)]
struct AppState {
    registry: Arc<NetworkRegistry>,
}

pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let pool = store::connect(&config.db_path).await?;
    store::run_migrations(&pool).await?;

    let registry = Arc::new(NetworkRegistry::new(pool, config.clone()));
    registry.load_from_store().await?;

    let reaper_registry = registry.clone();
    let cleanup_interval = config.cleanup_interval;
    let expiry_days = config.network_expiry_days;
    let reaper = tokio::spawn(async move {
        let mut ticker = interval(cleanup_interval);
        loop {
            ticker.tick().await;
            let cutoff = now_secs() - expiry_days * 86_400;
            match reaper_registry.reap_expired(cutoff).await {
                Ok(removed) if !removed.is_empty() => {
                    info!(count = removed.len(), "reaped expired networks");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "reaper pass failed"),
            }
        }
    });

    let state = AppState { registry: registry.clone() };
    let app = Router::new()
        .route(&config.ws_path, get(ws_handler))
        .route("/health", get(health))
        .layer(cors_layer(config.allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "hub listening");

    let drain_registry = registry.clone();
    let drain_timeout = config.drain_timeout;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_registry, drain_timeout))
        .await?;

    reaper.abort();
    Ok(())
}

/// Origin policy per spec §6: configurable, default allow-any.
fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    match allowed_origins {
        None => CorsLayer::permissive(),
        Some(list) => {
            let origins: Vec<_> = list
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
    }
}

async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let client_id = headers
        .get("X-Client-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let agent = headers
        .get("Computer-Agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    debug!(computer_agent = agent, "websocket upgrade requested");
    let max_message_bytes = state.registry.config().read_buffer_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state.registry, client_id))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn shutdown_signal(registry: Arc<NetworkRegistry>, drain_timeout: std::time::Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("draining connections before shutdown");
    registry.broadcast_shutdown(drain_timeout.as_secs()).await;
    tokio::time::sleep(drain_timeout).await;
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

//! tether-api — the WebSocket control-channel endpoint and the local
//! JSON status API.

pub mod handlers;
pub mod ws;

use std::net::SocketAddr;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;
pub use ws::RelayState;

/// Router serving the control channel at `path`.
pub fn relay_router(state: RelayState, path: &str) -> Router {
    Router::new()
        .route(path, get(ws::handle_upgrade))
        .with_state(state)
}

/// Router serving `/api/*`.
pub fn api_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::status::handle_status))
        .route("/channels", get(handlers::channels::handle_channels))
        .route(
            "/channels/{id}",
            get(handlers::channels::handle_channel_inspect),
        )
        .route(
            "/channels/{id}",
            delete(handlers::channels::handle_channel_close),
        )
        .route("/daemon/shutdown", post(handlers::status::handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Accept control channels on `listener` until shutdown.
pub async fn serve_relay(
    listener: TcpListener,
    state: RelayState,
    path: String,
) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown_tx.subscribe();
    let app = relay_router(state, &path);

    tracing::info!(addr = %listener.local_addr()?, path = %path, "relay listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    })
    .await?;
    Ok(())
}

/// Serve the status API on `listener` until shutdown.
pub async fn serve_api(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let mut shutdown: broadcast::Receiver<()> = state.shutdown_tx.subscribe();
    let app = api_router(state);

    tracing::info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}

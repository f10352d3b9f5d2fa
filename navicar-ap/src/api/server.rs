//! HTTP server setup and routing

use crate::car::CarBridge;
use crate::coordinator::SessionCoordinator;
use crate::error::{Error, Result};
use crate::host::PlaybackHost;
use crate::playback::PlaybackHandle;
use axum::{
    routing::{delete, get, post},
    Router,
};
use navicar_common::events::EventBus;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub playback: PlaybackHandle,
    pub host: Arc<PlaybackHost>,
    pub coordinator: Arc<SessionCoordinator>,
    pub car: Arc<CarBridge>,
    pub events: EventBus,
}

/// Build the API router
pub fn router(ctx: AppContext) -> Router {
    use super::handlers;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/build_info", get(handlers::build_info))
        // Playback control
        .route("/playback/state", get(handlers::playback_state))
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/stop", post(handlers::stop))
        .route("/playback/next", post(handlers::skip_next))
        .route("/playback/previous", post(handlers::skip_previous))
        .route("/playback/seek", post(handlers::seek))
        .route("/playback/album/:album_id", post(handlers::play_album))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        // Accounts and session
        .route("/accounts", get(handlers::list_accounts).post(handlers::add_account))
        .route("/accounts/:id", delete(handlers::remove_account))
        .route("/accounts/:id/activate", post(handlers::activate_account))
        .route("/accounts/:id/default", post(handlers::set_default_account))
        .route("/session/logout", post(handlers::logout))
        // Catalog
        .route("/albums", get(handlers::list_albums))
        .route("/albums/refresh", post(handlers::refresh_albums))
        // Car browse tree
        .route("/browse", get(handlers::browse_root))
        .route("/browse/:parent_id", get(handlers::browse_children))
        .route("/browse/play/:media_id", post(handlers::browse_play))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Serve the API on `127.0.0.1:<port>` until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(ctx);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}

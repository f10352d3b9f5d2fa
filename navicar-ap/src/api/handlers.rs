//! HTTP request handlers

use crate::api::server::AppContext;
use crate::car::MediaItem;
use crate::catalog::CatalogError;
use crate::error::Error;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use navicar_common::api::Album;
use navicar_common::db::Account;
use navicar_common::events::PlaybackSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildInfoResponse {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AddAccountRequest {
    pub server_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<Account>,
}

#[derive(Debug, Serialize)]
pub struct AlbumsResponse {
    pub albums: Vec<Album>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub album_count: usize,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub parent_id: String,
    pub children: Vec<MediaItem>,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn ok() -> ApiResult<StatusResponse> {
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

/// Map an error to its HTTP status and a JSON message
fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::NotFound(_) | Error::Common(navicar_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
        Error::BadRequest(_) | Error::Common(navicar_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::Catalog(CatalogError::Auth(..)) => StatusCode::UNAUTHORIZED,
        Error::Catalog(CatalogError::NotConfigured(_)) => StatusCode::BAD_REQUEST,
        Error::Catalog(_) => StatusCode::BAD_GATEWAY,
        Error::Playback(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected ({}): {}", status.as_u16(), e);
    }

    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

// ============================================================================
// Health and build info
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "navicar-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /build_info - Build identification captured by build.rs
pub async fn build_info() -> Json<BuildInfoResponse> {
    Json(BuildInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Playback Endpoints
// ============================================================================

/// GET /playback/state - Latest engine snapshot
pub async fn playback_state(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    Json(ctx.playback.snapshot())
}

/// POST /playback/play
///
/// Accepted commands report their outcome through `/events`; a refused
/// transition shows up there as `CommandRejected`.
pub async fn play(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.playback.play().map_err(api_error)?;
    ok()
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.playback.pause().map_err(api_error)?;
    ok()
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.playback.stop().map_err(api_error)?;
    ok()
}

/// POST /playback/next
pub async fn skip_next(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.playback.skip_next().map_err(api_error)?;
    ok()
}

/// POST /playback/previous
pub async fn skip_previous(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.playback.skip_prev().map_err(api_error)?;
    ok()
}

/// POST /playback/seek
pub async fn seek(State(ctx): State<AppContext>, Json(req): Json<SeekRequest>) -> ApiResult<StatusResponse> {
    ctx.playback.seek(req.position_ms).map_err(api_error)?;
    ok()
}

/// POST /playback/album/:album_id - Resolve the album now and start it
pub async fn play_album(
    State(ctx): State<AppContext>,
    Path(album_id): Path<String>,
) -> ApiResult<StatusResponse> {
    let albums = ctx.coordinator.session().sorted_albums().await;
    let album = albums
        .iter()
        .find(|a| a.id == album_id)
        .ok_or_else(|| api_error(Error::NotFound(format!("album {}", album_id))))?;

    let catalog = ctx.coordinator.catalog().await.map_err(api_error)?;
    let track = catalog
        .resolve_album(album)
        .await
        .ok_or_else(|| api_error(Error::NotFound(format!("stream for album {}", album_id))))?;

    info!(album_id = %album_id, "Starting album");
    ctx.host.start(track).map_err(api_error)?;
    ok()
}

// ============================================================================
// Account Endpoints
// ============================================================================

/// GET /accounts
pub async fn list_accounts(State(ctx): State<AppContext>) -> ApiResult<AccountsResponse> {
    let accounts = ctx
        .coordinator
        .accounts()
        .list()
        .await
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(AccountsResponse { accounts }))
}

/// POST /accounts - Log in and store the account as active
pub async fn add_account(
    State(ctx): State<AppContext>,
    Json(req): Json<AddAccountRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let account = ctx
        .coordinator
        .add_account(&req.server_url, &req.username, &req.password)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// DELETE /accounts/:id
pub async fn remove_account(State(ctx): State<AppContext>, Path(id): Path<i64>) -> ApiResult<StatusResponse> {
    ctx.coordinator.remove_account(id).await.map_err(api_error)?;
    ok()
}

/// POST /accounts/:id/activate
pub async fn activate_account(State(ctx): State<AppContext>, Path(id): Path<i64>) -> ApiResult<StatusResponse> {
    ctx.coordinator.switch_account(id).await.map_err(api_error)?;
    ok()
}

/// POST /accounts/:id/default
pub async fn set_default_account(State(ctx): State<AppContext>, Path(id): Path<i64>) -> ApiResult<StatusResponse> {
    ctx.coordinator
        .set_default_account(id)
        .await
        .map_err(api_error)?;
    ok()
}

/// POST /session/logout
pub async fn logout(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.coordinator.logout().await.map_err(api_error)?;
    ok()
}

// ============================================================================
// Catalog Endpoints
// ============================================================================

/// GET /albums - Albums of the active account, newest first
pub async fn list_albums(State(ctx): State<AppContext>) -> Json<AlbumsResponse> {
    let albums = ctx.coordinator.session().sorted_albums().await;
    Json(AlbumsResponse {
        albums: albums.as_ref().clone(),
    })
}

/// POST /albums/refresh
pub async fn refresh_albums(State(ctx): State<AppContext>) -> ApiResult<RefreshResponse> {
    let album_count = ctx.coordinator.refresh_albums().await.map_err(api_error)?;
    Ok(Json(RefreshResponse { album_count }))
}

// ============================================================================
// Car Browse Endpoints
// ============================================================================

/// GET /browse - The browsable root
pub async fn browse_root(State(ctx): State<AppContext>) -> Json<MediaItem> {
    Json(ctx.car.root())
}

/// GET /browse/:parent_id
pub async fn browse_children(
    State(ctx): State<AppContext>,
    Path(parent_id): Path<String>,
) -> ApiResult<BrowseResponse> {
    let children = ctx
        .car
        .load_children(&parent_id)
        .ok_or_else(|| api_error(Error::NotFound(format!("browse node {}", parent_id))))?;
    Ok(Json(BrowseResponse { parent_id, children }))
}

/// POST /browse/play/:media_id
pub async fn browse_play(State(ctx): State<AppContext>, Path(media_id): Path<String>) -> ApiResult<StatusResponse> {
    ctx.car.play_from_media_id(&media_id).map_err(api_error)?;
    ok()
}

//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::HudSnapshot;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/matches/:id", get(match_handler))
        .route("/matches/:id/hud", get(hud_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        active_players: state.match_registry.total_players(),
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Serialize)]
struct MatchResponse {
    match_id: Uuid,
    seed: u64,
    players: usize,
    hud: HudSnapshot,
}

async fn match_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MatchResponse>, AppError> {
    let match_id = parse_match_id(&id)?;
    let handle = state
        .match_registry
        .get(&match_id)
        .ok_or_else(|| AppError::NotFound(format!("match {match_id}")))?;

    Ok(Json(MatchResponse {
        match_id,
        seed: handle.seed,
        players: handle.player_count(),
        hud: handle.hud(),
    }))
}

/// Kill count and elapsed time of a running match
async fn hud_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HudSnapshot>, AppError> {
    let match_id = parse_match_id(&id)?;
    state
        .match_registry
        .get(&match_id)
        .map(|handle| Json(handle.hud()))
        .ok_or_else(|| AppError::NotFound(format!("match {match_id}")))
}

fn parse_match_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid match id: {raw}")))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

//! HTTP route definitions

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{FreeForAll, FreeForAllSummary, GameVariant, MatchSummary, UnknownVariant};
use crate::http::middleware::require_admin;
use crate::matchmaking::{MatchmakingError, ProviderStats, Ranking};
use crate::util::time::uptime_secs;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(health_handler));

    // Admin routes (bearer token required)
    let admin_routes = Router::new()
        .route("/matchmaking/:ranking/stats", get(stats_handler))
        .route("/matches", get(matches_handler))
        .route("/matches/:id/stop", post(stop_match_handler))
        .route("/ffa", get(ffa_handler))
        .route("/ffa/:variant/open", post(toggle_open_handler))
        .route("/ffa/:variant/pvp", post(toggle_pvp_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    online: usize,
    running_matches: usize,
    queued: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mm = &state.matchmaking;
    let queued = [Ranking::Ranked, Ranking::Unranked]
        .into_iter()
        .map(|r| mm.stats(r).queued)
        .sum();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        online: mm.services().registry.online(),
        running_matches: mm.running_matches().len(),
        queued,
    })
}

// ============================================================================
// Admin endpoints
// ============================================================================

async fn stats_handler(
    State(state): State<AppState>,
    Path(ranking): Path<String>,
) -> Result<Json<ProviderStats>, AppError> {
    let ranking: Ranking = ranking
        .parse()
        .map_err(|e: MatchmakingError| AppError::BadRequest(e.to_string()))?;
    Ok(Json(state.matchmaking.stats(ranking)))
}

async fn matches_handler(State(state): State<AppState>) -> Json<Vec<MatchSummary>> {
    let mut matches: Vec<_> = state
        .matchmaking
        .running_matches()
        .iter()
        .map(|m| m.summary())
        .collect();
    matches.sort_by_key(|m| std::cmp::Reverse(m.duration_secs));
    Json(matches)
}

#[derive(Serialize)]
struct StopResponse {
    stopped: Uuid,
}

async fn stop_match_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StopResponse>, AppError> {
    if state.admin_limiter.check().is_err() {
        return Err(AppError::TooManyRequests);
    }
    if !state.matchmaking.stop_match(id) {
        return Err(AppError::NotFound(format!("match {id}")));
    }
    info!(match_id = %id, "Stop requested over admin API");
    Ok(Json(StopResponse { stopped: id }))
}

async fn ffa_handler(State(state): State<AppState>) -> Json<Vec<FreeForAllSummary>> {
    Json(
        state
            .matchmaking
            .free_for_all_arenas()
            .iter()
            .map(|f| f.summary())
            .collect(),
    )
}

async fn toggle_open_handler(
    State(state): State<AppState>,
    Path(variant): Path<String>,
) -> Result<Json<FreeForAllSummary>, AppError> {
    let ffa = find_free_for_all(&state, &variant)?;
    ffa.toggle_open();
    Ok(Json(ffa.summary()))
}

async fn toggle_pvp_handler(
    State(state): State<AppState>,
    Path(variant): Path<String>,
) -> Result<Json<FreeForAllSummary>, AppError> {
    let ffa = find_free_for_all(&state, &variant)?;
    ffa.toggle_pvp();
    Ok(Json(ffa.summary()))
}

fn find_free_for_all(
    state: &AppState,
    variant: &str,
) -> Result<Arc<FreeForAll>, AppError> {
    let variant: GameVariant = variant
        .parse()
        .map_err(|e: UnknownVariant| AppError::BadRequest(e.to_string()))?;
    state
        .matchmaking
        .free_for_all(variant)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("free-for-all {variant}")))
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

    #[error("Too many requests")]
    TooManyRequests,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

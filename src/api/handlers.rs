//! API Handlers
//!
//! HTTP request handlers for the admin endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::responses::{HealthResponse, HoldersResponse};
use crate::error::Result;
use crate::server::{ServerHandle, ServerStats, SessionInfo};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running cache server
    pub server: ServerHandle,
}

impl AppState {
    pub fn new(server: ServerHandle) -> Self {
        Self { server }
    }
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<ServerStats>> {
    Ok(Json(state.server.stats().await?))
}

/// Handler for GET /clients
pub async fn clients_handler(State(state): State<AppState>) -> Result<Json<Vec<SessionInfo>>> {
    Ok(Json(state.server.sessions().await?))
}

/// Handler for GET /holders/:key
pub async fn holders_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<HoldersResponse>> {
    let holders = state.server.holders(&key).await?;
    Ok(Json(HoldersResponse { key, holders }))
}

//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::websocket::{handler::ws_handler, state::AppState};
use crate::types::Participant;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket gateway
        .route("/ws", get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        // Read-only roster and counters
        .route("/api/graphs/:graph_id/participants", get(get_participants))
        .route("/api/stats", get(get_stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RosterResponse {
    graph_id: String,
    participants: Vec<Participant>,
}

async fn get_participants(
    State(state): State<Arc<AppState>>,
    Path(graph_id): Path<String>,
) -> Json<RosterResponse> {
    let participants = state.registry().participants(&graph_id);
    Json(RosterResponse {
        graph_id,
        participants,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    connections: usize,
    active_graphs: usize,
    participants: usize,
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.router.hub().connection_count(),
        active_graphs: state.registry().graph_count(),
        participants: state.registry().participant_count(),
    })
}

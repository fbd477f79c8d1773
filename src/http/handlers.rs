use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::state::AppState;
use crate::transcript::TranscriptEntry;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    /// Requested volume; clamped to 0.0..=1.0
    pub volume: f32,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    pub volume: f32,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// POST /session/connect
/// Resolves once the handshake finishes or fails
pub async fn connect(State(state): State<AppState>) -> impl IntoResponse {
    info!("Connect requested over HTTP");

    match state.controller.connect().await {
        Ok(()) => (StatusCode::OK, Json(state.controller.status().await)).into_response(),
        Err(e) => {
            error!("Connect failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /session/disconnect
pub async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    info!("Disconnect requested over HTTP");
    state.controller.disconnect().await;
    Json(state.controller.status().await)
}

/// POST /session/mute
/// Toggles the microphone of the active session
pub async fn toggle_mute(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.toggle_mute().await {
        Some(muted) => (StatusCode::OK, Json(MuteResponse { muted })).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "No active session".to_string(),
            }),
        )
            .into_response(),
    }
}

/// PUT /session/volume
pub async fn set_volume(
    State(state): State<AppState>,
    Json(req): Json<VolumeRequest>,
) -> impl IntoResponse {
    let volume = state.controller.set_volume(req.volume);
    Json(VolumeResponse { volume })
}

/// GET /transcript
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<TranscriptEntry> = state.transcript.read().await.entries().to_vec();
    Json(entries)
}

/// DELETE /transcript
/// The store is cleared when the event reaches it
pub async fn clear_transcript(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.clear_transcript();
    StatusCode::ACCEPTED
}

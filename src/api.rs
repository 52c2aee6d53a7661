//! HTTP API endpoints.
//!
//! Read-only lookups; every write goes through the WebSocket command layer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::GameError;
use crate::protocol::RoomView;
use crate::state::AppState;
use crate::types::Role;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rooms/{code}", get(get_room))
        .route("/api/rooms/{code}/export", get(export_room))
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = match &self {
            GameError::RoomNotFound(_) | GameError::ParticipantNotFound(_) => StatusCode::NOT_FOUND,
            GameError::InvalidTransition(_) | GameError::ConcurrentWinConflict => StatusCode::CONFLICT,
            GameError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GameError::InsufficientInventory { .. } | GameError::InventoryLoad(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({ "code": self.code(), "msg": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Look up a room by join code, as a participant would see it.
///
/// GET /api/rooms/{code}
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<RoomView>, GameError> {
    let room = state
        .find_room_by_code(&code)
        .await
        .ok_or(GameError::RoomNotFound(code))?;
    Ok(Json(RoomView::new(&room, Role::Participant, state.timer())))
}

/// Export a finished room with all participant documents.
///
/// GET /api/rooms/{code}/export
///
/// 409 while the room is still live.
pub async fn export_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Response, GameError> {
    let room = state
        .find_room_by_code(&code)
        .await
        .ok_or(GameError::RoomNotFound(code))?;
    let export = state.export_room(&room.id).await?;
    Ok(Json(export).into_response())
}

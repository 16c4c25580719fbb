//! REST interface of the stroke log.
//!
//! ```text
//! GET    /rooms/{room}/strokes   all strokes, ascending by commit order
//! POST   /rooms/{room}/strokes   append a stroke, 201 with the committed stroke
//! DELETE /rooms/{room}/strokes   clear the room, 204
//! ```

use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inkshare_core::{NewStroke, RoomId, ServerMessage, StorageError, Stroke};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors returned by the REST handlers as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(_) | ApiError::Storage(StorageError::Rejected(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn load_all(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> Result<Json<Vec<Stroke>>, ApiError> {
    let room = RoomId::new(room);
    let strokes = state.log().load_all(&room).await?;
    Ok(Json(strokes))
}

pub async fn append(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
    Json(stroke): Json<NewStroke>,
) -> Result<(StatusCode, Json<Stroke>), ApiError> {
    let room = RoomId::new(room);
    stroke.validate().map_err(ApiError::Rejected)?;

    let guard = state.lock_room(&room).await;
    let result = state.log().append(&room, stroke).await;
    if let Ok(committed) = &result {
        state.broadcast_stroke(
            &room,
            ServerMessage::Inserted {
                stroke: committed.clone(),
            },
        );
    }
    drop(guard);
    state.release_room_lock(&room);

    let committed = result?;
    info!(
        "Stroke {} committed to room {} at {}",
        committed.id, room, committed.commit_order.0
    );
    Ok((StatusCode::CREATED, Json(committed)))
}

pub async fn clear(State(state): State<Arc<AppState>>, Path(room): Path<String>) -> Result<StatusCode, ApiError> {
    let room = RoomId::new(room);

    let guard = state.lock_room(&room).await;
    let result = state.log().clear_room(&room).await;
    if result.is_ok() {
        state.broadcast_stroke(&room, ServerMessage::Cleared);
    }
    drop(guard);
    state.release_room_lock(&room);

    result?;
    info!("Room {} cleared", room);
    Ok(StatusCode::NO_CONTENT)
}

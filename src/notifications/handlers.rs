use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::services::AuthUser,
    error::ApiError,
    realtime::{Room, ServerEvent},
    state::AppState,
};

use super::dto::MarkReadResponse;
use super::repo;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", put(mark_read))
        .route("/notifications/mark-all-read", put(mark_all_read))
}

#[instrument(skip(state))]
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<super::dto::NotificationOut>>, ApiError> {
    let notifications = repo::list_for_recipient(&state.db, user_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(notifications))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let notification = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Notification not found".into()))?;

    if notification.recipient != user_id {
        return Err(ApiError::Forbidden(
            "Not authorized to mark this notification as read".into(),
        ));
    }

    // No-op when already read; the response and the room event still fire.
    repo::mark_read(&state.db, id)
        .await
        .map_err(ApiError::Internal)?;

    let notification = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Notification not found".into()))?;

    state.hub.emit(
        Room::User(user_id),
        ServerEvent::NotificationUpdated(notification.clone()),
    );

    info!(notification = %id, user_id = %user_id, "notification marked as read");
    Ok(Json(MarkReadResponse {
        message: "Notification marked as read".into(),
        notification,
    }))
}

#[instrument(skip(state))]
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let flipped = repo::mark_all_read(&state.db, user_id)
        .await
        .map_err(ApiError::Internal)?;

    let delivered = state
        .hub
        .emit(Room::User(user_id), ServerEvent::AllNotificationsRead);
    if delivered == 0 {
        warn!(user_id = %user_id, "allNotificationsRead reached no live connection");
    }

    info!(user_id = %user_id, flipped, "all notifications marked as read");
    Ok(Json(json!({ "message": "All notifications marked as read" })))
}

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::services::AuthUser, error::ApiError, projects, state::AppState};

use super::dto::MessageOut;
use super::repo;

pub fn routes() -> Router<AppState> {
    Router::new().route("/projects/:project_id/chat", get(list_messages))
}

/// Transcript fetch on project open; live messages arrive over the
/// WebSocket afterwards.
#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<MessageOut>>, ApiError> {
    if !projects::repo::is_owner_or_member(&state.db, project_id, user_id)
        .await
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::Forbidden(
            "Not authorized to access this project".into(),
        ));
    }

    let messages = repo::list_for_project(&state.db, project_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(messages))
}

//! Task mutation handlers. Each write follows the same two-phase shape:
//! commit the persistence write, re-read the entity populated, broadcast one
//! project-room event, then run the notification decision logic — in that
//! order, before responding. Side-effect failures are logged and contained;
//! the response reflects the committed write regardless.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::repo::User,
    auth::services::AuthUser,
    error::ApiError,
    notifications::emitter::{self, NotificationPlan, NotifyError},
    projects,
    realtime::{Room, ServerEvent},
    state::AppState,
};

use super::dto::{
    AddAttachmentRequest, AttachmentResponse, CreateTaskRequest, TaskListQuery, TaskOut,
    TaskPriority, TaskStatus, UpdateTaskRequest,
};
use super::notify::{self, Actor, TaskSnapshot};
use super::repo;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:project_id/tasks",
            get(list_tasks).post(create_task),
        )
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/:id/attachments", axum::routing::post(add_attachment))
}

async fn require_membership(
    state: &AppState,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<(), ApiError> {
    if projects::repo::is_owner_or_member(&state.db, project_id, user_id)
        .await
        .map_err(ApiError::Internal)?
    {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Not authorized to access this project".into(),
        ))
    }
}

/// Assigning requires the target user to exist; anything else is a
/// validation failure, not a silent null.
async fn validate_assignee(state: &AppState, assignee: Uuid) -> Result<(), ApiError> {
    match User::find_by_id(&state.db, assignee)
        .await
        .map_err(ApiError::Internal)?
    {
        Some(_) => Ok(()),
        None => Err(ApiError::Validation(
            "Invalid assigned user ID provided.".into(),
        )),
    }
}

/// Everything the notification side effect needs runs inside this phase,
/// actor and project lookups included. The primary write has already
/// committed when it starts, so nothing here may become a request error.
async fn notify_phase<F>(
    state: &AppState,
    user_id: Uuid,
    project_id: Uuid,
    plan: F,
) -> Result<usize, NotifyError>
where
    F: FnOnce(&Actor, &str) -> Vec<NotificationPlan>,
{
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(NotifyError::Context)?
        .ok_or_else(|| NotifyError::Context(anyhow::anyhow!("acting user {user_id} missing")))?;
    let actor = Actor {
        id: user.id,
        username: user.username,
    };
    // A concurrently deleted project leaves nothing to notify about.
    let Some(project) = projects::repo::find_record(&state.db, project_id)
        .await
        .map_err(NotifyError::Context)?
    else {
        return Ok(0);
    };

    let plans = plan(&actor, &project.name);
    if plans.is_empty() {
        return Ok(0);
    }
    emitter::dispatch(state, actor.id, Some(project_id), plans).await
}

/// A title is required on every task: an absent field keeps the current one,
/// but an explicit empty string is rejected rather than ignored.
fn merged_title(requested: Option<&str>, current: &str) -> Result<String, ApiError> {
    match requested.map(str::trim) {
        Some("") => Err(ApiError::Validation("Task title cannot be empty".into())),
        Some(t) => Ok(t.to_string()),
        None => Ok(current.to_string()),
    }
}

async fn run_notify_phase<F>(state: &AppState, user_id: Uuid, project_id: Uuid, plan: F)
where
    F: FnOnce(&Actor, &str) -> Vec<NotificationPlan>,
{
    if let Err(e) = notify_phase(state, user_id, project_id, plan).await {
        warn!(error = %e, "notification side effect failed");
    }
}

#[instrument(skip(state, query))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<Uuid>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskOut>>, ApiError> {
    require_membership(&state, project_id, user_id).await?;

    let status = match query.status.as_deref() {
        None | Some("All") => None,
        Some(raw) => Some(
            raw.parse::<TaskStatus>()
                .map_err(ApiError::Validation)?,
        ),
    };

    let tasks = repo::list_for_project(&state.db, project_id, query.search.as_deref(), status)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(tasks))
}

#[instrument(skip(state))]
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskOut>, ApiError> {
    let record = repo::find_record(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;
    require_membership(&state, record.project_id, user_id).await?;

    let task = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;
    Ok(Json(task))
}

#[instrument(skip(state, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskOut>), ApiError> {
    if projects::repo::find_record(&state.db, project_id)
        .await
        .map_err(ApiError::Internal)?
        .is_none()
    {
        return Err(ApiError::NotFound("Project not found".into()));
    }
    require_membership(&state, project_id, user_id).await?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("Task title is required".into()));
    }
    if let Some(assignee) = payload.assigned_to {
        validate_assignee(&state, assignee).await?;
    }

    let id = repo::create(
        &state.db,
        project_id,
        title,
        payload.description.as_deref().unwrap_or(""),
        payload.status.unwrap_or(TaskStatus::ToDo),
        payload.priority.unwrap_or(TaskPriority::Medium),
        payload.due_date,
        payload.assigned_to,
        user_id,
    )
    .await
    .map_err(ApiError::Internal)?;

    let task = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("created task missing on re-read")))?;

    info!(task = %id, project = %project_id, "task created");

    // Broadcast first, then notifications; respond only after both ran.
    state.hub.emit(
        Room::Project(project_id),
        ServerEvent::TaskCreated(task.clone()),
    );

    run_notify_phase(&state, user_id, project_id, |actor, project_name| {
        notify::plan_for_create(actor, project_name, &task)
    })
    .await;

    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<TaskOut>, ApiError> {
    let record = repo::find_record(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;
    require_membership(&state, record.project_id, user_id).await?;

    let before = TaskSnapshot::try_from(&record).map_err(ApiError::Internal)?;

    // Merge the partial update over the snapshot; double options distinguish
    // clearing from leaving untouched.
    let title = merged_title(payload.title.as_deref(), &before.title)?;
    let description = payload
        .description
        .clone()
        .unwrap_or_else(|| before.description.clone());
    let status = payload.status.unwrap_or(before.status);
    let priority = payload.priority.unwrap_or(before.priority);
    let due_date = match payload.due_date {
        Some(value) => value,
        None => before.due_date,
    };
    let assigned_to = match payload.assigned_to {
        Some(Some(assignee)) => {
            validate_assignee(&state, assignee).await?;
            Some(assignee)
        }
        Some(None) => None,
        None => before.assigned_to,
    };

    repo::update(
        &state.db, id, &title, &description, status, priority, due_date, assigned_to,
    )
    .await
    .map_err(ApiError::Internal)?;

    let task = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("updated task missing on re-read")))?;

    info!(task = %id, "task updated");

    state.hub.emit(
        Room::Project(record.project_id),
        ServerEvent::TaskUpdated(task.clone()),
    );

    run_notify_phase(&state, user_id, record.project_id, |actor, project_name| {
        notify::plan_for_update(actor, project_name, &before, &task)
    })
    .await;

    Ok(Json(task))
}

#[instrument(skip(state))]
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let record = repo::find_record(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;
    require_membership(&state, record.project_id, user_id).await?;

    repo::delete(&state.db, id)
        .await
        .map_err(ApiError::Internal)?;

    info!(task = %id, project = %record.project_id, "task deleted");

    state
        .hub
        .emit(Room::Project(record.project_id), ServerEvent::TaskDeleted(id));

    run_notify_phase(&state, user_id, record.project_id, |actor, project_name| {
        notify::plan_for_delete(actor, project_name, &record.title, record.assigned_to)
    })
    .await;

    Ok(Json(json!({ "message": "Task removed" })))
}

#[instrument(skip(state, payload))]
pub async fn add_attachment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddAttachmentRequest>,
) -> Result<Json<AttachmentResponse>, ApiError> {
    let record = repo::find_record(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;
    require_membership(&state, record.project_id, user_id).await?;

    if payload.filename.trim().is_empty() || payload.file_url.trim().is_empty() {
        return Err(ApiError::Validation(
            "filename and fileUrl are required".into(),
        ));
    }

    let attachment = repo::add_attachment(
        &state.db,
        id,
        payload.filename.trim(),
        payload.file_url.trim(),
        &payload.mime_type,
    )
    .await
    .map_err(ApiError::Internal)?;

    let task = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("task missing after attachment write")))?;

    info!(task = %id, attachment = %attachment.id, "attachment added");

    state.hub.emit(
        Room::Project(record.project_id),
        ServerEvent::TaskUpdated(task.clone()),
    );

    run_notify_phase(&state, user_id, record.project_id, |actor, project_name| {
        notify::plan_for_attachment(actor, project_name, &task)
    })
    .await;

    Ok(Json(AttachmentResponse {
        message: "File registered successfully".into(),
        attachment,
        task,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_title_keeps_current_when_absent() {
        assert_eq!(merged_title(None, "keep me").unwrap(), "keep me");
    }

    #[test]
    fn merged_title_trims_and_replaces() {
        assert_eq!(merged_title(Some("  new  "), "old").unwrap(), "new");
    }

    #[test]
    fn merged_title_rejects_explicit_empty() {
        let err = merged_title(Some(""), "old").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = merged_title(Some("   "), "old").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    // The entity write has committed and the room event is out by the time
    // the notify phase runs; its failures must stay inside the phase.
    #[tokio::test]
    async fn notify_phase_failures_never_reach_the_response() {
        let state = crate::state::AppState::fake();
        let outcome = notify_phase(&state, Uuid::new_v4(), Uuid::new_v4(), |_, _| vec![]).await;
        assert!(outcome.is_err(), "lookup against the fake pool must fail");

        // The swallowing wrapper returns unit regardless.
        run_notify_phase(&state, Uuid::new_v4(), Uuid::new_v4(), |_, _| vec![]).await;
    }
}

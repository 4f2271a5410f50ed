use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{repo::User, services::AuthUser},
    error::ApiError,
    notifications::{
        dto::NotificationKind,
        emitter::{self, NotificationPlan},
    },
    state::AppState,
};

use super::dto::{
    CreateProjectRequest, ProjectOut, ProjectSummary, UpdateProjectRequest,
};
use super::repo;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/:id/summary", get(project_summary))
}

/// Resolves member usernames to ids, rejecting unknown names and filtering
/// the owner out of the member set.
async fn resolve_members(
    state: &AppState,
    usernames: &[String],
    owner_id: Uuid,
) -> Result<Vec<Uuid>, ApiError> {
    if usernames.is_empty() {
        return Ok(vec![]);
    }
    let users = User::find_by_usernames(&state.db, usernames)
        .await
        .map_err(ApiError::Internal)?;
    let found: HashSet<&str> = users.iter().map(|u| u.username.as_str()).collect();
    let missing: Vec<&str> = usernames
        .iter()
        .map(String::as_str)
        .filter(|name| !found.contains(name))
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::Validation(format!(
            "User(s) not found: {}",
            missing.join(", ")
        )));
    }
    Ok(users
        .into_iter()
        .filter(|u| u.id != owner_id)
        .map(|u| u.id)
        .collect())
}

/// Contained side-effect path: the project write has committed, so the actor
/// lookup and everything after it only log on failure.
async fn notify_added_members(
    state: &AppState,
    actor_id: Uuid,
    project_id: Uuid,
    project_name: &str,
    added: &[Uuid],
) {
    if added.is_empty() {
        return;
    }
    let actor = match User::find_by_id(&state.db, actor_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(%actor_id, %project_id, "acting user missing; skipping member notifications");
            return;
        }
        Err(e) => {
            warn!(error = %e, %project_id, "actor lookup failed; skipping member notifications");
            return;
        }
    };
    let plans: Vec<NotificationPlan> = added
        .iter()
        .map(|member| NotificationPlan {
            recipient: *member,
            kind: NotificationKind::ProjectMemberAdded,
            message: format!(
                "{} added you to project \"{}\".",
                actor.username, project_name
            ),
            task_id: None,
        })
        .collect();
    if let Err(e) = emitter::dispatch(state, actor.id, Some(project_id), plans).await {
        warn!(error = %e, %project_id, "member-added notification failed");
    }
}

#[instrument(skip(state))]
pub async fn list_projects(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ProjectOut>>, ApiError> {
    let projects = repo::list_for_user(&state.db, user_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(projects))
}

#[instrument(skip(state, payload))]
pub async fn create_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectOut>), ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Project name is required".into()));
    }

    if repo::name_taken(&state.db, user_id, name, None)
        .await
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::Conflict(
            "A project with this name already exists for you".into(),
        ));
    }

    let member_ids =
        resolve_members(&state, payload.members.as_deref().unwrap_or(&[]), user_id).await?;

    let description = payload.description.unwrap_or_default();
    let id = repo::create(&state.db, name, &description, user_id, &member_ids)
        .await
        .map_err(ApiError::Internal)?;

    let project = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("created project missing on re-read")))?;

    info!(project = %id, owner = %user_id, "project created");

    notify_added_members(&state, user_id, id, &project.name, &member_ids).await;

    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(skip(state))]
pub async fn get_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectOut>, ApiError> {
    let project = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Project not found".into()))?;

    let authorized =
        project.owner.id == user_id || project.members.iter().any(|m| m.id == user_id);
    if !authorized {
        return Err(ApiError::Forbidden(
            "Not authorized to access this project".into(),
        ));
    }
    Ok(Json(project))
}

#[instrument(skip(state, payload))]
pub async fn update_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectOut>, ApiError> {
    let record = repo::find_record(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Project not found".into()))?;

    if record.owner_id != user_id {
        return Err(ApiError::Forbidden(
            "Not authorized to update this project".into(),
        ));
    }

    let name = match payload.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() && n != record.name => {
            if repo::name_taken(&state.db, user_id, n, Some(id))
                .await
                .map_err(ApiError::Internal)?
            {
                return Err(ApiError::Conflict(
                    "A project with this name already exists for you".into(),
                ));
            }
            n.to_string()
        }
        Some(n) if !n.is_empty() => n.to_string(),
        _ => record.name.clone(),
    };
    let description = payload.description.unwrap_or(record.description);

    let mut added_members: Vec<Uuid> = vec![];
    if let Some(usernames) = &payload.members {
        let new_ids = resolve_members(&state, usernames, user_id).await?;
        let previous: HashSet<Uuid> = repo::member_ids(&state.db, id)
            .await
            .map_err(ApiError::Internal)?
            .into_iter()
            .collect();
        added_members = new_ids
            .iter()
            .copied()
            .filter(|m| !previous.contains(m))
            .collect();
        repo::set_members(&state.db, id, &new_ids)
            .await
            .map_err(ApiError::Internal)?;
    }

    repo::update(&state.db, id, &name, &description)
        .await
        .map_err(ApiError::Internal)?;

    let project = repo::find_populated(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("updated project missing on re-read")))?;

    info!(project = %id, "project updated");

    notify_added_members(&state, user_id, id, &project.name, &added_members).await;

    Ok(Json(project))
}

#[instrument(skip(state))]
pub async fn delete_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let record = repo::find_record(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Project not found".into()))?;

    if record.owner_id != user_id {
        return Err(ApiError::Forbidden(
            "Not authorized to delete this project".into(),
        ));
    }

    repo::delete(&state.db, id)
        .await
        .map_err(ApiError::Internal)?;

    info!(project = %id, "project deleted with its tasks and messages");
    Ok(Json(json!({ "message": "Project removed" })))
}

#[instrument(skip(state))]
pub async fn project_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectSummary>, ApiError> {
    if repo::find_record(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .is_none()
    {
        return Err(ApiError::NotFound("Project not found".into()));
    }
    if !repo::is_owner_or_member(&state.db, id, user_id)
        .await
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::Forbidden(
            "Not authorized to access this project dashboard".into(),
        ));
    }

    let tasks_by_status = repo::status_counts(&state.db, id)
        .await
        .map_err(ApiError::Internal)?;
    let tasks_by_assignee = repo::assignee_counts(&state.db, id)
        .await
        .map_err(ApiError::Internal)?;

    Ok(Json(ProjectSummary {
        tasks_by_status,
        tasks_by_assignee,
    }))
}

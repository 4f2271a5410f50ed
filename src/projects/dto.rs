use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::PublicUser;

/// Populated project: owner and members expanded to their public fields.
/// The owner never appears in `members`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOut {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: PublicUser,
    pub members: Vec<PublicUser>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Members are sent as usernames; the handler resolves them to ids and
/// rejects the whole request if any are unknown.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Replaces the member set when present.
    #[serde(default)]
    pub members: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeCount {
    pub assignee_id: Option<Uuid>,
    pub username: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub tasks_by_status: Vec<StatusCount>,
    pub tasks_by_assignee: Vec<AssigneeCount>,
}

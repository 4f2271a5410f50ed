use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::UserRef;

/// Kanban column. Stored as TEXT using the display strings below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::ToDo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        })
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "To Do" => Ok(TaskStatus::ToDo),
            "In Progress" => Ok(TaskStatus::InProgress),
            "Done" => Ok(TaskStatus::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        })
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(TaskPriority::Low),
            "Medium" => Ok(TaskPriority::Medium),
            "High" => Ok(TaskPriority::High),
            other => Err(format!("unknown task priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentOut {
    pub id: Uuid,
    pub filename: String,
    pub file_url: String,
    pub mime_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

/// Fully populated task as returned by the API and broadcast to project
/// rooms: assignee and creator are expanded to id + username.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOut {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub assigned_to: Option<UserRef>,
    pub created_by: UserRef,
    pub attachments: Vec<AttachmentOut>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    /// Absent or null means unassigned; anything else must be a user id.
    /// No best-effort coercion of other shapes.
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}

/// Partial update. `assignedTo` and `dueDate` distinguish "leave unchanged"
/// (field absent) from "clear" (explicit null) via the double option.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "double_option_rfc3339")]
    pub due_date: Option<Option<OffsetDateTime>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
}

// Plain Option<Option<T>> folds an explicit null into the outer None; the
// wrapper runs only when the field is present, so null maps to Some(None).
fn double_option<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

fn double_option_rfc3339<'de, D>(d: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(d)?;
    match raw {
        None => Ok(Some(None)),
        Some(s) => OffsetDateTime::parse(&s, &time::format_description::well_known::Rfc3339)
            .map(|dt| Some(Some(dt)))
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAttachmentRequest {
    pub filename: String,
    pub file_url: String,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub message: String,
    pub attachment: AttachmentOut,
    pub task: TaskOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_strings_round_trip() {
        for s in [TaskStatus::ToDo, TaskStatus::InProgress, TaskStatus::Done] {
            let json = serde_json::to_string(&s).unwrap();
            let back: TaskStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, s);
            assert_eq!(s.to_string().parse::<TaskStatus>().unwrap(), s);
        }
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"In Progress\""
        );
    }

    #[test]
    fn update_distinguishes_absent_null_and_value() {
        let absent: UpdateTaskRequest = serde_json::from_str(r#"{"title":"t"}"#).unwrap();
        assert_eq!(absent.assigned_to, None);

        let cleared: UpdateTaskRequest = serde_json::from_str(r#"{"assignedTo":null}"#).unwrap();
        assert_eq!(cleared.assigned_to, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateTaskRequest =
            serde_json::from_str(&format!(r#"{{"assignedTo":"{id}"}}"#)).unwrap();
        assert_eq!(set.assigned_to, Some(Some(id)));
    }

    #[test]
    fn malformed_assignee_is_rejected_not_coerced() {
        let res: Result<UpdateTaskRequest, _> =
            serde_json::from_str(r#"{"assignedTo":{"_id":"abc"}}"#);
        assert!(res.is_err());
        let res: Result<UpdateTaskRequest, _> = serde_json::from_str(r#"{"assignedTo":"not-a-uuid"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn due_date_double_option() {
        let absent: UpdateTaskRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(absent.due_date, None);

        let cleared: UpdateTaskRequest = serde_json::from_str(r#"{"dueDate":null}"#).unwrap();
        assert_eq!(cleared.due_date, Some(None));

        let set: UpdateTaskRequest =
            serde_json::from_str(r#"{"dueDate":"2026-01-15T12:00:00Z"}"#).unwrap();
        assert!(matches!(set.due_date, Some(Some(_))));
    }
}

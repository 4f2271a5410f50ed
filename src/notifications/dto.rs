use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::UserRef;

/// Fixed notification taxonomy, stored as TEXT in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    TaskUnassigned,
    TaskStatusChange,
    TaskUpdated,
    TaskDeleted,
    TaskCreated,
    NewMessage,
    ProjectMemberAdded,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationKind::TaskAssigned => "task_assigned",
            NotificationKind::TaskUnassigned => "task_unassigned",
            NotificationKind::TaskStatusChange => "task_status_change",
            NotificationKind::TaskUpdated => "task_updated",
            NotificationKind::TaskDeleted => "task_deleted",
            NotificationKind::TaskCreated => "task_created",
            NotificationKind::NewMessage => "new_message",
            NotificationKind::ProjectMemberAdded => "project_member_added",
        })
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_assigned" => Ok(NotificationKind::TaskAssigned),
            "task_unassigned" => Ok(NotificationKind::TaskUnassigned),
            "task_status_change" => Ok(NotificationKind::TaskStatusChange),
            "task_updated" => Ok(NotificationKind::TaskUpdated),
            "task_deleted" => Ok(NotificationKind::TaskDeleted),
            "task_created" => Ok(NotificationKind::TaskCreated),
            "new_message" => Ok(NotificationKind::NewMessage),
            "project_member_added" => Ok(NotificationKind::ProjectMemberAdded),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: Uuid,
    pub title: String,
}

/// Populated notification as listed over REST and pushed to user rooms:
/// sender, project and task references are expanded to display fields.
/// All three are optional — system notifications have no sender and a
/// deleted task leaves no task to reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOut {
    pub id: Uuid,
    pub recipient: Uuid,
    pub sender: Option<UserRef>,
    pub project: Option<ProjectRef>,
    pub task: Option<TaskRef>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub message: String,
    pub notification: NotificationOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_strings_round_trip() {
        for kind in [
            NotificationKind::TaskAssigned,
            NotificationKind::TaskUnassigned,
            NotificationKind::TaskStatusChange,
            NotificationKind::TaskUpdated,
            NotificationKind::TaskDeleted,
            NotificationKind::TaskCreated,
            NotificationKind::NewMessage,
            NotificationKind::ProjectMemberAdded,
        ] {
            assert_eq!(kind.to_string().parse::<NotificationKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn kind_serializes_under_type_key() {
        let n = NotificationOut {
            id: Uuid::new_v4(),
            recipient: Uuid::new_v4(),
            sender: None,
            project: None,
            task: None,
            kind: NotificationKind::TaskAssigned,
            message: "m".into(),
            is_read: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "task_assigned");
        assert_eq!(json["isRead"], false);
    }
}

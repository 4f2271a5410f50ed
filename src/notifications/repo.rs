use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::UserRef;

use super::dto::{NotificationKind, NotificationOut, ProjectRef, TaskRef};

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    sender_id: Option<Uuid>,
    sender_username: Option<String>,
    project_id: Option<Uuid>,
    project_name: Option<String>,
    task_id: Option<Uuid>,
    task_title: Option<String>,
    kind: String,
    message: String,
    is_read: bool,
    created_at: OffsetDateTime,
}

impl NotificationRow {
    fn into_out(self) -> anyhow::Result<NotificationOut> {
        let kind: NotificationKind = self.kind.parse().map_err(anyhow::Error::msg)?;
        let sender = match (self.sender_id, self.sender_username) {
            (Some(id), Some(username)) => Some(UserRef { id, username }),
            _ => None,
        };
        let project = match (self.project_id, self.project_name) {
            (Some(id), Some(name)) => Some(ProjectRef { id, name }),
            _ => None,
        };
        let task = match (self.task_id, self.task_title) {
            (Some(id), Some(title)) => Some(TaskRef { id, title }),
            _ => None,
        };
        Ok(NotificationOut {
            id: self.id,
            recipient: self.recipient_id,
            sender,
            project,
            task,
            kind,
            message: self.message,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}

const POPULATED_SELECT: &str = r#"
    SELECT n.id, n.recipient_id, n.sender_id, s.username AS sender_username,
           n.project_id, p.name AS project_name,
           n.task_id, t.title AS task_title,
           n.kind, n.message, n.is_read, n.created_at
    FROM notifications n
    LEFT JOIN users s ON s.id = n.sender_id
    LEFT JOIN projects p ON p.id = n.project_id
    LEFT JOIN tasks t ON t.id = n.task_id
"#;

pub async fn create(
    db: &PgPool,
    recipient: Uuid,
    sender: Option<Uuid>,
    project: Option<Uuid>,
    task: Option<Uuid>,
    kind: NotificationKind,
    message: &str,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO notifications (recipient_id, sender_id, project_id, task_id, kind, message)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(recipient)
    .bind(sender)
    .bind(project)
    .bind(task)
    .bind(kind.to_string())
    .bind(message)
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub async fn find_populated(db: &PgPool, id: Uuid) -> anyhow::Result<Option<NotificationOut>> {
    let row = sqlx::query_as::<_, NotificationRow>(&format!("{POPULATED_SELECT} WHERE n.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.map(NotificationRow::into_out).transpose()
}

/// Newest first, matching the tray's prepend-on-arrival ordering.
pub async fn list_for_recipient(
    db: &PgPool,
    recipient: Uuid,
) -> anyhow::Result<Vec<NotificationOut>> {
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        "{POPULATED_SELECT} WHERE n.recipient_id = $1 ORDER BY n.created_at DESC"
    ))
    .bind(recipient)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(NotificationRow::into_out).collect()
}

/// Idempotent: marking an already-read notification is a no-op.
pub async fn mark_read(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE notifications SET is_read = true WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn mark_all_read(db: &PgPool, recipient: Uuid) -> anyhow::Result<u64> {
    let result =
        sqlx::query("UPDATE notifications SET is_read = true WHERE recipient_id = $1 AND is_read = false")
            .bind(recipient)
            .execute(db)
            .await?;
    Ok(result.rows_affected())
}

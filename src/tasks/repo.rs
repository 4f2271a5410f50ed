use std::collections::HashMap;

use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::UserRef;

use super::dto::{AttachmentOut, TaskOut, TaskPriority, TaskStatus};

/// Unpopulated task row, used where references stay bare: authorization
/// checks and the before-snapshot for the notification decision logic.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub due_date: Option<OffsetDateTime>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Uuid,
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    project_id: Uuid,
    title: String,
    description: String,
    status: String,
    priority: String,
    due_date: Option<OffsetDateTime>,
    assigned_to: Option<Uuid>,
    assigned_to_username: Option<String>,
    created_by: Uuid,
    created_by_username: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TaskRow {
    fn into_out(self, attachments: Vec<AttachmentOut>) -> anyhow::Result<TaskOut> {
        let status: TaskStatus = self.status.parse().map_err(anyhow::Error::msg)?;
        let priority: TaskPriority = self.priority.parse().map_err(anyhow::Error::msg)?;
        let assigned_to = match (self.assigned_to, self.assigned_to_username) {
            (Some(id), Some(username)) => Some(UserRef { id, username }),
            _ => None,
        };
        Ok(TaskOut {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status,
            priority,
            due_date: self.due_date,
            assigned_to,
            created_by: UserRef {
                id: self.created_by,
                username: self.created_by_username,
            },
            attachments,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    id: Uuid,
    task_id: Uuid,
    filename: String,
    file_url: String,
    mime_type: String,
    uploaded_at: OffsetDateTime,
}

impl From<AttachmentRow> for AttachmentOut {
    fn from(row: AttachmentRow) -> Self {
        AttachmentOut {
            id: row.id,
            filename: row.filename,
            file_url: row.file_url,
            mime_type: row.mime_type,
            uploaded_at: row.uploaded_at,
        }
    }
}

const POPULATED_SELECT: &str = r#"
    SELECT t.id, t.project_id, t.title, t.description, t.status, t.priority,
           t.due_date, t.assigned_to, a.username AS assigned_to_username,
           t.created_by, c.username AS created_by_username,
           t.created_at, t.updated_at
    FROM tasks t
    LEFT JOIN users a ON a.id = t.assigned_to
    JOIN users c ON c.id = t.created_by
"#;

pub async fn find_record(db: &PgPool, id: Uuid) -> anyhow::Result<Option<TaskRecord>> {
    let record = sqlx::query_as::<_, TaskRecord>(
        r#"
        SELECT id, project_id, title, description, status, priority,
               due_date, assigned_to, created_by
        FROM tasks
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(record)
}

/// Re-reads a task with assignee and creator expanded, attachments included.
/// Mutation handlers call this after every write so downstream consumers
/// never see bare ids.
pub async fn find_populated(db: &PgPool, id: Uuid) -> anyhow::Result<Option<TaskOut>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!("{POPULATED_SELECT} WHERE t.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    let Some(row) = row else { return Ok(None) };
    let attachments = attachments_for(db, id).await?;
    Ok(Some(row.into_out(attachments)?))
}

pub async fn list_for_project(
    db: &PgPool,
    project_id: Uuid,
    search: Option<&str>,
    status: Option<TaskStatus>,
) -> anyhow::Result<Vec<TaskOut>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        r#"{POPULATED_SELECT}
        WHERE t.project_id = $1
          AND ($2::text IS NULL OR t.title ILIKE '%' || $2 || '%'
                                OR t.description ILIKE '%' || $2 || '%')
          AND ($3::text IS NULL OR t.status = $3)
        ORDER BY t.created_at
        "#
    ))
    .bind(project_id)
    .bind(search)
    .bind(status.map(|s| s.to_string()))
    .fetch_all(db)
    .await?;

    let task_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let attachment_rows = sqlx::query_as::<_, AttachmentRow>(
        r#"
        SELECT id, task_id, filename, file_url, mime_type, uploaded_at
        FROM task_attachments
        WHERE task_id = ANY($1)
        ORDER BY uploaded_at
        "#,
    )
    .bind(&task_ids)
    .fetch_all(db)
    .await?;

    let mut by_task: HashMap<Uuid, Vec<AttachmentOut>> = HashMap::new();
    for row in attachment_rows {
        by_task.entry(row.task_id).or_default().push(row.into());
    }

    rows.into_iter()
        .map(|row| {
            let attachments = by_task.remove(&row.id).unwrap_or_default();
            row.into_out(attachments)
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    db: &PgPool,
    project_id: Uuid,
    title: &str,
    description: &str,
    status: TaskStatus,
    priority: TaskPriority,
    due_date: Option<OffsetDateTime>,
    assigned_to: Option<Uuid>,
    created_by: Uuid,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO tasks (project_id, title, description, status, priority,
                           due_date, assigned_to, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .bind(title)
    .bind(description)
    .bind(status.to_string())
    .bind(priority.to_string())
    .bind(due_date)
    .bind(assigned_to)
    .bind(created_by)
    .fetch_one(db)
    .await?;
    Ok(id)
}

/// Writes the already-merged final field values (read-modify-write happens in
/// the handler, which holds the before-snapshot for notification planning).
pub async fn update(
    db: &PgPool,
    id: Uuid,
    title: &str,
    description: &str,
    status: TaskStatus,
    priority: TaskPriority,
    due_date: Option<OffsetDateTime>,
    assigned_to: Option<Uuid>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE tasks
        SET title = $2, description = $3, status = $4, priority = $5,
            due_date = $6, assigned_to = $7, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(status.to_string())
    .bind(priority.to_string())
    .bind(due_date)
    .bind(assigned_to)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn add_attachment(
    db: &PgPool,
    task_id: Uuid,
    filename: &str,
    file_url: &str,
    mime_type: &str,
) -> anyhow::Result<AttachmentOut> {
    let row = sqlx::query_as::<_, AttachmentRow>(
        r#"
        INSERT INTO task_attachments (task_id, filename, file_url, mime_type)
        VALUES ($1, $2, $3, $4)
        RETURNING id, task_id, filename, file_url, mime_type, uploaded_at
        "#,
    )
    .bind(task_id)
    .bind(filename)
    .bind(file_url)
    .bind(mime_type)
    .fetch_one(db)
    .await?;
    Ok(row.into())
}

pub async fn attachments_for(db: &PgPool, task_id: Uuid) -> anyhow::Result<Vec<AttachmentOut>> {
    let rows = sqlx::query_as::<_, AttachmentRow>(
        r#"
        SELECT id, task_id, filename, file_url, mime_type, uploaded_at
        FROM task_attachments
        WHERE task_id = $1
        ORDER BY uploaded_at
        "#,
    )
    .bind(task_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::UserRef;

use super::dto::MessageOut;

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    project_id: Uuid,
    sender_id: Uuid,
    sender_username: String,
    content: String,
    created_at: OffsetDateTime,
}

impl From<MessageRow> for MessageOut {
    fn from(row: MessageRow) -> Self {
        MessageOut {
            id: row.id,
            project_id: row.project_id,
            sender: UserRef {
                id: row.sender_id,
                username: row.sender_username,
            },
            content: row.content,
            created_at: row.created_at,
        }
    }
}

const POPULATED_SELECT: &str = r#"
    SELECT m.id, m.project_id, m.sender_id, u.username AS sender_username,
           m.content, m.created_at
    FROM messages m
    JOIN users u ON u.id = m.sender_id
"#;

pub async fn create(
    db: &PgPool,
    project_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO messages (project_id, sender_id, content)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .bind(sender_id)
    .bind(content)
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub async fn find_populated(db: &PgPool, id: Uuid) -> anyhow::Result<Option<MessageOut>> {
    let row = sqlx::query_as::<_, MessageRow>(&format!("{POPULATED_SELECT} WHERE m.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(Into::into))
}

/// Oldest first: the transcript renders top-down in arrival order.
pub async fn list_for_project(db: &PgPool, project_id: Uuid) -> anyhow::Result<Vec<MessageOut>> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "{POPULATED_SELECT} WHERE m.project_id = $1 ORDER BY m.created_at"
    ))
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

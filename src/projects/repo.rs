use std::collections::HashMap;

use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::PublicUser;

use super::dto::{AssigneeCount, ProjectOut, StatusCount};

/// Unpopulated project row for ownership/uniqueness checks.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner_id: Uuid,
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    description: String,
    owner_id: Uuid,
    owner_username: String,
    owner_email: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct MemberRow {
    project_id: Uuid,
    id: Uuid,
    username: String,
    email: String,
}

const POPULATED_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.owner_id,
           o.username AS owner_username, o.email AS owner_email,
           p.created_at, p.updated_at
    FROM projects p
    JOIN users o ON o.id = p.owner_id
"#;

async fn members_for(
    db: &PgPool,
    project_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<PublicUser>>> {
    let rows = sqlx::query_as::<_, MemberRow>(
        r#"
        SELECT m.project_id, u.id, u.username, u.email
        FROM project_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.project_id = ANY($1)
        ORDER BY u.username
        "#,
    )
    .bind(project_ids)
    .fetch_all(db)
    .await?;

    let mut by_project: HashMap<Uuid, Vec<PublicUser>> = HashMap::new();
    for row in rows {
        by_project.entry(row.project_id).or_default().push(PublicUser {
            id: row.id,
            username: row.username,
            email: row.email,
        });
    }
    Ok(by_project)
}

fn assemble(rows: Vec<ProjectRow>, mut members: HashMap<Uuid, Vec<PublicUser>>) -> Vec<ProjectOut> {
    rows.into_iter()
        .map(|row| ProjectOut {
            id: row.id,
            name: row.name,
            description: row.description,
            owner: PublicUser {
                id: row.owner_id,
                username: row.owner_username,
                email: row.owner_email,
            },
            members: members.remove(&row.id).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect()
}

/// Projects the user owns or is a member of, populated.
pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<ProjectOut>> {
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"{POPULATED_SELECT}
        WHERE p.owner_id = $1
           OR EXISTS (SELECT 1 FROM project_members m
                      WHERE m.project_id = p.id AND m.user_id = $1)
        ORDER BY p.created_at
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let members = members_for(db, &ids).await?;
    Ok(assemble(rows, members))
}

pub async fn find_populated(db: &PgPool, id: Uuid) -> anyhow::Result<Option<ProjectOut>> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!("{POPULATED_SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    let Some(row) = row else { return Ok(None) };
    let members = members_for(db, &[row.id]).await?;
    Ok(assemble(vec![row], members).pop())
}

pub async fn find_record(db: &PgPool, id: Uuid) -> anyhow::Result<Option<ProjectRecord>> {
    let record = sqlx::query_as::<_, ProjectRecord>(
        "SELECT id, name, description, owner_id FROM projects WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(record)
}

/// Per-owner name uniqueness check; `exclude` skips the project being
/// renamed.
pub async fn name_taken(
    db: &PgPool,
    owner_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> anyhow::Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM projects
        WHERE owner_id = $1 AND name = $2 AND ($3::uuid IS NULL OR id <> $3)
        LIMIT 1
        "#,
    )
    .bind(owner_id)
    .bind(name)
    .bind(exclude)
    .fetch_optional(db)
    .await?;
    Ok(row.is_some())
}

pub async fn create(
    db: &PgPool,
    name: &str,
    description: &str,
    owner_id: Uuid,
    member_ids: &[Uuid],
) -> anyhow::Result<Uuid> {
    let mut tx = db.begin().await?;
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO projects (name, description, owner_id)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(owner_id)
    .fetch_one(&mut *tx)
    .await?;

    for member in member_ids {
        sqlx::query("INSERT INTO project_members (project_id, user_id) VALUES ($1, $2)")
            .bind(id)
            .bind(member)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(id)
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    name: &str,
    description: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE projects SET name = $2, description = $3, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .execute(db)
    .await?;
    Ok(())
}

/// Replaces the member set wholesale.
pub async fn set_members(db: &PgPool, id: Uuid, member_ids: &[Uuid]) -> anyhow::Result<()> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM project_members WHERE project_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for member in member_ids {
        sqlx::query("INSERT INTO project_members (project_id, user_id) VALUES ($1, $2)")
            .bind(id)
            .bind(member)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Tasks, messages and membership rows go with the project (FK cascade).
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn member_ids(db: &PgPool, project_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT user_id FROM project_members WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(db)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn is_owner_or_member(
    db: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT p.id FROM projects p
        WHERE p.id = $1
          AND (p.owner_id = $2
               OR EXISTS (SELECT 1 FROM project_members m
                          WHERE m.project_id = p.id AND m.user_id = $2))
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row.is_some())
}

pub async fn status_counts(db: &PgPool, project_id: Uuid) -> anyhow::Result<Vec<StatusCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*) FROM tasks
        WHERE project_id = $1
        GROUP BY status
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect())
}

pub async fn assignee_counts(db: &PgPool, project_id: Uuid) -> anyhow::Result<Vec<AssigneeCount>> {
    let rows: Vec<(Option<Uuid>, Option<String>, i64)> = sqlx::query_as(
        r#"
        SELECT t.assigned_to, u.username, COUNT(*)
        FROM tasks t
        LEFT JOIN users u ON u.id = t.assigned_to
        WHERE t.project_id = $1
        GROUP BY t.assigned_to, u.username
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(assignee_id, username, count)| AssigneeCount {
            assignee_id,
            username: username.unwrap_or_else(|| "Unassigned".into()),
            count,
        })
        .collect())
}

//! Decides which notifications a task mutation produces. Pure functions over
//! the before/after state so the rules are testable without a database; the
//! emitter persists and broadcasts whatever is planned here.
//!
//! The actor is never notified about their own actions, in every branch.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::notifications::dto::NotificationKind;
use crate::notifications::emitter::NotificationPlan;

use super::dto::{TaskOut, TaskPriority, TaskStatus};
use super::repo::TaskRecord;

/// The authenticated identity performing the mutation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
}

/// Pre-mutation field values a task update is judged against.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<OffsetDateTime>,
    pub assigned_to: Option<Uuid>,
}

impl TryFrom<&TaskRecord> for TaskSnapshot {
    type Error = anyhow::Error;

    fn try_from(record: &TaskRecord) -> Result<Self, Self::Error> {
        Ok(TaskSnapshot {
            title: record.title.clone(),
            description: record.description.clone(),
            status: record.status.parse().map_err(anyhow::Error::msg)?,
            priority: record.priority.parse().map_err(anyhow::Error::msg)?,
            due_date: record.due_date,
            assigned_to: record.assigned_to,
        })
    }
}

/// Creation with an assignee other than the actor notifies the assignee.
pub fn plan_for_create(actor: &Actor, project_name: &str, task: &TaskOut) -> Vec<NotificationPlan> {
    let Some(assignee) = task.assigned_to.as_ref() else {
        return vec![];
    };
    if assignee.id == actor.id {
        return vec![];
    }
    vec![NotificationPlan {
        recipient: assignee.id,
        kind: NotificationKind::TaskAssigned,
        message: format!(
            "You've been assigned to new task: \"{}\" in project \"{}\".",
            task.title, project_name
        ),
        task_id: Some(task.id),
    }]
}

/// Assignment changes notify the new assignee (`task_assigned`) and the
/// previous one (`task_unassigned`); both may fire in one update. For an
/// unchanged non-null assignee, a status change wins over a generic field
/// update and at most one notification is produced.
pub fn plan_for_update(
    actor: &Actor,
    project_name: &str,
    before: &TaskSnapshot,
    after: &TaskOut,
) -> Vec<NotificationPlan> {
    let mut plans = Vec::new();
    let new_assignee = after.assigned_to.as_ref().map(|u| u.id);

    if before.assigned_to != new_assignee {
        if let Some(new_id) = new_assignee {
            if new_id != actor.id {
                plans.push(NotificationPlan {
                    recipient: new_id,
                    kind: NotificationKind::TaskAssigned,
                    message: format!(
                        "You've been assigned to task: \"{}\" in project \"{}\".",
                        after.title, project_name
                    ),
                    task_id: Some(after.id),
                });
            }
        }
        if let Some(old_id) = before.assigned_to {
            if old_id != actor.id {
                plans.push(NotificationPlan {
                    recipient: old_id,
                    kind: NotificationKind::TaskUnassigned,
                    message: format!(
                        "You've been unassigned from task: \"{}\" in project \"{}\".",
                        after.title, project_name
                    ),
                    task_id: Some(after.id),
                });
            }
        }
        return plans;
    }

    let Some(assignee) = new_assignee else {
        return plans;
    };
    if assignee == actor.id {
        return plans;
    }

    if before.status != after.status {
        plans.push(NotificationPlan {
            recipient: assignee,
            kind: NotificationKind::TaskStatusChange,
            message: format!(
                "{} changed status of your task \"{}\" to \"{}\" in project \"{}\".",
                actor.username, after.title, after.status, project_name
            ),
            task_id: Some(after.id),
        });
    } else if before.title != after.title
        || before.description != after.description
        || before.priority != after.priority
        || before.due_date != after.due_date
    {
        plans.push(NotificationPlan {
            recipient: assignee,
            kind: NotificationKind::TaskUpdated,
            message: format!(
                "{} updated details of your task: \"{}\" in project \"{}\".",
                actor.username, after.title, project_name
            ),
            task_id: Some(after.id),
        });
    }
    plans
}

/// Deletion notifies the assignee; the task id is gone, so the notification
/// carries no task reference.
pub fn plan_for_delete(
    actor: &Actor,
    project_name: &str,
    task_title: &str,
    assigned_to: Option<Uuid>,
) -> Vec<NotificationPlan> {
    let Some(assignee) = assigned_to else {
        return vec![];
    };
    if assignee == actor.id {
        return vec![];
    }
    vec![NotificationPlan {
        recipient: assignee,
        kind: NotificationKind::TaskDeleted,
        message: format!(
            "Your assigned task: \"{}\" was deleted by {} from project \"{}\".",
            task_title, actor.username, project_name
        ),
        task_id: None,
    }]
}

/// Attachment addition is a task update from the assignee's point of view.
pub fn plan_for_attachment(
    actor: &Actor,
    project_name: &str,
    task: &TaskOut,
) -> Vec<NotificationPlan> {
    let Some(assignee) = task.assigned_to.as_ref() else {
        return vec![];
    };
    if assignee.id == actor.id {
        return vec![];
    }
    vec![NotificationPlan {
        recipient: assignee.id,
        kind: NotificationKind::TaskUpdated,
        message: format!(
            "{} added an attachment to your task: \"{}\" in project \"{}\".",
            actor.username, task.title, project_name
        ),
        task_id: Some(task.id),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::UserRef;

    fn actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            username: "actor".into(),
        }
    }

    fn task_with_assignee(assignee: Option<UserRef>) -> TaskOut {
        let now = OffsetDateTime::now_utc();
        TaskOut {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "Ship it".into(),
            description: "desc".into(),
            status: TaskStatus::ToDo,
            priority: TaskPriority::Medium,
            due_date: None,
            assigned_to: assignee,
            created_by: UserRef {
                id: Uuid::new_v4(),
                username: "creator".into(),
            },
            attachments: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn snapshot_of(task: &TaskOut) -> TaskSnapshot {
        TaskSnapshot {
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            priority: task.priority,
            due_date: task.due_date,
            assigned_to: task.assigned_to.as_ref().map(|u| u.id),
        }
    }

    fn user_ref(name: &str) -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            username: name.into(),
        }
    }

    #[test]
    fn create_with_other_assignee_notifies_them() {
        let actor = actor();
        let assignee = user_ref("bob");
        let task = task_with_assignee(Some(assignee.clone()));
        let plans = plan_for_create(&actor, "Apollo", &task);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].recipient, assignee.id);
        assert_eq!(plans[0].kind, NotificationKind::TaskAssigned);
        assert!(plans[0].message.contains("Ship it"));
        assert!(plans[0].message.contains("Apollo"));
    }

    #[test]
    fn create_never_notifies_the_actor_or_nobody() {
        let actor = actor();
        let self_assigned = task_with_assignee(Some(UserRef {
            id: actor.id,
            username: actor.username.clone(),
        }));
        assert!(plan_for_create(&actor, "P", &self_assigned).is_empty());
        assert!(plan_for_create(&actor, "P", &task_with_assignee(None)).is_empty());
    }

    #[test]
    fn reassignment_notifies_both_sides() {
        let actor = actor();
        let old = user_ref("old");
        let new = user_ref("new");
        let before_task = task_with_assignee(Some(old.clone()));
        let before = snapshot_of(&before_task);
        let mut after = before_task;
        after.assigned_to = Some(new.clone());

        let plans = plan_for_update(&actor, "P", &before, &after);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].kind, NotificationKind::TaskAssigned);
        assert_eq!(plans[0].recipient, new.id);
        assert_eq!(plans[1].kind, NotificationKind::TaskUnassigned);
        assert_eq!(plans[1].recipient, old.id);
    }

    #[test]
    fn assignment_from_actor_to_other_only_notifies_new_assignee() {
        let actor = actor();
        let new = user_ref("new");
        let before_task = task_with_assignee(Some(UserRef {
            id: actor.id,
            username: actor.username.clone(),
        }));
        let before = snapshot_of(&before_task);
        let mut after = before_task;
        after.assigned_to = Some(new.clone());

        let plans = plan_for_update(&actor, "P", &before, &after);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].recipient, new.id);
    }

    #[test]
    fn unassigning_notifies_previous_assignee() {
        let actor = actor();
        let old = user_ref("old");
        let before_task = task_with_assignee(Some(old.clone()));
        let before = snapshot_of(&before_task);
        let mut after = before_task;
        after.assigned_to = None;

        let plans = plan_for_update(&actor, "P", &before, &after);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, NotificationKind::TaskUnassigned);
        assert_eq!(plans[0].recipient, old.id);
    }

    #[test]
    fn status_change_to_unchanged_assignee_is_exactly_one_status_notification() {
        let actor = actor();
        let assignee = user_ref("bob");
        let before_task = task_with_assignee(Some(assignee.clone()));
        let before = snapshot_of(&before_task);
        let mut after = before_task;
        after.status = TaskStatus::Done;
        // Title changed too: status change must win, still one notification.
        after.title = "Ship it now".into();

        let plans = plan_for_update(&actor, "P", &before, &after);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, NotificationKind::TaskStatusChange);
        assert!(plans[0].message.contains("\"Done\""));
    }

    #[test]
    fn field_change_without_status_change_is_generic_update() {
        let actor = actor();
        let assignee = user_ref("bob");
        let before_task = task_with_assignee(Some(assignee));
        let before = snapshot_of(&before_task);
        let mut after = before_task;
        after.priority = TaskPriority::High;
        after.description = "new desc".into();

        let plans = plan_for_update(&actor, "P", &before, &after);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, NotificationKind::TaskUpdated);
    }

    #[test]
    fn no_observable_change_produces_nothing() {
        let actor = actor();
        let before_task = task_with_assignee(Some(user_ref("bob")));
        let before = snapshot_of(&before_task);
        let after = before_task.clone();
        assert!(plan_for_update(&actor, "P", &before, &after).is_empty());
    }

    #[test]
    fn status_change_on_self_assigned_task_is_silent() {
        let actor = actor();
        let before_task = task_with_assignee(Some(UserRef {
            id: actor.id,
            username: actor.username.clone(),
        }));
        let before = snapshot_of(&before_task);
        let mut after = before_task;
        after.status = TaskStatus::Done;
        assert!(plan_for_update(&actor, "P", &before, &after).is_empty());
    }

    #[test]
    fn status_change_on_unassigned_task_is_silent() {
        let actor = actor();
        let before_task = task_with_assignee(None);
        let before = snapshot_of(&before_task);
        let mut after = before_task;
        after.status = TaskStatus::InProgress;
        assert!(plan_for_update(&actor, "P", &before, &after).is_empty());
    }

    #[test]
    fn delete_notifies_assignee_without_task_reference() {
        let actor = actor();
        let assignee = Uuid::new_v4();
        let plans = plan_for_delete(&actor, "P", "Ship it", Some(assignee));
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, NotificationKind::TaskDeleted);
        assert_eq!(plans[0].task_id, None);
        assert!(plans[0].message.contains("deleted by actor"));
    }

    #[test]
    fn delete_of_own_or_unassigned_task_is_silent() {
        let actor = actor();
        assert!(plan_for_delete(&actor, "P", "T", Some(actor.id)).is_empty());
        assert!(plan_for_delete(&actor, "P", "T", None).is_empty());
    }

    #[test]
    fn attachment_notifies_assignee_as_update() {
        let actor = actor();
        let task = task_with_assignee(Some(user_ref("bob")));
        let plans = plan_for_attachment(&actor, "P", &task);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, NotificationKind::TaskUpdated);
        assert!(plans[0].message.contains("attachment"));
    }
}

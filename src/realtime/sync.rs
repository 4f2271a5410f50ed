use tracing::debug;

use crate::chat::dto::MessageOut;
use crate::notifications::dto::NotificationOut;
use crate::realtime::events::ServerEvent;
use crate::tasks::dto::TaskOut;

/// Locally rendered view state for one project plus the viewer's
/// notification tray, kept consistent by merging room events in arrival
/// order. Mirrors what the browser client does; usable by any Rust client
/// and by tests asserting merge semantics.
///
/// Arrival order is taken as emission order (a single hub serializes
/// emission per room), so messages are never reordered by timestamp.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClientState {
    pub tasks: Vec<TaskOut>,
    pub messages: Vec<MessageOut>,
    pub notifications: Vec<NotificationOut>,
}

impl ClientState {
    pub fn apply(&mut self, event: ServerEvent) {
        match event {
            // Guard against double insertion from an optimistic local add.
            ServerEvent::TaskCreated(task) => {
                if !self.tasks.iter().any(|t| t.id == task.id) {
                    self.tasks.push(task);
                }
            }
            // Replace in place; an unknown id is a missed creation.
            ServerEvent::TaskUpdated(task) => {
                match self.tasks.iter_mut().find(|t| t.id == task.id) {
                    Some(slot) => *slot = task,
                    None => self.tasks.push(task),
                }
            }
            // Tolerate absence: the entry may already be gone.
            ServerEvent::TaskDeleted(id) => {
                self.tasks.retain(|t| t.id != id);
            }
            ServerEvent::NewMessage(message) => {
                self.messages.push(message);
            }
            // Most recent first.
            ServerEvent::NewNotification(notification) => {
                self.notifications.insert(0, notification);
            }
            // Replace by id, preserving list position.
            ServerEvent::NotificationUpdated(notification) => {
                if let Some(slot) = self
                    .notifications
                    .iter_mut()
                    .find(|n| n.id == notification.id)
                {
                    *slot = notification;
                } else {
                    debug!(id = %notification.id, "update for unknown notification dropped");
                }
            }
            ServerEvent::AllNotificationsRead => {
                for n in &mut self.notifications {
                    n.is_read = true;
                }
            }
        }
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::UserRef;
    use crate::notifications::dto::NotificationKind;
    use crate::tasks::dto::{TaskPriority, TaskStatus};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user(name: &str) -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            username: name.into(),
        }
    }

    fn task(title: &str) -> TaskOut {
        let now = OffsetDateTime::now_utc();
        TaskOut {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::ToDo,
            priority: TaskPriority::Medium,
            due_date: None,
            assigned_to: None,
            created_by: user("creator"),
            attachments: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn notification(kind: NotificationKind) -> NotificationOut {
        NotificationOut {
            id: Uuid::new_v4(),
            recipient: Uuid::new_v4(),
            sender: Some(user("sender")),
            project: None,
            task: None,
            kind,
            message: "hi".into(),
            is_read: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn message(content: &str) -> MessageOut {
        MessageOut {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            sender: user("sender"),
            content: content.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn created_event_merged_into_empty_state_round_trips() {
        let t = task("write spec");
        let mut state = ClientState::default();
        state.apply(ServerEvent::TaskCreated(t.clone()));
        assert_eq!(state.tasks, vec![t]);
    }

    #[test]
    fn duplicate_create_is_not_inserted_twice() {
        let t = task("once");
        let mut state = ClientState::default();
        state.apply(ServerEvent::TaskCreated(t.clone()));
        state.apply(ServerEvent::TaskCreated(t));
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn update_replaces_matching_entry() {
        let mut t = task("before");
        let mut state = ClientState::default();
        state.apply(ServerEvent::TaskCreated(t.clone()));
        t.title = "after".into();
        t.status = TaskStatus::Done;
        state.apply(ServerEvent::TaskUpdated(t.clone()));
        assert_eq!(state.tasks, vec![t]);
    }

    #[test]
    fn update_for_unknown_task_is_a_missed_creation() {
        let t = task("late");
        let mut state = ClientState::default();
        state.apply(ServerEvent::TaskUpdated(t.clone()));
        assert_eq!(state.tasks, vec![t]);
    }

    #[test]
    fn delete_tolerates_absence() {
        let t = task("gone");
        let mut state = ClientState::default();
        state.apply(ServerEvent::TaskCreated(t.clone()));
        state.apply(ServerEvent::TaskDeleted(t.id));
        state.apply(ServerEvent::TaskDeleted(t.id));
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn messages_keep_arrival_order() {
        let mut state = ClientState::default();
        state.apply(ServerEvent::NewMessage(message("first")));
        state.apply(ServerEvent::NewMessage(message("second")));
        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn notifications_prepend_most_recent_first() {
        let mut state = ClientState::default();
        let older = notification(NotificationKind::TaskAssigned);
        let newer = notification(NotificationKind::TaskStatusChange);
        state.apply(ServerEvent::NewNotification(older.clone()));
        state.apply(ServerEvent::NewNotification(newer.clone()));
        assert_eq!(state.notifications[0].id, newer.id);
        assert_eq!(state.notifications[1].id, older.id);
    }

    #[test]
    fn notification_update_preserves_position() {
        let mut state = ClientState::default();
        let a = notification(NotificationKind::TaskAssigned);
        let b = notification(NotificationKind::TaskUpdated);
        state.apply(ServerEvent::NewNotification(a.clone()));
        state.apply(ServerEvent::NewNotification(b));
        let mut read = a.clone();
        read.is_read = true;
        state.apply(ServerEvent::NotificationUpdated(read));
        assert_eq!(state.notifications[1].id, a.id);
        assert!(state.notifications[1].is_read);
    }

    #[test]
    fn all_read_sweeps_every_flag_in_place() {
        let mut state = ClientState::default();
        state.apply(ServerEvent::NewNotification(notification(
            NotificationKind::TaskAssigned,
        )));
        state.apply(ServerEvent::NewNotification(notification(
            NotificationKind::TaskDeleted,
        )));
        assert_eq!(state.unread_count(), 2);
        state.apply(ServerEvent::AllNotificationsRead);
        assert_eq!(state.unread_count(), 0);
        assert_eq!(state.notifications.len(), 2);
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::dto::MessageOut;
use crate::notifications::dto::NotificationOut;
use crate::tasks::dto::TaskOut;

/// Server-to-client events, one per mutation kind. Wire shape is
/// `{"event": "...", "data": ...}`; `allNotificationsRead` carries no data.
///
/// Project rooms receive the task and message events, user rooms the
/// notification events. Payloads are always the server-populated entity
/// (or the bare id for deletion) so clients never see unresolved references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    TaskCreated(TaskOut),
    TaskUpdated(TaskOut),
    TaskDeleted(Uuid),
    NewMessage(MessageOut),
    NewNotification(NotificationOut),
    NotificationUpdated(NotificationOut),
    AllNotificationsRead,
}

/// Client-to-server commands on the WebSocket. The connection identity comes
/// from the upgrade token; `joinUser` must name that same identity and
/// `sendMessage` senders are taken from it, never from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    JoinProject { project_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveProject { project_id: Uuid },
    #[serde(rename_all = "camelCase")]
    JoinUser { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    SendMessage { project_id: Uuid, content: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_deleted_carries_the_bare_id() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ServerEvent::TaskDeleted(id)).unwrap();
        assert_eq!(json["event"], "taskDeleted");
        assert_eq!(json["data"], serde_json::json!(id));
    }

    #[test]
    fn all_notifications_read_has_no_payload() {
        let json = serde_json::to_value(ServerEvent::AllNotificationsRead).unwrap();
        assert_eq!(json["event"], "allNotificationsRead");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn client_commands_parse_camel_case() {
        let pid = Uuid::new_v4();
        let cmd: ClientCommand = serde_json::from_value(serde_json::json!({
            "event": "sendMessage",
            "data": { "projectId": pid, "content": "hello" }
        }))
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::SendMessage {
                project_id: pid,
                content: "hello".into()
            }
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        let res: Result<ClientCommand, _> = serde_json::from_value(serde_json::json!({
            "event": "dropTables",
            "data": {}
        }));
        assert!(res.is_err());
    }
}

//! Notification Emitter: persists planned notifications and pushes them to
//! the recipient's user room.
//!
//! This is the notify half of the two-phase contract. The primary entity
//! write has already committed when `dispatch` runs; whatever fails here is
//! reported as a [`NotifyError`] for the caller to log, never converted into
//! a request failure and never retried. The notification row is written
//! before emission, so the notification itself stays durable even when the
//! push is lost.

use tracing::debug;
use uuid::Uuid;

use crate::realtime::{Room, ServerEvent};
use crate::state::AppState;

use super::dto::NotificationKind;
use super::repo;

/// One notification the decision logic wants created.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPlan {
    pub recipient: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    /// None when the subject task no longer exists (deletion).
    pub task_id: Option<Uuid>,
}

/// Side-effect-path failure, kept distinct from `ApiError` so it cannot
/// propagate into the primary response.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Loading the actor or project the plans are built from failed.
    #[error("loading notification context failed: {0}")]
    Context(#[source] anyhow::Error),
    #[error("persisting notification failed: {0}")]
    Persist(#[source] anyhow::Error),
    #[error("notification {0} missing on re-read")]
    MissingAfterWrite(Uuid),
}

/// Persists each plan, re-reads it populated, and emits `newNotification`
/// to the recipient's user room. Returns how many were emitted. Stops at
/// the first failure; already-emitted notifications stand.
pub async fn dispatch(
    state: &AppState,
    sender: Uuid,
    project: Option<Uuid>,
    plans: Vec<NotificationPlan>,
) -> Result<usize, NotifyError> {
    let mut emitted = 0;
    for plan in plans {
        let id = repo::create(
            &state.db,
            plan.recipient,
            Some(sender),
            project,
            plan.task_id,
            plan.kind,
            &plan.message,
        )
        .await
        .map_err(NotifyError::Persist)?;

        let notification = repo::find_populated(&state.db, id)
            .await
            .map_err(NotifyError::Persist)?
            .ok_or(NotifyError::MissingAfterWrite(id))?;

        let delivered = state.hub.emit(
            Room::User(plan.recipient),
            ServerEvent::NewNotification(notification),
        );
        debug!(notification = %id, recipient = %plan.recipient, delivered, "notification dispatched");
        emitted += 1;
    }
    Ok(emitted)
}

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use super::events::ServerEvent;

/// Identifier of one WebSocket connection. A user with several sessions has
/// several connection ids, each delivered to independently.
pub type ConnId = Uuid;

/// Logical broadcast group. A connection belongs to at most one user room
/// and any number of project rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Project(Uuid),
    User(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Project(id) => write!(f, "project:{id}"),
            Room::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Process-wide room registry. Constructed once at startup and injected via
/// `AppState`; tests instantiate isolated hubs directly.
///
/// The lock is held only to mutate or snapshot the registry, never across an
/// await point. Sends go through unbounded channels, so `emit` never blocks;
/// a send to a connection that disconnected between publish and flush is
/// dropped and the stale entry pruned. Nothing is persisted here: restart
/// loses all memberships and clients must rejoin.
pub struct Hub {
    rooms: Mutex<HashMap<Room, HashMap<ConnId, UnboundedSender<ServerEvent>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a connection to a room. Idempotent: re-joining replaces the
    /// sender entry, it never duplicates delivery.
    pub fn join(&self, room: Room, conn: ConnId, tx: UnboundedSender<ServerEvent>) {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        rooms.entry(room).or_default().insert(conn, tx);
        debug!(%room, %conn, "connection joined room");
    }

    pub fn leave(&self, room: Room, conn: ConnId) {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        if let Some(members) = rooms.get_mut(&room) {
            members.remove(&conn);
            if members.is_empty() {
                rooms.remove(&room);
            }
        }
        debug!(%room, %conn, "connection left room");
    }

    /// Removes a connection from every room it belongs to. Called
    /// synchronously on socket close; there is no grace period.
    pub fn disconnect(&self, conn: ConnId) {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
        debug!(%conn, "connection removed from all rooms");
    }

    /// Delivers an event to every current member of a room, returning how
    /// many connections it was handed to. At-most-once: failed sends are
    /// dropped, the dead entry removed, nothing retried.
    pub fn emit(&self, room: Room, event: ServerEvent) -> usize {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        let Some(members) = rooms.get_mut(&room) else {
            debug!(%room, "emit to empty room");
            return 0;
        };

        let mut delivered = 0;
        members.retain(|conn, tx| match tx.send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(%room, %conn, "dropping event for closed connection");
                false
            }
        });
        if members.is_empty() {
            rooms.remove(&room);
        }
        debug!(%room, delivered, "event emitted");
        delivered
    }

    #[cfg(test)]
    pub fn room_size(&self, room: Room) -> usize {
        self.rooms
            .lock()
            .expect("hub lock poisoned")
            .get(&room)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn conn() -> (ConnId, UnboundedSender<ServerEvent>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), tx, rx)
    }

    #[tokio::test]
    async fn emit_reaches_every_room_member() {
        let hub = Hub::new();
        let room = Room::Project(Uuid::new_v4());
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        hub.join(room, c1, tx1);
        hub.join(room, c2, tx2);

        let id = Uuid::new_v4();
        assert_eq!(hub.emit(room, ServerEvent::TaskDeleted(id)), 2);
        assert_eq!(rx1.recv().await.unwrap(), ServerEvent::TaskDeleted(id));
        assert_eq!(rx2.recv().await.unwrap(), ServerEvent::TaskDeleted(id));
    }

    #[tokio::test]
    async fn joining_twice_delivers_once() {
        let hub = Hub::new();
        let room = Room::Project(Uuid::new_v4());
        let (c, tx, mut rx) = conn();
        hub.join(room, c, tx.clone());
        hub.join(room, c, tx);

        assert_eq!(hub.room_size(room), 1);
        hub.emit(room, ServerEvent::AllNotificationsRead);
        assert_eq!(rx.recv().await.unwrap(), ServerEvent::AllNotificationsRead);
        assert!(rx.try_recv().is_err(), "second delivery for one emission");
    }

    #[tokio::test]
    async fn events_are_room_scoped() {
        let hub = Hub::new();
        let p1 = Room::Project(Uuid::new_v4());
        let p2 = Room::Project(Uuid::new_v4());
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        hub.join(p1, c1, tx1);
        hub.join(p2, c2, tx2);

        hub.emit(p1, ServerEvent::TaskDeleted(Uuid::new_v4()));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_removes_from_all_rooms() {
        let hub = Hub::new();
        let project = Room::Project(Uuid::new_v4());
        let user = Room::User(Uuid::new_v4());
        let (c, tx, _rx) = conn();
        hub.join(project, c, tx.clone());
        hub.join(user, c, tx);

        hub.disconnect(c);
        assert_eq!(hub.room_size(project), 0);
        assert_eq!(hub.room_size(user), 0);
        assert_eq!(hub.emit(project, ServerEvent::AllNotificationsRead), 0);
    }

    #[tokio::test]
    async fn closed_receiver_is_pruned_without_error() {
        let hub = Hub::new();
        let room = Room::User(Uuid::new_v4());
        let (c1, tx1, rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        hub.join(room, c1, tx1);
        hub.join(room, c2, tx2);
        drop(rx1);

        assert_eq!(hub.emit(room, ServerEvent::AllNotificationsRead), 1);
        assert!(rx2.try_recv().is_ok());
        assert_eq!(hub.room_size(room), 1);
    }

    #[tokio::test]
    async fn emit_to_unknown_room_is_a_noop() {
        let hub = Hub::new();
        assert_eq!(
            hub.emit(Room::User(Uuid::new_v4()), ServerEvent::AllNotificationsRead),
            0
        );
    }
}

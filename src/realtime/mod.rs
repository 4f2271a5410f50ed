//! Real-time layer: room registry (hub), typed events, the WebSocket
//! endpoint, and the client-side reconciliation rules.
//!
//! Every state-changing handler publishes exactly one room-scoped event after
//! its write commits. Delivery is at-most-once per connected member with no
//! replay: a connection that joins a room after an emission never sees it.

use crate::state::AppState;
use axum::{routing::get, Router};

pub mod events;
pub mod hub;
pub mod socket;
pub mod sync;

pub use events::ServerEvent;
pub use hub::{Hub, Room};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(socket::ws_handler))
}

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRef, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::services::JwtKeys,
    chat, projects,
    realtime::{
        events::{ClientCommand, ServerEvent},
        hub::{ConnId, Room},
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

/// GET /ws?token=<access JWT>
///
/// The upgrade itself is the authentication boundary: without a valid access
/// token there is no connection, and the token's subject is the identity used
/// for room-join checks and chat sender attribution.
#[instrument(skip(state, params, ws))]
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let keys = JwtKeys::from_ref(&state);
    let claims = match keys.verify_access(&params.token) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "websocket upgrade refused");
            return (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response();
        }
    };
    let user_id = claims.sub;
    ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let conn_id: ConnId = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Forward hub deliveries to the socket. If the client is gone the hub
    // prunes the sender on its next emit; nothing is retried.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "event serialization failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    info!(%conn_id, %user_id, "websocket connected");

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(%conn_id, error = %e, "websocket read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(cmd) => handle_command(&state, user_id, conn_id, &tx, cmd).await,
                Err(e) => warn!(%conn_id, error = %e, "ignoring malformed command"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Immediate, synchronous removal from every room; memberships are not
    // persisted, a reconnecting client must rejoin.
    state.hub.disconnect(conn_id);
    send_task.abort();
    info!(%conn_id, %user_id, "websocket disconnected");
}

async fn handle_command(
    state: &AppState,
    user_id: Uuid,
    conn_id: ConnId,
    tx: &UnboundedSender<ServerEvent>,
    cmd: ClientCommand,
) {
    match cmd {
        ClientCommand::JoinProject { project_id } => {
            match projects::repo::is_owner_or_member(&state.db, project_id, user_id).await {
                Ok(true) => state.hub.join(Room::Project(project_id), conn_id, tx.clone()),
                Ok(false) => {
                    warn!(%conn_id, %user_id, %project_id, "join refused: not a project member")
                }
                Err(e) => error!(error = %e, %project_id, "membership lookup failed"),
            }
        }
        ClientCommand::LeaveProject { project_id } => {
            state.hub.leave(Room::Project(project_id), conn_id);
        }
        ClientCommand::JoinUser { user_id: requested } => {
            if requested == user_id {
                state.hub.join(Room::User(user_id), conn_id, tx.clone());
            } else {
                warn!(%conn_id, %user_id, %requested, "join refused: user room mismatch");
            }
        }
        ClientCommand::SendMessage {
            project_id,
            content,
        } => {
            let content = content.trim();
            if content.is_empty() {
                warn!(%conn_id, %project_id, "ignoring empty chat message");
                return;
            }
            match projects::repo::is_owner_or_member(&state.db, project_id, user_id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(%conn_id, %user_id, %project_id, "message refused: not a project member");
                    return;
                }
                Err(e) => {
                    error!(error = %e, %project_id, "membership lookup failed");
                    return;
                }
            }

            // Persist first, then re-read populated and broadcast. The
            // message is never echoed without the round trip.
            let message_id = match chat::repo::create(&state.db, project_id, user_id, content).await
            {
                Ok(id) => id,
                Err(e) => {
                    error!(error = %e, %project_id, "saving chat message failed");
                    return;
                }
            };
            match chat::repo::find_populated(&state.db, message_id).await {
                Ok(Some(message)) => {
                    state
                        .hub
                        .emit(Room::Project(project_id), ServerEvent::NewMessage(message));
                }
                Ok(None) => error!(%message_id, "saved message missing on re-read"),
                Err(e) => error!(error = %e, %message_id, "populating chat message failed"),
            }
        }
    }
}

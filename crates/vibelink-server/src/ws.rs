//! The WebSocket session loop.
//!
//! One task per connection reads `ClientEvent` frames and dispatches them; a
//! writer task drains the connection's outbound queue. The first event must
//! be `register` — everything else is dropped until an identity is bound to
//! the connection. Identity fields inside later payloads are overridden with
//! the registered id, never trusted from the wire.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use vibelink_shared::protocol::{ClientEvent, ServerEvent};
use vibelink_shared::types::SessionId;

use crate::state::AppState;
use crate::{presence, requests, rooms};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(json) = event.to_json() else {
                continue;
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut session_id: Option<SessionId> = None;

    while let Some(frame) = stream.next().await {
        let raw = match frame {
            Ok(Message::Text(raw)) => raw,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };

        match ClientEvent::from_json(&raw) {
            Ok(event) => dispatch(&state, &tx, &mut session_id, event).await,
            Err(e) => debug!(error = %e, "ignoring undecodable frame"),
        }
    }

    if let Some(id) = session_id {
        rooms::disconnect(&state, &id).await;
    }
    writer.abort();
}

async fn dispatch(
    state: &AppState,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    bound: &mut Option<SessionId>,
    event: ClientEvent,
) {
    let event = match event {
        ClientEvent::Register { session_id, name } => {
            if presence::register(state, &session_id, &name, tx.clone()).await {
                *bound = Some(session_id);
            }
            return;
        }
        other => other,
    };

    let Some(session_id) = bound.clone() else {
        debug!("event before registration, dropping");
        return;
    };

    match event {
        ClientEvent::Register { .. } => {}

        ClientEvent::GoFree { name, status, .. } => {
            presence::go_free(state, &session_id, &name, &status).await;
        }
        ClientEvent::GoBusy { .. } => presence::go_busy(state, &session_id).await,

        ClientEvent::SendChatRequest(mut request) => {
            request.sender_id = session_id;
            requests::send_request(state, request).await;
        }
        ClientEvent::AcceptChat { sender_id, sender_name, receiver_name, .. } => {
            requests::accept_request(state, sender_id, sender_name, session_id, receiver_name).await;
        }
        ClientEvent::RejectChat { sender_id, .. } => {
            requests::reject_request(state, sender_id, session_id).await;
        }

        ClientEvent::Typing { room_id, sender_name } => {
            rooms::relay_typing(state, room_id, &session_id, sender_name).await;
        }
        ClientEvent::StopTyping { room_id } => {
            rooms::relay_stop_typing(state, room_id, &session_id).await;
        }
        ClientEvent::SendMessage { room_id, content, sender_name, kind, client_id } => {
            rooms::relay_message(state, room_id, content, sender_name, kind, client_id).await;
        }
        ClientEvent::EditMessage { room_id, message_id, new_text } => {
            rooms::relay_edit(state, room_id, message_id, new_text).await;
        }
        ClientEvent::DeleteMessage { room_id, message_id } => {
            rooms::relay_delete(state, room_id, message_id).await;
        }
        ClientEvent::EndChat { room_id, sender_name } => {
            rooms::end_chat(state, room_id, &session_id, sender_name).await;
        }
        ClientEvent::Reaction { room_id, target_id, emoji } => {
            rooms::relay_reaction(state, room_id, target_id, emoji).await;
        }

        ClientEvent::GameToggle { room_id, open } => {
            rooms::game_toggle(state, room_id, &session_id, open).await;
        }
        ClientEvent::GameSelect { room_id, emoji, .. } => {
            rooms::game_select(state, room_id, &session_id, emoji).await;
        }

        ClientEvent::DrawStart { room_id, x, y, color } => {
            rooms::draw_start(state, room_id, &session_id, x, y, color).await;
        }
        ClientEvent::DrawMove { room_id, x, y } => {
            rooms::draw_move(state, room_id, &session_id, x, y).await;
        }
        ClientEvent::DrawClear { room_id } => {
            rooms::draw_clear(state, room_id, &session_id).await;
        }
        ClientEvent::DrawToggle { room_id, open } => {
            rooms::draw_toggle(state, room_id, &session_id, open).await;
        }
    }
}

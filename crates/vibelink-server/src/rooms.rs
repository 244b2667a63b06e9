//! Room-scoped relaying: chat messages, typing, reactions, the mini-game
//! round loop and the drawing channel. Per-room ordering follows from one
//! outbound queue per connection; everything here just decides who gets
//! which event.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use vibelink_shared::message::ChatMessage;
use vibelink_shared::protocol::ServerEvent;
use vibelink_shared::types::{MessageKind, RoomId, RoundResult, SessionId};

use crate::state::{AppState, GameState};

/// Assign the authoritative id and timestamp, then echo to *both*
/// participants — the sender's echo is what resolves its optimistic entry.
pub async fn relay_message(
    state: &AppState,
    room_id: RoomId,
    content: String,
    sender_name: String,
    kind: MessageKind,
    client_id: Uuid,
) {
    let registry = state.registry.lock().await;
    let Some(room) = registry.rooms.get(&room_id) else {
        return;
    };

    let message = ChatMessage {
        id: Some(Uuid::new_v4().to_string()),
        client_id: Some(client_id),
        sender: sender_name,
        text: content,
        kind,
        timestamp: Utc::now(),
        edited: false,
        deleted: false,
        expired: false,
        system: false,
    };

    for participant in &room.participants {
        registry.send_to(
            participant,
            ServerEvent::NewMessage { room_id: room_id.clone(), message: message.clone() },
        );
    }
}

pub async fn relay_edit(state: &AppState, room_id: RoomId, message_id: String, new_text: String) {
    let registry = state.registry.lock().await;
    let Some(room) = registry.rooms.get(&room_id) else {
        return;
    };
    for participant in &room.participants {
        registry.send_to(
            participant,
            ServerEvent::MessageUpdated {
                room_id: room_id.clone(),
                message_id: message_id.clone(),
                new_text: new_text.clone(),
            },
        );
    }
}

pub async fn relay_delete(state: &AppState, room_id: RoomId, message_id: String) {
    let registry = state.registry.lock().await;
    let Some(room) = registry.rooms.get(&room_id) else {
        return;
    };
    for participant in &room.participants {
        registry.send_to(
            participant,
            ServerEvent::MessageDeleted { room_id: room_id.clone(), message_id: message_id.clone() },
        );
    }
}

/// Typing indicators go to the partner only.
pub async fn relay_typing(state: &AppState, room_id: RoomId, session_id: &SessionId, sender_name: String) {
    let registry = state.registry.lock().await;
    let Some(peer) = registry.rooms.get(&room_id).and_then(|room| room.peer_of(session_id)) else {
        return;
    };
    registry.send_to(peer, ServerEvent::PartnerTyping { room_id: room_id.clone(), sender_name });
}

pub async fn relay_stop_typing(state: &AppState, room_id: RoomId, session_id: &SessionId) {
    let registry = state.registry.lock().await;
    let Some(peer) = registry.rooms.get(&room_id).and_then(|room| room.peer_of(session_id)) else {
        return;
    };
    registry.send_to(peer, ServerEvent::PartnerStopTyping { room_id: room_id.clone() });
}

/// Reactions echo to both parties, the sender included, so the sender's own
/// overlay animates off the broadcast like everyone else's.
pub async fn relay_reaction(state: &AppState, room_id: RoomId, target_id: String, emoji: String) {
    let registry = state.registry.lock().await;
    let Some(room) = registry.rooms.get(&room_id) else {
        return;
    };
    for participant in &room.participants {
        registry.send_to(
            participant,
            ServerEvent::Reaction {
                room_id: room_id.clone(),
                target_id: target_id.clone(),
                emoji: emoji.clone(),
            },
        );
    }
}

/// Explicit end-chat: tear the room down and flip the peer into the
/// terminal "partner left" state.
pub async fn end_chat(state: &AppState, room_id: RoomId, session_id: &SessionId, sender_name: String) {
    let mut registry = state.registry.lock().await;
    let Some(room) = registry.rooms.remove(&room_id) else {
        return;
    };
    info!(room = %room_id, by = %session_id, "chat ended");

    for participant in &room.participants {
        if let Some(handle) = registry.sessions.get_mut(participant) {
            handle.room = None;
        }
    }
    if let Some(peer) = room.peer_of(session_id) {
        registry.send_to(
            peer,
            ServerEvent::PartnerLeft { room_id, sender_name },
        );
    }
}

/// Socket gone for good: leave any room the hard way and withdraw from the
/// roster and pending handshakes.
pub async fn disconnect(state: &AppState, session_id: &SessionId) {
    let mut registry = state.registry.lock().await;

    let Some(handle) = registry.sessions.remove(session_id) else {
        return;
    };
    debug!(session = %session_id, "session disconnected");

    if let Some(room_id) = handle.room {
        if let Some(room) = registry.rooms.remove(&room_id) {
            if let Some(peer) = room.peer_of(session_id).cloned() {
                if let Some(peer_handle) = registry.sessions.get_mut(&peer) {
                    peer_handle.room = None;
                }
                registry.send_to(
                    &peer,
                    ServerEvent::PartnerLeft { room_id, sender_name: handle.name.clone() },
                );
            }
        }
    }

    // A vanished receiver can never accept; tell the sender now instead of
    // leaving them to the sweep.
    if let Some(pending) = registry.pending.remove(session_id) {
        registry.send_to(
            &pending.request.sender_id,
            ServerEvent::RequestIgnored {
                message: format!("{} is no longer available", pending.request.receiver_name),
            },
        );
    }

    registry.broadcast_roster();
}

// ---------------------------------------------------------------------------
// Mini-game
// ---------------------------------------------------------------------------

/// Open or close the game for the room. Opening starts round 1 with the
/// toggling party as leader; the broadcast is what flips the clients.
pub async fn game_toggle(state: &AppState, room_id: RoomId, session_id: &SessionId, open: bool) {
    let mut registry = state.registry.lock().await;

    let mut events: Vec<(SessionId, ServerEvent)> = Vec::new();
    {
        let Some(room) = registry.rooms.get_mut(&room_id) else {
            return;
        };
        let Some(idx) = room.index_of(session_id) else {
            return;
        };

        if open {
            room.game = Some(GameState { round: 1, leader: idx, picks: [None, None] });
        } else {
            room.game = None;
        }

        for participant in &room.participants {
            events.push((
                participant.clone(),
                ServerEvent::GameToggled { room_id: room_id.clone(), open },
            ));
            if open {
                events.push((
                    participant.clone(),
                    ServerEvent::GameState {
                        room_id: room_id.clone(),
                        round: 1,
                        turn_id: room.participants[idx].clone(),
                    },
                ));
            }
        }
    }

    for (recipient, event) in events {
        registry.send_to(&recipient, event);
    }
}

/// Record a pick. The leader picks first; the partner is told and may then
/// respond. When both are in, the result goes out followed by the next
/// round's state with the lead alternated.
pub async fn game_select(state: &AppState, room_id: RoomId, session_id: &SessionId, emoji: String) {
    let mut registry = state.registry.lock().await;

    let mut events: Vec<(SessionId, ServerEvent)> = Vec::new();
    {
        let Some(room) = registry.rooms.get_mut(&room_id) else {
            return;
        };
        let Some(idx) = room.index_of(session_id) else {
            return;
        };
        let participants = room.participants.clone();
        let Some(game) = room.game.as_mut() else {
            return;
        };

        if game.picks[idx].is_some() {
            return;
        }
        // Out-of-turn picks before the leader moved are dropped.
        if idx != game.leader && game.picks[game.leader].is_none() {
            debug!(room = %room_id, session = %session_id, "pick out of turn, dropping");
            return;
        }

        game.picks[idx] = Some(emoji);

        if idx == game.leader {
            events.push((
                participants[1 - idx].clone(),
                ServerEvent::GamePartnerSelected { room_id: room_id.clone() },
            ));
        }

        if let (Some(a), Some(b)) = (&game.picks[0], &game.picks[1]) {
            let result = RoundResult {
                selections: participants
                    .iter()
                    .cloned()
                    .zip([a.clone(), b.clone()])
                    .collect(),
                is_match: a == b,
            };

            game.round += 1;
            game.leader = 1 - game.leader;
            game.picks = [None, None];
            let next_round = game.round;
            let next_turn = participants[game.leader].clone();

            for participant in &participants {
                events.push((
                    participant.clone(),
                    ServerEvent::GameResult { room_id: room_id.clone(), result: result.clone() },
                ));
                events.push((
                    participant.clone(),
                    ServerEvent::GameState {
                        room_id: room_id.clone(),
                        round: next_round,
                        turn_id: next_turn.clone(),
                    },
                ));
            }
        }
    }

    for (recipient, event) in events {
        registry.send_to(&recipient, event);
    }
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

pub async fn draw_start(
    state: &AppState,
    room_id: RoomId,
    session_id: &SessionId,
    x: f64,
    y: f64,
    color: String,
) {
    let registry = state.registry.lock().await;
    let Some(peer) = registry.rooms.get(&room_id).and_then(|room| room.peer_of(session_id)) else {
        return;
    };
    registry.send_to(peer, ServerEvent::DrawStarted { room_id: room_id.clone(), x, y, color });
}

pub async fn draw_move(state: &AppState, room_id: RoomId, session_id: &SessionId, x: f64, y: f64) {
    let registry = state.registry.lock().await;
    let Some(peer) = registry.rooms.get(&room_id).and_then(|room| room.peer_of(session_id)) else {
        return;
    };
    registry.send_to(peer, ServerEvent::DrawMoved { room_id: room_id.clone(), x, y });
}

pub async fn draw_clear(state: &AppState, room_id: RoomId, session_id: &SessionId) {
    let registry = state.registry.lock().await;
    let Some(peer) = registry.rooms.get(&room_id).and_then(|room| room.peer_of(session_id)) else {
        return;
    };
    registry.send_to(peer, ServerEvent::DrawCleared { room_id: room_id.clone() });
}

/// Canvas open/close is server-confirmed and symmetric with the game toggle.
pub async fn draw_toggle(state: &AppState, room_id: RoomId, session_id: &SessionId, open: bool) {
    let mut registry = state.registry.lock().await;

    let participants = {
        let Some(room) = registry.rooms.get_mut(&room_id) else {
            return;
        };
        if room.index_of(session_id).is_none() {
            return;
        }
        room.draw_open = open;
        room.participants.clone()
    };

    for participant in &participants {
        registry.send_to(participant, ServerEvent::DrawToggled { room_id: room_id.clone(), open });
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use crate::config::ServerConfig;
    use crate::state::{Room, SessionHandle};

    use super::*;

    async fn state_with_room() -> (
        AppState,
        mpsc::UnboundedReceiver<ServerEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        let state = AppState::new(ServerConfig::default());
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let mut registry = state.registry.lock().await;
        for (id, name, tx) in [("a", "Ada", tx_a), ("b", "Brin", tx_b)] {
            registry.sessions.insert(
                SessionId::from(id),
                SessionHandle {
                    name: name.to_string(),
                    sender: tx,
                    status: None,
                    gender: None,
                    is_premium: false,
                    room: Some(RoomId("room-1".into())),
                },
            );
        }
        registry.rooms.insert(
            RoomId("room-1".into()),
            Room {
                id: RoomId("room-1".into()),
                participants: [SessionId::from("a"), SessionId::from("b")],
                names: ["Ada".into(), "Brin".into()],
                game: None,
                draw_open: false,
            },
        );
        drop(registry);

        (state, rx_a, rx_b)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn message_echo_reaches_both_with_server_id_and_client_id() {
        let (state, mut rx_a, mut rx_b) = state_with_room().await;
        let cid = Uuid::new_v4();

        relay_message(
            &state,
            RoomId("room-1".into()),
            "hello".into(),
            "Ada".into(),
            MessageKind::Text,
            cid,
        )
        .await;

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            let message = events
                .iter()
                .find_map(|e| match e {
                    ServerEvent::NewMessage { message, .. } => Some(message),
                    _ => None,
                })
                .expect("message delivered");
            assert!(message.id.is_some());
            assert_eq!(message.client_id, Some(cid));
        }
    }

    #[tokio::test]
    async fn typing_goes_to_the_partner_only() {
        let (state, mut rx_a, mut rx_b) = state_with_room().await;

        relay_typing(&state, RoomId("room-1".into()), &SessionId::from("a"), "Ada".into()).await;

        assert!(drain(&mut rx_a).is_empty());
        assert!(matches!(
            drain(&mut rx_b).as_slice(),
            [ServerEvent::PartnerTyping { .. }]
        ));
    }

    #[tokio::test]
    async fn reaction_echoes_to_the_sender_too() {
        let (state, mut rx_a, mut rx_b) = state_with_room().await;

        relay_reaction(&state, RoomId("room-1".into()), "s1".into(), "❤️".into()).await;

        assert!(matches!(drain(&mut rx_a).as_slice(), [ServerEvent::Reaction { .. }]));
        assert!(matches!(drain(&mut rx_b).as_slice(), [ServerEvent::Reaction { .. }]));
    }

    #[tokio::test]
    async fn end_chat_notifies_only_the_peer_and_frees_both() {
        let (state, mut rx_a, mut rx_b) = state_with_room().await;

        end_chat(&state, RoomId("room-1".into()), &SessionId::from("a"), "Ada".into()).await;

        assert!(drain(&mut rx_a).is_empty());
        assert!(matches!(
            drain(&mut rx_b).as_slice(),
            [ServerEvent::PartnerLeft { .. }]
        ));

        let registry = state.registry.lock().await;
        assert!(registry.rooms.is_empty());
        assert!(registry.sessions[&SessionId::from("a")].room.is_none());
        assert!(registry.sessions[&SessionId::from("b")].room.is_none());
    }

    #[tokio::test]
    async fn disconnect_flips_the_peer_to_partner_left() {
        let (state, _rx_a, mut rx_b) = state_with_room().await;

        disconnect(&state, &SessionId::from("a")).await;

        let events = drain(&mut rx_b);
        assert!(events.iter().any(|e| matches!(e, ServerEvent::PartnerLeft { .. })));

        let registry = state.registry.lock().await;
        assert!(!registry.sessions.contains_key(&SessionId::from("a")));
        assert!(registry.rooms.is_empty());
    }

    #[tokio::test]
    async fn game_round_runs_leader_first_then_resolves_and_alternates() {
        let (state, mut rx_a, mut rx_b) = state_with_room().await;
        let room = RoomId("room-1".into());

        game_toggle(&state, room.clone(), &SessionId::from("a"), true).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        // The non-leader's early pick is dropped.
        game_select(&state, room.clone(), &SessionId::from("b"), "🔥".into()).await;
        assert!(drain(&mut rx_b).is_empty());

        // Leader picks: partner is told.
        game_select(&state, room.clone(), &SessionId::from("a"), "🔥".into()).await;
        assert!(drain(&mut rx_b)
            .iter()
            .any(|e| matches!(e, ServerEvent::GamePartnerSelected { .. })));

        // Partner responds: result plus the next round, lead alternated.
        game_select(&state, room.clone(), &SessionId::from("b"), "🔥".into()).await;
        let events = drain(&mut rx_a);

        let result = events
            .iter()
            .find_map(|e| match e {
                ServerEvent::GameResult { result, .. } => Some(result),
                _ => None,
            })
            .expect("result delivered");
        assert!(result.is_match);
        assert_eq!(result.selections.len(), 2);

        let next = events
            .iter()
            .find_map(|e| match e {
                ServerEvent::GameState { round, turn_id, .. } => Some((*round, turn_id.clone())),
                _ => None,
            })
            .expect("next round announced");
        assert_eq!(next.0, 2);
        assert_eq!(next.1, SessionId::from("b"));
    }

    #[tokio::test]
    async fn second_pick_by_the_same_party_is_dropped() {
        let (state, mut rx_a, mut rx_b) = state_with_room().await;
        let room = RoomId("room-1".into());

        game_toggle(&state, room.clone(), &SessionId::from("a"), true).await;
        game_select(&state, room.clone(), &SessionId::from("a"), "🔥".into()).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        game_select(&state, room.clone(), &SessionId::from("a"), "✨".into()).await;
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn draw_strokes_relay_to_the_peer_only() {
        let (state, mut rx_a, mut rx_b) = state_with_room().await;
        let room = RoomId("room-1".into());

        draw_toggle(&state, room.clone(), &SessionId::from("a"), true).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        draw_start(&state, room.clone(), &SessionId::from("a"), 0.5, 0.5, "#fff".into()).await;
        draw_move(&state, room.clone(), &SessionId::from("a"), 0.6, 0.6).await;
        draw_clear(&state, room.clone(), &SessionId::from("a")).await;

        assert!(drain(&mut rx_a).is_empty());
        let events = drain(&mut rx_b);
        assert!(matches!(events[0], ServerEvent::DrawStarted { x, y, .. } if x == 0.5 && y == 0.5));
        assert!(matches!(events[1], ServerEvent::DrawMoved { .. }));
        assert!(matches!(events[2], ServerEvent::DrawCleared { .. }));
    }
}

//! The request → accept / reject / expire handshake.
//!
//! The server is the source of truth for the acceptance window: a 1-second
//! sweep expires pending requests after the configured timeout, regardless
//! of what the clients' local countdowns believe. Accepting mints the room
//! and notifies the two parties on their distinct channels (`chat-started`
//! for the initiator, `chat-init-receiver` for the acceptor).

use std::time::{Duration, Instant};

use tracing::{debug, info};

use vibelink_shared::protocol::ServerEvent;
use vibelink_shared::types::{ChatRequest, RoomId, SessionId};

use crate::quota::QuotaKind;
use crate::state::{AppState, PendingRequest, Room};

pub async fn send_request(state: &AppState, mut request: ChatRequest) {
    let sender_id = request.sender_id.clone();

    let (sender_premium, sender_known) = {
        let registry = state.registry.lock().await;
        match registry.sessions.get(&sender_id) {
            Some(handle) => (handle.is_premium, true),
            None => (false, false),
        }
    };
    if !sender_known {
        return;
    }

    let allowed = state
        .quotas
        .try_consume(&sender_id, QuotaKind::Ping, state.unlimited(sender_premium))
        .await;
    let usage = state.quotas.snapshot(&sender_id, sender_premium).await;

    let mut registry = state.registry.lock().await;

    if !allowed {
        registry.send_to(
            &sender_id,
            ServerEvent::RequestFailed {
                message: "Daily vibe request limit reached".to_string(),
                limit_reached: true,
            },
        );
        registry.send_to(&sender_id, ServerEvent::UsageUpdate { usage });
        return;
    }

    let receiver_free = registry
        .sessions
        .get(&request.receiver_id)
        .map(|handle| handle.status.is_some() && handle.room.is_none())
        .unwrap_or(false);

    if !receiver_free {
        registry.send_to(
            &sender_id,
            ServerEvent::RequestFailed {
                message: format!("{} is no longer available", request.receiver_name),
                limit_reached: false,
            },
        );
        registry.send_to(&sender_id, ServerEvent::UsageUpdate { usage });
        return;
    }

    // Priority flag is decided here, not trusted from the client.
    request.is_priority = state.config.elite_enabled && sender_premium;

    debug!(
        sender = %sender_id,
        receiver = %request.receiver_id,
        "chat request delivered"
    );

    // A newer request to the same receiver supersedes the pending one.
    registry.pending.insert(
        request.receiver_id.clone(),
        PendingRequest {
            request: request.clone(),
            expires_at: Instant::now() + Duration::from_secs(state.config.request_timeout_secs),
        },
    );

    registry.send_to(&request.receiver_id.clone(), ServerEvent::ReceiveChatRequest(request));
    registry.send_to(&sender_id, ServerEvent::RequestSentSuccess);
    registry.send_to(&sender_id, ServerEvent::UsageUpdate { usage });
}

pub async fn accept_request(
    state: &AppState,
    sender_id: SessionId,
    sender_name: String,
    receiver_id: SessionId,
    receiver_name: String,
) {
    let mut registry = state.registry.lock().await;

    // Only the tracked pending request can be accepted; a stale accept
    // (already expired or superseded) is dropped.
    let matches = registry
        .pending
        .get(&receiver_id)
        .map(|pending| pending.request.sender_id == sender_id)
        .unwrap_or(false);
    if !matches {
        debug!(sender = %sender_id, receiver = %receiver_id, "accept for unknown request, dropping");
        return;
    }
    registry.pending.remove(&receiver_id);

    let room_id = RoomId::generate();
    info!(room = %room_id, initiator = %sender_id, acceptor = %receiver_id, "room established");

    for id in [&sender_id, &receiver_id] {
        if let Some(handle) = registry.sessions.get_mut(id) {
            handle.room = Some(room_id.clone());
            handle.status = None;
        }
    }

    registry.rooms.insert(
        room_id.clone(),
        Room {
            id: room_id.clone(),
            participants: [sender_id.clone(), receiver_id.clone()],
            names: [sender_name.clone(), receiver_name.clone()],
            game: None,
            draw_open: false,
        },
    );
    registry.monthly_matches += 1;

    // The initiator and the acceptor learn about the room on different
    // channels, converging on the same payload shape.
    registry.send_to(
        &sender_id,
        ServerEvent::ChatStarted { room_id: room_id.clone(), partner_name: receiver_name },
    );
    registry.send_to(
        &receiver_id,
        ServerEvent::ChatInitReceiver { room_id, partner_name: sender_name },
    );

    registry.broadcast_roster();
}

pub async fn reject_request(state: &AppState, sender_id: SessionId, receiver_id: SessionId) {
    let mut registry = state.registry.lock().await;

    let matches = registry
        .pending
        .get(&receiver_id)
        .map(|pending| pending.request.sender_id == sender_id)
        .unwrap_or(false);
    if !matches {
        return;
    }
    registry.pending.remove(&receiver_id);

    registry.send_to(
        &sender_id,
        ServerEvent::RequestRejected {
            message: "Your vibe request was declined".to_string(),
        },
    );
}

/// Expire pending requests past their window. Run from a periodic sweep.
pub async fn sweep_expired(state: &AppState) {
    let now = Instant::now();
    let mut registry = state.registry.lock().await;

    let expired: Vec<SessionId> = registry
        .pending
        .iter()
        .filter(|(_, pending)| pending.expires_at <= now)
        .map(|(receiver, _)| receiver.clone())
        .collect();

    for receiver_id in expired {
        let Some(pending) = registry.pending.remove(&receiver_id) else {
            continue;
        };
        debug!(
            sender = %pending.request.sender_id,
            receiver = %receiver_id,
            "chat request expired"
        );

        registry.send_to(&receiver_id, ServerEvent::RequestExpired);
        registry.send_to(
            &pending.request.sender_id,
            ServerEvent::RequestIgnored {
                message: format!("{} let your vibe fade away", pending.request.receiver_name),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use vibelink_shared::protocol::ServerEvent;

    use crate::config::ServerConfig;
    use crate::state::SessionHandle;

    use super::*;

    async fn connect(
        state: &AppState,
        id: &str,
        status: Option<&str>,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = state.registry.lock().await;
        registry.sessions.insert(
            SessionId::from(id),
            SessionHandle {
                name: id.to_string(),
                sender: tx,
                status: status.map(str::to_string),
                gender: None,
                is_premium: false,
                room: None,
            },
        );
        rx
    }

    fn request(sender: &str, receiver: &str) -> ChatRequest {
        ChatRequest {
            sender_id: SessionId::from(sender),
            sender_name: sender.to_string(),
            receiver_id: SessionId::from(receiver),
            receiver_name: receiver.to_string(),
            sender_vibe: "chill".to_string(),
            is_priority: false,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn request_to_a_busy_target_fails_without_quota_flag() {
        let state = AppState::new(ServerConfig::default());
        let mut sender_rx = connect(&state, "a", Some("tea")).await;
        let _receiver_rx = connect(&state, "b", None).await;

        send_request(&state, request("a", "b")).await;

        let events = drain(&mut sender_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::RequestFailed { limit_reached: false, .. }
        )));
    }

    #[tokio::test]
    async fn quota_exhaustion_is_reported_as_limit_reached() {
        let config = ServerConfig { ping_limit: 1, ..ServerConfig::default() };
        let state = AppState::new(config);
        let mut sender_rx = connect(&state, "a", Some("tea")).await;
        let mut receiver_rx = connect(&state, "b", Some("coffee")).await;

        send_request(&state, request("a", "b")).await;
        assert!(drain(&mut receiver_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::ReceiveChatRequest(_))));

        send_request(&state, request("a", "b")).await;
        let events = drain(&mut sender_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::RequestFailed { limit_reached: true, .. }
        )));
    }

    #[tokio::test]
    async fn accept_creates_the_room_on_asymmetric_channels() {
        let state = AppState::new(ServerConfig::default());
        let mut sender_rx = connect(&state, "a", Some("tea")).await;
        let mut receiver_rx = connect(&state, "b", Some("coffee")).await;

        send_request(&state, request("a", "b")).await;
        accept_request(
            &state,
            SessionId::from("a"),
            "a".into(),
            SessionId::from("b"),
            "b".into(),
        )
        .await;

        let sender_events = drain(&mut sender_rx);
        let receiver_events = drain(&mut receiver_rx);

        let started = sender_events.iter().find_map(|e| match e {
            ServerEvent::ChatStarted { room_id, partner_name } => Some((room_id.clone(), partner_name.clone())),
            _ => None,
        });
        let init = receiver_events.iter().find_map(|e| match e {
            ServerEvent::ChatInitReceiver { room_id, partner_name } => Some((room_id.clone(), partner_name.clone())),
            _ => None,
        });

        let (room_a, partner_a) = started.expect("initiator notified");
        let (room_b, partner_b) = init.expect("acceptor notified");
        assert_eq!(room_a, room_b);
        assert_eq!(partner_a, "b");
        assert_eq!(partner_b, "a");

        // Both left the roster on match.
        let registry = state.registry.lock().await;
        assert!(registry.roster().is_empty());
        assert_eq!(registry.monthly_matches, 1);
    }

    #[tokio::test]
    async fn stale_accept_is_dropped() {
        let state = AppState::new(ServerConfig::default());
        let mut sender_rx = connect(&state, "a", Some("tea")).await;
        let _receiver_rx = connect(&state, "b", Some("coffee")).await;

        // No request was ever delivered.
        accept_request(
            &state,
            SessionId::from("a"),
            "a".into(),
            SessionId::from("b"),
            "b".into(),
        )
        .await;

        assert!(drain(&mut sender_rx)
            .iter()
            .all(|e| !matches!(e, ServerEvent::ChatStarted { .. })));
        assert!(state.registry.lock().await.rooms.is_empty());
    }

    #[tokio::test]
    async fn sweep_notifies_both_parties_once() {
        let config = ServerConfig { request_timeout_secs: 0, ..ServerConfig::default() };
        let state = AppState::new(config);
        let mut sender_rx = connect(&state, "a", Some("tea")).await;
        let mut receiver_rx = connect(&state, "b", Some("coffee")).await;

        send_request(&state, request("a", "b")).await;
        sweep_expired(&state).await;
        sweep_expired(&state).await;

        let expired = drain(&mut receiver_rx)
            .iter()
            .filter(|e| matches!(e, ServerEvent::RequestExpired))
            .count();
        let ignored = drain(&mut sender_rx)
            .iter()
            .filter(|e| matches!(e, ServerEvent::RequestIgnored { .. }))
            .count();
        assert_eq!(expired, 1);
        assert_eq!(ignored, 1);
    }

    #[tokio::test]
    async fn newer_request_supersedes_the_pending_one() {
        let state = AppState::new(ServerConfig::default());
        let _a = connect(&state, "a", Some("tea")).await;
        let _c = connect(&state, "c", Some("walk")).await;
        let mut receiver_rx = connect(&state, "b", Some("coffee")).await;

        send_request(&state, request("a", "b")).await;
        send_request(&state, request("c", "b")).await;

        let delivered = drain(&mut receiver_rx)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::ReceiveChatRequest(req) => Some(req.sender_name),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(delivered, vec!["a".to_string(), "c".to_string()]);

        let registry = state.registry.lock().await;
        let pending = registry.pending.get(&SessionId::from("b")).unwrap();
        assert_eq!(pending.request.sender_id, SessionId::from("c"));
    }
}

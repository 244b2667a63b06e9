//! Session registration, availability and the roster broadcast.

use tokio::sync::mpsc;
use tracing::{debug, info};

use vibelink_shared::protocol::ServerEvent;
use vibelink_shared::types::SessionId;

use crate::state::{AppState, Profile, SessionHandle};

/// Register (or re-register) a session. Idempotent: a reconnect replaces the
/// connection handle in place and never duplicates a presence entry —
/// availability and room membership survive the blip.
///
/// Returns `false` if the server is full and the session was turned away.
pub async fn register(
    state: &AppState,
    session_id: &SessionId,
    name: &str,
    sender: mpsc::UnboundedSender<ServerEvent>,
) -> bool {
    let mut registry = state.registry.lock().await;

    let known = registry.sessions.contains_key(session_id);
    if !known && state.config.max_sessions > 0 && registry.sessions.len() >= state.config.max_sessions {
        let _ = sender.send(ServerEvent::LimitReached {
            message: "Server is full, try again later".to_string(),
        });
        return false;
    }

    let profile = registry.profiles.get(session_id).cloned().unwrap_or_default();
    let display_name = if profile.name.is_empty() { name.to_string() } else { profile.name };

    match registry.sessions.get_mut(session_id) {
        Some(handle) => {
            debug!(session = %session_id, "re-registration, replacing connection handle");
            handle.sender = sender;
            handle.name = display_name;
        }
        None => {
            info!(session = %session_id, name = %display_name, "session registered");
            registry.sessions.insert(
                session_id.clone(),
                SessionHandle {
                    name: display_name,
                    sender,
                    status: None,
                    gender: profile.gender,
                    is_premium: profile.is_premium,
                    room: None,
                },
            );
        }
    }

    let is_premium = registry
        .sessions
        .get(session_id)
        .map(|h| h.is_premium)
        .unwrap_or(false);
    drop(registry);

    let usage = state.quotas.snapshot(session_id, is_premium).await;

    let registry = state.registry.lock().await;
    registry.send_to(session_id, ServerEvent::Registered { usage });
    registry.broadcast_roster();
    true
}

/// Merge profile facts synced over the REST API. Applied to the live handle
/// too, if the socket is already up.
pub async fn sync_profile(state: &AppState, session_id: &SessionId, profile: Profile) {
    let mut registry = state.registry.lock().await;

    if let Some(handle) = registry.sessions.get_mut(session_id) {
        if !profile.name.is_empty() {
            handle.name = profile.name.clone();
        }
        handle.gender = profile.gender.clone();
        handle.is_premium = profile.is_premium;
    }
    registry.profiles.insert(session_id.clone(), profile);
}

/// Advertise availability. Draws one unit from the daily toggle cap; over
/// the cap, the session gets a `limit-reached` push and stays busy.
pub async fn go_free(state: &AppState, session_id: &SessionId, name: &str, status: &str) {
    let is_premium = {
        let registry = state.registry.lock().await;
        match registry.sessions.get(session_id) {
            Some(handle) => handle.is_premium,
            None => return,
        }
    };

    let allowed = state
        .quotas
        .try_consume(session_id, crate::quota::QuotaKind::Toggle, state.unlimited(is_premium))
        .await;
    let usage = state.quotas.snapshot(session_id, is_premium).await;

    let mut registry = state.registry.lock().await;
    if !allowed {
        registry.send_to(
            session_id,
            ServerEvent::LimitReached {
                message: "Daily visibility limit reached".to_string(),
            },
        );
        registry.send_to(session_id, ServerEvent::UsageUpdate { usage });
        return;
    }

    if let Some(handle) = registry.sessions.get_mut(session_id) {
        if !name.is_empty() {
            handle.name = name.to_string();
        }
        handle.status = Some(status.to_string());
    }
    registry.send_to(session_id, ServerEvent::UsageUpdate { usage });
    registry.broadcast_roster();
}

/// Withdraw from the roster. Always allowed; only going free is capped.
pub async fn go_busy(state: &AppState, session_id: &SessionId) {
    let mut registry = state.registry.lock().await;
    if let Some(handle) = registry.sessions.get_mut(session_id) {
        handle.status = None;
    }
    registry.broadcast_roster();
}

//! Shared server state: the session registry, active rooms and pending
//! handshakes, all behind one async mutex. Event delivery never blocks —
//! each connection drains its own unbounded queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};

use vibelink_shared::protocol::ServerEvent;
use vibelink_shared::types::{ChatRequest, PresenceRecord, RoomId, SessionId};

use crate::config::ServerConfig;
use crate::quota::QuotaLedger;

/// Profile facts synced over the REST API before (or after) the socket
/// registers: display name, optional gender, subscription tier.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: String,
    pub gender: Option<String>,
    pub is_premium: bool,
}

/// One registered session and its outbound event queue.
pub struct SessionHandle {
    pub name: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
    /// `Some(vibe)` while the session is advertising availability.
    pub status: Option<String>,
    pub gender: Option<String>,
    pub is_premium: bool,
    pub room: Option<RoomId>,
}

impl SessionHandle {
    /// Queue an event for this session. A closed queue means the socket is
    /// already gone; the disconnect path cleans the entry up.
    pub fn push(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

/// A chat request waiting for accept/reject, keyed by its receiver. A newer
/// request to the same receiver supersedes the old entry.
pub struct PendingRequest {
    pub request: ChatRequest,
    pub expires_at: Instant,
}

/// Server-side round state of the mini-game. The leader index lives here;
/// clients are only ever told whose turn it is.
pub struct GameState {
    pub round: u32,
    pub leader: usize,
    pub picks: [Option<String>; 2],
}

/// An active two-party room.
pub struct Room {
    pub id: RoomId,
    pub participants: [SessionId; 2],
    pub names: [String; 2],
    /// `Some` while the mini-game overlay is open.
    pub game: Option<GameState>,
    pub draw_open: bool,
}

impl Room {
    pub fn index_of(&self, session: &SessionId) -> Option<usize> {
        self.participants.iter().position(|p| p == session)
    }

    pub fn peer_of(&self, session: &SessionId) -> Option<&SessionId> {
        match self.index_of(session) {
            Some(idx) => Some(&self.participants[1 - idx]),
            None => None,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    pub sessions: HashMap<SessionId, SessionHandle>,
    pub profiles: HashMap<SessionId, Profile>,
    pub rooms: HashMap<RoomId, Room>,
    pub pending: HashMap<SessionId, PendingRequest>,
    pub monthly_matches: u64,
}

impl Registry {
    /// Queue an event for one session, if it is connected.
    pub fn send_to(&self, session: &SessionId, event: ServerEvent) {
        if let Some(handle) = self.sessions.get(session) {
            handle.push(event);
        }
    }

    /// Queue an event for every connected session.
    pub fn broadcast(&self, event: ServerEvent) {
        for handle in self.sessions.values() {
            handle.push(event.clone());
        }
    }

    /// The current roster: every session advertising availability.
    pub fn roster(&self) -> Vec<PresenceRecord> {
        self.sessions
            .iter()
            .filter_map(|(id, handle)| {
                handle.status.as_ref().map(|status| PresenceRecord {
                    id: id.clone(),
                    name: handle.name.clone(),
                    status: status.clone(),
                    gender: handle.gender.clone(),
                    is_premium: handle.is_premium,
                })
            })
            .collect()
    }

    /// Replace every client's roster copy (wholesale, never patched).
    pub fn broadcast_roster(&self) {
        self.broadcast(ServerEvent::UsersUpdate { users: self.roster() });
    }
}

/// The application state handed to every axum handler and socket task.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Mutex<Registry>>,
    pub quotas: QuotaLedger,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let quotas = QuotaLedger::new(config.ping_limit, config.toggle_limit);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            quotas,
            config: Arc::new(config),
        }
    }

    /// Whether this session's caps are waived.
    pub fn unlimited(&self, is_premium: bool) -> bool {
        self.config.premium_unlimited && self.config.elite_enabled && is_premium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_of_resolves_the_other_participant() {
        let room = Room {
            id: RoomId("room-1".into()),
            participants: [SessionId::from("a"), SessionId::from("b")],
            names: ["Ada".into(), "Brin".into()],
            game: None,
            draw_open: false,
        };

        assert_eq!(room.peer_of(&SessionId::from("a")), Some(&SessionId::from("b")));
        assert_eq!(room.peer_of(&SessionId::from("b")), Some(&SessionId::from("a")));
        assert_eq!(room.peer_of(&SessionId::from("c")), None);
    }

    #[test]
    fn roster_only_lists_available_sessions() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::default();
        registry.sessions.insert(
            SessionId::from("a"),
            SessionHandle {
                name: "Ada".into(),
                sender: tx.clone(),
                status: Some("tea".into()),
                gender: None,
                is_premium: false,
                room: None,
            },
        );
        registry.sessions.insert(
            SessionId::from("b"),
            SessionHandle {
                name: "Brin".into(),
                sender: tx,
                status: None,
                gender: None,
                is_premium: false,
                room: None,
            },
        );

        let roster = registry.roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Ada");
    }
}

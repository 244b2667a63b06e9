//! Presence roster and the request→accept/reject/timeout handshake.
//!
//! The roster is replaced wholesale on every broadcast. At most one incoming
//! request is tracked at a time; a newer one supersedes it and restarts the
//! 15-second window. The server is authoritative for expiry: the local
//! countdown is a best-effort mirror, and whichever fires first performs the
//! single cleanup.

use tokio::sync::mpsc;
use tracing::debug;

use vibelink_shared::constants::REQUEST_TIMEOUT_SECS;
use vibelink_shared::protocol::ClientEvent;
use vibelink_shared::types::{ChatRequest, PresenceRecord, RoomId, SessionId, UsageSnapshot};

use crate::error::ClientError;

/// Entitlements passed in at construction (never read from ad hoc config
/// lookups). `elite_enabled` is the remotely-pushed kill switch for the
/// premium tier; `is_premium` is this account's subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct Entitlements {
    pub elite_enabled: bool,
    pub is_premium: bool,
}

impl Entitlements {
    /// Gender filtering and priority requests are elite perks.
    pub fn elite_active(&self) -> bool {
        self.elite_enabled && self.is_premium
    }
}

/// Sender-side request lifecycle: `Idle -> Sent -> back to Idle` on accept,
/// reject, expiry or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingRequest {
    Idle,
    Sent { receiver_id: SessionId },
}

/// The single tracked incoming request and its acceptance window.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub request: ChatRequest,
    pub countdown: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Timeout,
    Rejected,
    /// A daily cap was hit — rendered differently from a plain decline.
    Quota,
}

/// A transient, auto-dismissing notice for the UI. Never blocks interaction.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// A freshly established room, ready to hand to the chat core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomHandle {
    pub room_id: RoomId,
    pub partner_name: String,
}

pub struct PresenceController {
    identity: Option<(SessionId, String)>,
    entitlements: Entitlements,

    roster: Vec<PresenceRecord>,
    is_free: bool,
    status_text: String,

    outgoing: OutgoingRequest,
    incoming: Option<IncomingRequest>,

    usage: UsageSnapshot,
    notices: Vec<Notice>,

    out: mpsc::UnboundedSender<ClientEvent>,
}

impl PresenceController {
    pub fn new(
        identity: Option<(SessionId, String)>,
        entitlements: Entitlements,
        out: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            identity,
            entitlements,
            roster: Vec::new(),
            is_free: false,
            status_text: String::new(),
            outgoing: OutgoingRequest::Idle,
            incoming: None,
            usage: UsageSnapshot::default(),
            notices: Vec::new(),
            out,
        }
    }

    pub fn set_identity(&mut self, session_id: SessionId, name: String) {
        self.identity = Some((session_id, name));
    }

    pub fn is_free(&self) -> bool {
        self.is_free
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn outgoing(&self) -> &OutgoingRequest {
        &self.outgoing
    }

    pub fn incoming(&self) -> Option<&IncomingRequest> {
        self.incoming.as_ref()
    }

    pub fn usage(&self) -> &UsageSnapshot {
        &self.usage
    }

    /// Take the accumulated notices for display.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn emit(&self, event: ClientEvent) {
        if self.out.send(event).is_err() {
            debug!("event channel closed, dropping emit");
        }
    }

    fn identity(&self) -> Result<&(SessionId, String), ClientError> {
        self.identity.as_ref().ok_or(ClientError::NotSignedIn)
    }

    // -----------------------------------------------------------------------
    // Availability
    // -----------------------------------------------------------------------

    /// Advertise or withdraw availability. Stays in effect indefinitely; no
    /// auto-expiry timer. Accepting a chat disables it implicitly.
    pub fn set_availability(&mut self, is_free: bool, status_text: &str) -> Result<(), ClientError> {
        let (session_id, name) = self.identity()?.clone();

        if is_free {
            self.emit(ClientEvent::GoFree {
                id: session_id,
                name,
                status: status_text.to_string(),
            });
            self.is_free = true;
            self.status_text = status_text.to_string();
        } else {
            self.emit(ClientEvent::GoBusy { id: session_id });
            self.is_free = false;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    /// Everyone currently advertising availability except ourselves.
    pub fn roster(&self) -> Vec<&PresenceRecord> {
        let own_id = self.identity.as_ref().map(|(id, _)| id);
        self.roster
            .iter()
            .filter(|record| Some(&record.id) != own_id)
            .collect()
    }

    /// Roster narrowed by gender — an elite perk; without it the filter is
    /// inert and the full roster comes back.
    pub fn roster_filtered(&self, gender: Option<&str>) -> Vec<&PresenceRecord> {
        let filter = if self.entitlements.elite_active() { gender } else { None };
        self.roster()
            .into_iter()
            .filter(|record| match filter {
                Some(wanted) => record.gender.as_deref() == Some(wanted),
                None => true,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Ask a peer for a chat. Rejected locally (no network call) when not
    /// signed in; quota enforcement stays server-side.
    pub fn send_request(&mut self, receiver_id: &SessionId) -> Result<(), ClientError> {
        let (session_id, name) = self.identity()?.clone();

        let receiver_name = self
            .roster
            .iter()
            .find(|record| &record.id == receiver_id)
            .map(|record| record.name.clone())
            .unwrap_or_else(|| "Explorer".to_string());

        let vibe = if self.status_text.is_empty() { "free".to_string() } else { self.status_text.clone() };

        self.emit(ClientEvent::SendChatRequest(ChatRequest {
            sender_id: session_id,
            sender_name: name,
            receiver_id: receiver_id.clone(),
            receiver_name,
            sender_vibe: vibe,
            is_priority: self.entitlements.elite_active(),
        }));
        self.outgoing = OutgoingRequest::Sent { receiver_id: receiver_id.clone() };
        Ok(())
    }

    /// Accept the pending incoming request, if any. The room itself arrives
    /// later on the acceptor's channel.
    pub fn accept_request(&mut self) -> Result<(), ClientError> {
        let (session_id, name) = self.identity()?.clone();
        let Some(pending) = self.incoming.take() else {
            return Ok(());
        };

        self.emit(ClientEvent::AcceptChat {
            sender_id: pending.request.sender_id,
            sender_name: pending.request.sender_name,
            receiver_id: session_id,
            receiver_name: name,
        });
        Ok(())
    }

    /// Decline the pending incoming request, if any.
    pub fn reject_request(&mut self) -> Result<(), ClientError> {
        let (session_id, _) = self.identity()?.clone();
        let Some(pending) = self.incoming.take() else {
            return Ok(());
        };

        self.emit(ClientEvent::RejectChat {
            sender_id: pending.request.sender_id,
            receiver_id: session_id,
        });
        Ok(())
    }

    /// Advance the acceptance window. Hitting zero discards the request
    /// locally; a server `request-expired` that already arrived makes this a
    /// no-op, so cleanup happens exactly once.
    pub fn tick_request(&mut self) {
        let expired = match self.incoming.as_mut() {
            Some(pending) => {
                pending.countdown -= 1;
                pending.countdown == 0
            }
            None => false,
        };
        if expired {
            self.incoming = None;
        }
    }

    // -----------------------------------------------------------------------
    // Server events
    // -----------------------------------------------------------------------

    fn notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notices.push(Notice { kind, message: message.into() });
    }

    pub fn handle_roster(&mut self, users: Vec<PresenceRecord>) {
        self.roster = users;
    }

    pub fn handle_incoming_request(&mut self, request: ChatRequest) {
        // A newer request supersedes the pending one and resets the window.
        self.incoming = Some(IncomingRequest { request, countdown: REQUEST_TIMEOUT_SECS });
    }

    /// Server-pushed expiry of the incoming request (authoritative).
    pub fn handle_request_expired(&mut self) {
        self.incoming = None;
    }

    pub fn handle_request_sent(&mut self) {
        self.notice(NoticeKind::Success, "Vibe check sent!");
    }

    pub fn handle_request_failed(&mut self, message: String, limit_reached: bool) {
        self.outgoing = OutgoingRequest::Idle;
        let kind = if limit_reached { NoticeKind::Quota } else { NoticeKind::Rejected };
        self.notice(kind, message);
    }

    pub fn handle_request_rejected(&mut self, message: String) {
        self.outgoing = OutgoingRequest::Idle;
        self.notice(NoticeKind::Rejected, message);
    }

    pub fn handle_request_ignored(&mut self, message: String) {
        self.outgoing = OutgoingRequest::Idle;
        self.notice(NoticeKind::Timeout, message);
    }

    pub fn handle_limit_reached(&mut self, message: String) {
        self.is_free = false;
        self.notice(NoticeKind::Quota, message);
    }

    pub fn handle_usage(&mut self, usage: UsageSnapshot) {
        self.usage = usage;
    }

    /// A room was established (either channel). Accepting a chat implicitly
    /// ends availability; any pending handshake state is cleared.
    pub fn handle_room_established(&mut self, room_id: RoomId, partner_name: String) -> RoomHandle {
        self.is_free = false;
        self.outgoing = OutgoingRequest::Idle;
        self.incoming = None;
        RoomHandle { room_id, partner_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (PresenceController, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = Some((SessionId::from("sess_me"), "Ada".to_string()));
        (PresenceController::new(identity, Entitlements::default(), tx), rx)
    }

    fn request_from(sender: &str) -> ChatRequest {
        ChatRequest {
            sender_id: SessionId::from(sender),
            sender_name: sender.to_string(),
            receiver_id: SessionId::from("sess_me"),
            receiver_name: "Ada".to_string(),
            sender_vibe: "chill".to_string(),
            is_priority: false,
        }
    }

    #[test]
    fn unauthenticated_request_never_reaches_the_wire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctl = PresenceController::new(None, Entitlements::default(), tx);

        assert_eq!(
            ctl.send_request(&SessionId::from("sess_x")),
            Err(ClientError::NotSignedIn)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn roster_filters_out_own_record() {
        let (mut ctl, _rx) = controller();
        ctl.handle_roster(vec![
            PresenceRecord {
                id: SessionId::from("sess_me"),
                name: "Ada".into(),
                status: "here".into(),
                gender: None,
                is_premium: false,
            },
            PresenceRecord {
                id: SessionId::from("sess_b"),
                name: "Brin".into(),
                status: "coffee".into(),
                gender: None,
                is_premium: false,
            },
        ]);

        let visible = ctl.roster();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Brin");
    }

    #[test]
    fn gender_filter_is_inert_without_elite() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let identity = Some((SessionId::from("sess_me"), "Ada".to_string()));
        let mut ctl = PresenceController::new(
            identity,
            Entitlements { elite_enabled: true, is_premium: false },
            tx,
        );
        ctl.handle_roster(vec![PresenceRecord {
            id: SessionId::from("sess_b"),
            name: "Brin".into(),
            status: "tea".into(),
            gender: Some("female".into()),
            is_premium: false,
        }]);

        // Not premium: the filter must not narrow anything.
        assert_eq!(ctl.roster_filtered(Some("male")).len(), 1);
    }

    #[test]
    fn local_timeout_returns_to_none_exactly_once() {
        let (mut ctl, _rx) = controller();
        ctl.handle_incoming_request(request_from("sess_a"));

        for _ in 0..REQUEST_TIMEOUT_SECS {
            ctl.tick_request();
        }
        assert!(ctl.incoming().is_none());

        // Further ticks (or a late server expiry) are no-ops.
        ctl.tick_request();
        ctl.handle_request_expired();
        assert!(ctl.incoming().is_none());
    }

    #[test]
    fn server_expiry_beats_the_local_timer() {
        let (mut ctl, _rx) = controller();
        ctl.handle_incoming_request(request_from("sess_a"));
        ctl.tick_request();

        ctl.handle_request_expired();
        assert!(ctl.incoming().is_none());

        // The local timer must not double-fire on the now-empty slot.
        ctl.tick_request();
        assert!(ctl.incoming().is_none());
    }

    #[test]
    fn newer_request_supersedes_and_resets_the_window() {
        let (mut ctl, _rx) = controller();
        ctl.handle_incoming_request(request_from("sess_a"));
        for _ in 0..10 {
            ctl.tick_request();
        }

        ctl.handle_incoming_request(request_from("sess_b"));
        let pending = ctl.incoming().unwrap();
        assert_eq!(pending.request.sender_name, "sess_b");
        assert_eq!(pending.countdown, REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn quota_failure_is_distinguished_from_plain_rejection() {
        let (mut ctl, _rx) = controller();
        ctl.send_request(&SessionId::from("sess_b")).unwrap();
        ctl.handle_request_failed("Daily vibe limit reached".into(), true);
        ctl.handle_request_rejected("Partner passed".into());

        let notices = ctl.drain_notices();
        assert_eq!(notices[0].kind, NoticeKind::Quota);
        assert_eq!(notices[1].kind, NoticeKind::Rejected);
        assert_eq!(ctl.outgoing(), &OutgoingRequest::Idle);
        assert!(ctl.drain_notices().is_empty());
    }

    #[test]
    fn accepting_emits_accept_and_room_disables_availability() {
        let (mut ctl, mut rx) = controller();
        ctl.set_availability(true, "tea").unwrap();
        ctl.handle_incoming_request(request_from("sess_a"));

        ctl.accept_request().unwrap();
        assert!(ctl.incoming().is_none());

        let mut saw_accept = false;
        while let Ok(event) = rx.try_recv() {
            if let ClientEvent::AcceptChat { receiver_id, .. } = event {
                assert_eq!(receiver_id, SessionId::from("sess_me"));
                saw_accept = true;
            }
        }
        assert!(saw_accept);

        let handle = ctl.handle_room_established(RoomId("room-1".into()), "sess_a".into());
        assert_eq!(handle.partner_name, "sess_a");
        assert!(!ctl.is_free());
    }
}

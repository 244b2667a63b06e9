//! Wire protocol between client and relay server.
//!
//! Events travel as JSON text frames carrying one internally-tagged enum per
//! direction. The tag (`"type"`) is the event name; payload fields are
//! camelCase. Decoding happens exactly once at the transport boundary; all
//! internal code works on these typed variants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::message::ChatMessage;
use crate::types::{ChatRequest, MessageKind, PresenceRecord, RoomId, RoundResult, SessionId, UsageSnapshot};

/// Events emitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Announce identity. Re-sent on every reconnect; must be idempotent
    /// server-side.
    Register { session_id: SessionId, name: String },

    /// Advertise availability with a freeform vibe string.
    GoFree { id: SessionId, name: String, status: String },

    /// Withdraw from the roster.
    GoBusy { id: SessionId },

    SendChatRequest(ChatRequest),

    AcceptChat {
        sender_id: SessionId,
        sender_name: String,
        receiver_id: SessionId,
        receiver_name: String,
    },

    RejectChat { sender_id: SessionId, receiver_id: SessionId },

    Typing { room_id: RoomId, sender_name: String },

    StopTyping { room_id: RoomId },

    SendMessage {
        room_id: RoomId,
        content: String,
        sender_name: String,
        kind: MessageKind,
        client_id: Uuid,
    },

    EditMessage { room_id: RoomId, message_id: String, new_text: String },

    DeleteMessage { room_id: RoomId, message_id: String },

    EndChat { room_id: RoomId, sender_name: String },

    Reaction { room_id: RoomId, target_id: String, emoji: String },

    GameToggle { room_id: RoomId, open: bool },

    GameSelect { room_id: RoomId, session_id: SessionId, emoji: String },

    /// Stroke start, coordinates normalized to [0,1].
    DrawStart { room_id: RoomId, x: f64, y: f64, color: String },

    DrawMove { room_id: RoomId, x: f64, y: f64 },

    DrawClear { room_id: RoomId },

    DrawToggle { room_id: RoomId, open: bool },
}

/// Events pushed by the relay server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Registration acknowledged, carrying the current usage counters.
    Registered { usage: UsageSnapshot },

    /// Wholesale roster replacement.
    UsersUpdate { users: Vec<PresenceRecord> },

    ReceiveChatRequest(ChatRequest),

    RequestSentSuccess,

    /// Request could not be delivered. `limit_reached` distinguishes a daily
    /// quota rejection from "partner unavailable".
    RequestFailed { message: String, limit_reached: bool },

    RequestRejected { message: String },

    /// The receiver let the request time out (sender-side notice).
    RequestIgnored { message: String },

    /// The pending incoming request expired (receiver-side, authoritative).
    RequestExpired,

    /// A daily activity cap was hit (availability toggles).
    LimitReached { message: String },

    /// Room established, delivered to the original requester.
    ChatStarted { room_id: RoomId, partner_name: String },

    /// Room established, delivered to the party that accepted.
    ChatInitReceiver { room_id: RoomId, partner_name: String },

    NewMessage { room_id: RoomId, message: ChatMessage },

    MessageUpdated { room_id: RoomId, message_id: String, new_text: String },

    MessageDeleted { room_id: RoomId, message_id: String },

    PartnerTyping { room_id: RoomId, sender_name: String },

    PartnerStopTyping { room_id: RoomId },

    PartnerLeft { room_id: RoomId, sender_name: String },

    Reaction { room_id: RoomId, target_id: String, emoji: String },

    GameToggled { room_id: RoomId, open: bool },

    /// A new round: selections reset, `turn_id` holds the leader.
    GameState { room_id: RoomId, round: u32, turn_id: SessionId },

    /// The leader picked; the other party may now respond.
    GamePartnerSelected { room_id: RoomId },

    GameResult { room_id: RoomId, result: RoundResult },

    DrawStarted { room_id: RoomId, x: f64, y: f64, color: String },

    DrawMoved { room_id: RoomId, x: f64, y: f64 },

    DrawCleared { room_id: RoomId },

    DrawToggled { room_id: RoomId, open: bool },

    UsageUpdate { usage: UsageSnapshot },
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Decode)
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Decode)
    }
}

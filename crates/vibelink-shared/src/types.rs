use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Session identity = the opaque token issued by the auth provider for one
// browser session. Never minted locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl RoomId {
    /// Mint a fresh room identifier (server side only).
    pub fn generate() -> Self {
        Self(format!("room-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a message carries: plain text or an ephemeral image (data URI).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

/// One peer currently advertising availability. The roster is replaced
/// wholesale on every broadcast; records are never patched incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub id: SessionId,
    pub name: String,
    /// Freeform "vibe" status text
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

/// The ephemeral handshake object carried by a chat request. Exists only
/// between "request sent" and accept / reject / expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub sender_id: SessionId,
    pub sender_name: String,
    pub receiver_id: SessionId,
    pub receiver_name: String,
    pub sender_vibe: String,
    #[serde(default)]
    pub is_priority: bool,
}

/// Server-pushed daily usage numbers. The client only displays these;
/// authoritative counting lives on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub requests_today: u32,
    pub toggles_today: u32,
    pub ping_limit: u32,
    pub toggle_limit: u32,
    pub is_premium: bool,
}

impl UsageSnapshot {
    pub fn pings_left(&self) -> u32 {
        self.ping_limit.saturating_sub(self.requests_today)
    }

    pub fn toggles_left(&self) -> u32 {
        self.toggle_limit.saturating_sub(self.toggles_today)
    }
}

/// Outcome of a game round, keyed by each party's session id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub selections: HashMap<SessionId, String>,
    pub is_match: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_snapshot_never_underflows() {
        let usage = UsageSnapshot {
            requests_today: 9,
            toggles_today: 1,
            ping_limit: 5,
            toggle_limit: 3,
            is_premium: false,
        };
        assert_eq!(usage.pings_left(), 0);
        assert_eq!(usage.toggles_left(), 2);
    }

    #[test]
    fn presence_record_roundtrip_keeps_camel_case() {
        let record = PresenceRecord {
            id: SessionId::from("sess_1"),
            name: "Ada".into(),
            status: "coffee".into(),
            gender: None,
            is_premium: true,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"isPremium\":true"));
        assert!(!json.contains("gender"));
    }
}

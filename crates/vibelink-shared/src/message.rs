//! The chat message entity.
//!
//! A message is born locally as an *optimistic* entry (no server id yet) and
//! is promoted in place once the server echo arrives. Edits, deletions and
//! snapshot expiry mutate the entry; nothing is ever removed from the list,
//! so insertion order stays display order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DELETED_PLACEHOLDER, EXPIRED_PLACEHOLDER};
use crate::types::MessageKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned id, stable once echoed. `None` while optimistic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Client-generated correlation id, present on everything we sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,

    /// Display name of the sender. Empty for system notices.
    pub sender: String,

    /// Message body; for `kind == Image` this holds a data URI.
    pub text: String,

    pub kind: MessageKind,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub edited: bool,

    #[serde(default)]
    pub deleted: bool,

    /// Snapshot-only: set once the local view timer ran out.
    #[serde(default)]
    pub expired: bool,

    /// Synthetic notice not tied to a sender ("X has left the vibe session").
    #[serde(default)]
    pub system: bool,
}

impl ChatMessage {
    /// A locally-created, not-yet-acknowledged message.
    pub fn outgoing(sender: &str, text: &str, kind: MessageKind, client_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            client_id: Some(client_id),
            sender: sender.to_string(),
            text: text.to_string(),
            kind,
            timestamp: now,
            edited: false,
            deleted: false,
            expired: false,
            system: false,
        }
    }

    /// A synthetic system notice appended by the client itself.
    pub fn system_notice(text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            client_id: None,
            sender: String::new(),
            text: text.to_string(),
            kind: MessageKind::Text,
            timestamp: now,
            edited: false,
            deleted: false,
            expired: false,
            system: true,
        }
    }

    /// An optimistic entry has not been confirmed by the server yet.
    pub fn is_optimistic(&self) -> bool {
        self.id.is_none() && !self.system
    }

    /// Client-formatted display string derived from the timestamp.
    pub fn display_time(&self) -> String {
        self.timestamp.format("%H:%M").to_string()
    }

    /// Soft-delete in place: flag set, text replaced, position preserved.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.text = DELETED_PLACEHOLDER.to_string();
    }

    /// Snapshot expiry in place. Permanent once applied.
    pub fn mark_expired(&mut self) {
        self.expired = true;
        self.text = EXPIRED_PLACEHOLDER.to_string();
    }
}

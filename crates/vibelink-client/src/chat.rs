//! The message channel for one room: optimistic sends reconciled against
//! server echoes, confirmed-only edit/delete, ephemeral snapshot timers,
//! typing debounce and the terminal partner-left state.
//!
//! The message sequence is owned exclusively by [`ChatCore`]. It is an
//! ordered `Vec` plus two hash indexes (server id, client id) so every
//! mutation is O(1); insertion order is display order and nothing is ever
//! removed, only mutated in place.

use std::collections::HashMap;

use base64::Engine;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use vibelink_shared::constants::{MAX_IMAGE_BYTES, MAX_TEXT_LEN, SNAPSHOT_VIEW_SECS, TYPING_IDLE_SECS};
use vibelink_shared::message::ChatMessage;
use vibelink_shared::protocol::ClientEvent;
use vibelink_shared::types::{MessageKind, RoomId};

use crate::error::ClientError;

pub struct ChatCore {
    room_id: RoomId,
    me: String,
    partner_name: String,
    partner_left: bool,
    partner_typing: bool,

    messages: Vec<ChatMessage>,
    by_server_id: HashMap<String, usize>,
    by_client_id: HashMap<Uuid, usize>,

    /// Echoes that beat their own optimistic insert (the send/echo race).
    /// Entries are evicted the moment the insert consumes them, so the table
    /// stays bounded over a long session.
    early_echoes: HashMap<Uuid, ChatMessage>,

    /// Per-snapshot view countdowns, keyed by server message id. One timer
    /// per currently-viewing image, each individually cancelable.
    snapshot_timers: HashMap<String, u32>,

    /// Seconds until the typing indicator clears; `None` = not typing.
    typing_countdown: Option<u32>,

    out: mpsc::UnboundedSender<ClientEvent>,
}

impl ChatCore {
    pub fn new(
        room_id: RoomId,
        me: &str,
        partner_name: &str,
        out: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            room_id,
            me: me.to_string(),
            partner_name: partner_name.to_string(),
            partner_left: false,
            partner_typing: false,
            messages: Vec::new(),
            by_server_id: HashMap::new(),
            by_client_id: HashMap::new(),
            early_echoes: HashMap::new(),
            snapshot_timers: HashMap::new(),
            typing_countdown: None,
            out,
        }
    }

    /// Seed the list from the local cache at mount.
    pub fn restore(&mut self, cached: Vec<ChatMessage>) {
        for message in cached {
            self.push_indexed(message);
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn partner_name(&self) -> &str {
        &self.partner_name
    }

    pub fn partner_left(&self) -> bool {
        self.partner_left
    }

    pub fn partner_typing(&self) -> bool {
        self.partner_typing
    }

    /// Display order is insertion order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    fn emit(&self, event: ClientEvent) {
        if self.out.send(event).is_err() {
            debug!(room = %self.room_id, "event channel closed, dropping emit");
        }
    }

    fn push_indexed(&mut self, message: ChatMessage) {
        let idx = self.messages.len();
        if let Some(id) = &message.id {
            self.by_server_id.insert(id.clone(), idx);
        }
        if let Some(cid) = message.client_id {
            self.by_client_id.insert(cid, idx);
        }
        self.messages.push(message);
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send a text and/or image message.
    ///
    /// Both staged at once become two independent messages, image first, each
    /// with its own client id. The optimistic entry is inserted immediately;
    /// the UI never waits on the network for its own echo.
    pub fn send_message(
        &mut self,
        text: Option<&str>,
        image_data_uri: Option<&str>,
    ) -> Result<Vec<Uuid>, ClientError> {
        if self.partner_left {
            return Err(ClientError::PartnerGone);
        }

        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if text.is_none() && image_data_uri.is_none() {
            return Err(ClientError::EmptyMessage);
        }
        if let Some(t) = text {
            if t.chars().count() > MAX_TEXT_LEN {
                return Err(ClientError::MessageTooLong { len: t.chars().count(), max: MAX_TEXT_LEN });
            }
        }
        if let Some(uri) = image_data_uri {
            validate_image_uri(uri)?;
        }

        let mut client_ids = Vec::new();
        if let Some(uri) = image_data_uri {
            client_ids.push(self.stage_outgoing(uri, MessageKind::Image, Uuid::new_v4()));
        }
        if let Some(t) = text {
            client_ids.push(self.stage_outgoing(t, MessageKind::Text, Uuid::new_v4()));
        }

        // Sending ends the typing burst immediately.
        if self.typing_countdown.take().is_some() {
            self.emit(ClientEvent::StopTyping { room_id: self.room_id.clone() });
        }

        Ok(client_ids)
    }

    /// Emit one message and insert its local entry.
    ///
    /// If the server echo already arrived (stashed by [`Self::handle_new_message`]
    /// step 4), the confirmed version is inserted instead of an optimistic
    /// one — never both.
    fn stage_outgoing(&mut self, content: &str, kind: MessageKind, client_id: Uuid) -> Uuid {
        self.emit(ClientEvent::SendMessage {
            room_id: self.room_id.clone(),
            content: content.to_string(),
            sender_name: self.me.clone(),
            kind,
            client_id,
        });

        let entry = match self.early_echoes.remove(&client_id) {
            Some(confirmed) => confirmed,
            None => ChatMessage::outgoing(&self.me, content, kind, client_id, Utc::now()),
        };
        self.push_indexed(entry);

        client_id
    }

    // -----------------------------------------------------------------------
    // Inbound reconciliation
    // -----------------------------------------------------------------------

    /// Reconcile an inbound message event against the local list.
    ///
    /// The steps run in a fixed priority order; reordering them reintroduces
    /// duplicate-message or lost-message bugs:
    ///
    /// 1. known server id            -> duplicate delivery, drop
    /// 2. client id on a confirmed   -> duplicate delivery, drop
    /// 3. client id on an optimistic -> promote in place (position kept)
    /// 4. own echo with unknown client id -> stash for the pending insert
    /// 5. own message without client id   -> cannot correlate, drop
    /// 6. otherwise                  -> append as the peer's message
    ///
    /// Returns `true` if the rendered list changed.
    pub fn handle_new_message(&mut self, incoming: ChatMessage) -> bool {
        if let Some(id) = &incoming.id {
            if self.by_server_id.contains_key(id) {
                return false;
            }
        }

        if let Some(cid) = incoming.client_id {
            if let Some(&idx) = self.by_client_id.get(&cid) {
                if !self.messages[idx].is_optimistic() {
                    return false;
                }
                // Promote the optimistic entry in place.
                if let Some(id) = &incoming.id {
                    self.by_server_id.insert(id.clone(), idx);
                }
                self.messages[idx] = incoming;
                self.partner_typing = false;
                return true;
            }

            if incoming.sender == self.me {
                // Echo won the race against its own optimistic insert.
                self.early_echoes.insert(cid, incoming);
                return false;
            }
        } else if incoming.sender == self.me {
            // Our own echo with no correlation id; inserting it would
            // duplicate the optimistic entry.
            return false;
        }

        self.push_indexed(incoming);
        self.partner_typing = false;
        true
    }

    // -----------------------------------------------------------------------
    // Edit / delete (confirmed-only, unlike send)
    // -----------------------------------------------------------------------

    /// Request an edit of one of our own messages. Local state is only
    /// mutated when the broadcast comes back.
    pub fn edit_message(&self, message_id: &str, new_text: &str) -> Result<(), ClientError> {
        let new_text = new_text.trim();
        if new_text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let message = self.own_message(message_id)?;
        if message.deleted {
            return Err(ClientError::UnknownMessage);
        }

        self.emit(ClientEvent::EditMessage {
            room_id: self.room_id.clone(),
            message_id: message_id.to_string(),
            new_text: new_text.to_string(),
        });
        Ok(())
    }

    /// Request deletion of one of our own messages.
    pub fn delete_message(&self, message_id: &str) -> Result<(), ClientError> {
        self.own_message(message_id)?;
        self.emit(ClientEvent::DeleteMessage {
            room_id: self.room_id.clone(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    fn own_message(&self, message_id: &str) -> Result<&ChatMessage, ClientError> {
        let idx = *self
            .by_server_id
            .get(message_id)
            .ok_or(ClientError::UnknownMessage)?;
        let message = &self.messages[idx];
        if message.system || message.sender != self.me {
            return Err(ClientError::NotYourMessage);
        }
        Ok(message)
    }

    pub fn apply_edit(&mut self, message_id: &str, new_text: &str) -> bool {
        let Some(&idx) = self.by_server_id.get(message_id) else {
            return false;
        };
        let message = &mut self.messages[idx];
        message.text = new_text.to_string();
        message.edited = true;
        true
    }

    pub fn apply_delete(&mut self, message_id: &str) -> bool {
        let Some(&idx) = self.by_server_id.get(message_id) else {
            return false;
        };
        self.snapshot_timers.remove(message_id);
        self.messages[idx].mark_deleted();
        true
    }

    // -----------------------------------------------------------------------
    // Snapshot lifecycle
    // -----------------------------------------------------------------------

    /// Start the 10-second view window of a snapshot. Idempotent: requesting
    /// a view on an image that is already counting down or already expired is
    /// a no-op. The countdown is local to this viewer; the peer's copy runs
    /// its own clock.
    pub fn view_snapshot(&mut self, message_id: &str) {
        let Some(&idx) = self.by_server_id.get(message_id) else {
            return;
        };
        let message = &self.messages[idx];
        if message.kind != MessageKind::Image || message.expired || message.deleted {
            return;
        }
        self.snapshot_timers
            .entry(message_id.to_string())
            .or_insert(SNAPSHOT_VIEW_SECS);
    }

    /// Advance every running snapshot countdown by one second. Exactly one
    /// expiry mutation happens per image. Returns `true` if any expired.
    pub fn tick_snapshots(&mut self) -> bool {
        let mut expired_ids = Vec::new();
        for (id, remaining) in self.snapshot_timers.iter_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                expired_ids.push(id.clone());
            }
        }

        for id in &expired_ids {
            self.snapshot_timers.remove(id);
            if let Some(&idx) = self.by_server_id.get(id) {
                self.messages[idx].mark_expired();
            }
        }
        !expired_ids.is_empty()
    }

    /// Seconds left on a snapshot's view window, if it is counting.
    pub fn snapshot_remaining(&self, message_id: &str) -> Option<u32> {
        self.snapshot_timers.get(message_id).copied()
    }

    // -----------------------------------------------------------------------
    // Typing indicator
    // -----------------------------------------------------------------------

    /// Called on every local input change. Emits one `typing` per burst and
    /// resets the idle window on each keystroke.
    pub fn input_changed(&mut self) {
        if self.partner_left {
            return;
        }
        if self.typing_countdown.is_none() {
            self.emit(ClientEvent::Typing {
                room_id: self.room_id.clone(),
                sender_name: self.me.clone(),
            });
        }
        self.typing_countdown = Some(TYPING_IDLE_SECS);
    }

    /// Advance the typing idle window; emits `stop-typing` when it runs out.
    pub fn tick_typing(&mut self) {
        if let Some(remaining) = self.typing_countdown.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.typing_countdown = None;
                self.emit(ClientEvent::StopTyping { room_id: self.room_id.clone() });
            }
        }
    }

    pub fn set_partner_typing(&mut self, typing: bool) {
        self.partner_typing = typing;
    }

    // -----------------------------------------------------------------------
    // Room lifecycle
    // -----------------------------------------------------------------------

    /// The peer left (explicit end-chat or permanent disconnect): the room
    /// becomes terminal and read-only, with a synthetic notice appended.
    pub fn handle_partner_left(&mut self, sender_name: &str) -> bool {
        if self.partner_left {
            return false;
        }
        self.partner_left = true;
        self.partner_typing = false;
        self.typing_countdown = None;

        let who = if sender_name.is_empty() { "Your partner" } else { sender_name };
        let notice = ChatMessage::system_notice(
            &format!("{who} has left the vibe session."),
            Utc::now(),
        );
        self.push_indexed(notice);
        true
    }

    /// Explicit close: notify the peer, then drop every per-room countdown
    /// synchronously so nothing fires into a stale room.
    pub fn end_chat(&mut self) {
        self.emit(ClientEvent::EndChat {
            room_id: self.room_id.clone(),
            sender_name: self.me.clone(),
        });
        self.snapshot_timers.clear();
        self.typing_countdown = None;
        self.early_echoes.clear();
    }
}

/// Accept only `data:image/...;base64,` URIs whose decoded payload fits.
fn validate_image_uri(uri: &str) -> Result<(), ClientError> {
    let rest = uri.strip_prefix("data:image/").ok_or(ClientError::InvalidImage)?;
    let (_, payload) = rest.split_once(";base64,").ok_or(ClientError::InvalidImage)?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| ClientError::InvalidImage)?;
    if decoded.len() > MAX_IMAGE_BYTES {
        return Err(ClientError::ImageTooLarge { size: decoded.len(), max: MAX_IMAGE_BYTES });
    }
    Ok(())
}

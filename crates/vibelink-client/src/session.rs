//! The top-level session controller.
//!
//! Owns the presence controller and, while a room is active, the chat core,
//! game, canvas and reaction overlay for that room. Decoded [`ServerEvent`]s
//! are dispatched here exactly once; events scoped to a room that is no
//! longer current are dropped so nothing fires into stale state. The chat
//! message list is mirrored into the local cache after every change and
//! replayed at mount.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use vibelink_shared::message::ChatMessage;
use vibelink_shared::protocol::{ClientEvent, ServerEvent};
use vibelink_shared::types::{RoomId, SessionId};
use vibelink_store::Database;

use crate::canvas::DrawingRelay;
use crate::chat::ChatCore;
use crate::error::ClientError;
use crate::game::GameController;
use crate::matchmaking::{Entitlements, PresenceController, RoomHandle};
use crate::reactions::ReactionOverlay;

/// The authenticated identity this session runs under. Issued externally;
/// never minted or persisted by this core.
#[derive(Debug, Clone)]
pub struct Identity {
    pub session_id: SessionId,
    pub display_name: String,
}

/// Everything multiplexed over one room's channel.
pub struct ActiveRoom {
    pub chat: ChatCore,
    pub game: GameController,
    pub canvas: DrawingRelay,
    pub reactions: ReactionOverlay,
}

pub struct SessionController {
    identity: Option<Identity>,
    presence: PresenceController,
    room: Option<ActiveRoom>,
    store: Option<Database>,
    out: mpsc::UnboundedSender<ClientEvent>,
}

impl SessionController {
    pub fn new(
        identity: Option<Identity>,
        entitlements: Entitlements,
        out: mpsc::UnboundedSender<ClientEvent>,
        store: Option<Database>,
    ) -> Self {
        let presence_identity = identity
            .as_ref()
            .map(|id| (id.session_id.clone(), id.display_name.clone()));

        Self {
            identity,
            presence: PresenceController::new(presence_identity, entitlements, out.clone()),
            room: None,
            store,
            out,
        }
    }

    pub fn presence(&self) -> &PresenceController {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceController {
        &mut self.presence
    }

    pub fn room(&self) -> Option<&ActiveRoom> {
        self.room.as_ref()
    }

    pub fn room_mut(&mut self) -> Option<&mut ActiveRoom> {
        self.room.as_mut()
    }

    /// Rejoin the cached room after a reload: restore the pointer and replay
    /// the mirrored message list.
    pub fn restore(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let pointer = match store.active_room() {
            Ok(pointer) => pointer,
            Err(e) => {
                warn!(error = %e, "failed to read active-room pointer");
                return;
            }
        };
        let Some((room_id, partner_name)) = pointer else {
            return;
        };

        let cached = store.load_history(&room_id).unwrap_or_default();
        self.open_room(RoomHandle { room_id, partner_name });
        if let Some(room) = self.room.as_mut() {
            room.chat.restore(cached);
        }
    }

    fn open_room(&mut self, handle: RoomHandle) {
        let Some(identity) = self.identity.clone() else {
            warn!("room established without an identity, ignoring");
            return;
        };

        debug!(room = %handle.room_id, partner = %handle.partner_name, "opening room");

        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.set_active_room(&handle.room_id, &handle.partner_name) {
                warn!(error = %e, "failed to persist active-room pointer");
            }
        }

        self.room = Some(ActiveRoom {
            chat: ChatCore::new(
                handle.room_id.clone(),
                &identity.display_name,
                &handle.partner_name,
                self.out.clone(),
            ),
            game: GameController::new(
                handle.room_id.clone(),
                identity.session_id.clone(),
                self.out.clone(),
            ),
            canvas: DrawingRelay::new(handle.room_id.clone(), self.out.clone()),
            reactions: ReactionOverlay::new(handle.room_id, self.out.clone()),
        });
    }

    /// Explicitly end the chat: notify the peer, stop every per-room timer
    /// and wipe the room's cache. The peer transitions to "partner left"
    /// rather than silently losing the connection.
    pub fn close_room(&mut self) {
        let Some(mut room) = self.room.take() else {
            return;
        };
        room.chat.end_chat();

        if let Some(store) = self.store.as_ref() {
            let room_id = room.chat.room_id().clone();
            if let Err(e) = store.delete_history(&room_id) {
                warn!(room = %room_id, error = %e, "failed to wipe cached history");
            }
            if let Err(e) = store.clear_active_room() {
                warn!(error = %e, "failed to clear active-room pointer");
            }
        }
    }

    fn persist_history(&mut self) {
        let Some(room) = self.room.as_ref() else {
            return;
        };
        let room_id = room.chat.room_id().clone();
        let messages: Vec<ChatMessage> = room.chat.messages().to_vec();

        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.replace_history(&room_id, &messages) {
                warn!(room = %room_id, error = %e, "failed to mirror history");
            }
        }
    }

    fn room_matches(&self, room_id: &RoomId) -> bool {
        self.room
            .as_ref()
            .is_some_and(|room| room.chat.room_id() == room_id)
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    pub fn set_availability(&mut self, is_free: bool, status_text: &str) -> Result<(), ClientError> {
        self.presence.set_availability(is_free, status_text)?;
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.set_availability(is_free, status_text) {
                warn!(error = %e, "failed to persist availability");
            }
        }
        Ok(())
    }

    pub fn send_message(
        &mut self,
        text: Option<&str>,
        image_data_uri: Option<&str>,
    ) -> Result<(), ClientError> {
        let room = self.room.as_mut().ok_or(ClientError::NoActiveRoom)?;
        room.chat.send_message(text, image_data_uri)?;
        self.persist_history();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    /// Route one decoded server event to its controller. `locate_bubble`
    /// resolves a message id to the bubble's current screen position for the
    /// reaction overlay.
    pub fn dispatch<F>(&mut self, event: ServerEvent, locate_bubble: F)
    where
        F: Fn(&str) -> Option<(f64, f64)>,
    {
        match event {
            // -- Presence / handshake --------------------------------------
            ServerEvent::Registered { usage } | ServerEvent::UsageUpdate { usage } => {
                self.presence.handle_usage(usage);
            }
            ServerEvent::UsersUpdate { users } => self.presence.handle_roster(users),
            ServerEvent::ReceiveChatRequest(request) => {
                self.presence.handle_incoming_request(request);
            }
            ServerEvent::RequestSentSuccess => self.presence.handle_request_sent(),
            ServerEvent::RequestFailed { message, limit_reached } => {
                self.presence.handle_request_failed(message, limit_reached);
            }
            ServerEvent::RequestRejected { message } => {
                self.presence.handle_request_rejected(message);
            }
            ServerEvent::RequestIgnored { message } => {
                self.presence.handle_request_ignored(message);
            }
            ServerEvent::RequestExpired => self.presence.handle_request_expired(),
            ServerEvent::LimitReached { message } => self.presence.handle_limit_reached(message),

            ServerEvent::ChatStarted { room_id, partner_name }
            | ServerEvent::ChatInitReceiver { room_id, partner_name } => {
                let handle = self.presence.handle_room_established(room_id, partner_name);
                self.open_room(handle);
                self.persist_history();
            }

            // -- Chat ------------------------------------------------------
            ServerEvent::NewMessage { room_id, message } => {
                if !self.room_matches(&room_id) {
                    return;
                }
                let changed = self
                    .room
                    .as_mut()
                    .map(|room| room.chat.handle_new_message(message))
                    .unwrap_or(false);
                if changed {
                    self.persist_history();
                }
            }
            ServerEvent::MessageUpdated { room_id, message_id, new_text } => {
                if !self.room_matches(&room_id) {
                    return;
                }
                let changed = self
                    .room
                    .as_mut()
                    .map(|room| room.chat.apply_edit(&message_id, &new_text))
                    .unwrap_or(false);
                if changed {
                    self.persist_history();
                }
            }
            ServerEvent::MessageDeleted { room_id, message_id } => {
                if !self.room_matches(&room_id) {
                    return;
                }
                let changed = self
                    .room
                    .as_mut()
                    .map(|room| room.chat.apply_delete(&message_id))
                    .unwrap_or(false);
                if changed {
                    self.persist_history();
                }
            }
            ServerEvent::PartnerTyping { room_id, .. } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.chat.set_partner_typing(true);
                }
            }
            ServerEvent::PartnerStopTyping { room_id } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.chat.set_partner_typing(false);
                }
            }
            ServerEvent::PartnerLeft { room_id, sender_name } => {
                if !self.room_matches(&room_id) {
                    return;
                }
                let changed = self
                    .room
                    .as_mut()
                    .map(|room| room.chat.handle_partner_left(&sender_name))
                    .unwrap_or(false);
                if changed {
                    self.persist_history();
                }
            }

            // -- Reactions -------------------------------------------------
            ServerEvent::Reaction { room_id, target_id, emoji } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.reactions.handle_reaction(&target_id, &emoji, locate_bubble);
                }
            }

            // -- Game ------------------------------------------------------
            ServerEvent::GameToggled { room_id, open } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.game.handle_toggled(open);
                }
            }
            ServerEvent::GameState { room_id, round, turn_id } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.game.handle_state(round, turn_id);
                }
            }
            ServerEvent::GamePartnerSelected { room_id } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.game.handle_partner_selected();
                }
            }
            ServerEvent::GameResult { room_id, result } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.game.handle_result(result);
                }
            }

            // -- Drawing ---------------------------------------------------
            ServerEvent::DrawStarted { room_id, x, y, color } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.canvas.handle_started(x, y, color);
                }
            }
            ServerEvent::DrawMoved { room_id, x, y } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.canvas.handle_moved(x, y);
                }
            }
            ServerEvent::DrawCleared { room_id } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.canvas.handle_cleared();
                }
            }
            ServerEvent::DrawToggled { room_id, open } => {
                if let Some(room) = self.room.as_mut().filter(|r| *r.chat.room_id() == room_id) {
                    room.canvas.handle_toggled(open);
                }
            }
        }
    }

    /// Advance every running countdown by one second.
    pub fn tick(&mut self) {
        self.presence.tick_request();

        let mut expired = false;
        if let Some(room) = self.room.as_mut() {
            room.chat.tick_typing();
            expired = room.chat.tick_snapshots();
            room.game.tick_result();
            room.reactions.tick();
        }
        if expired {
            self.persist_history();
        }
    }
}

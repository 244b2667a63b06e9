//! The turn-based emoji-match mini-game, layered on the room channel.
//!
//! Toggling is server-confirmed: the client requests it and trusts the
//! broadcast over its own guess (unlike chat send, which is optimistic).
//! `turn_id` is wholly server-assigned; the client never infers the
//! alternation rule for the next round.

use tokio::sync::mpsc;
use tracing::debug;

use vibelink_shared::constants::{CURATED_EMOJIS, FALLBACK_GLYPH, RESULT_BANNER_SECS};
use vibelink_shared::protocol::ClientEvent;
use vibelink_shared::types::{RoomId, RoundResult, SessionId};

use crate::error::ClientError;

/// The resolved round as shown to this client. A match and a miss share this
/// single slot, so the two banners can never be up at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayResult {
    pub mine: String,
    pub theirs: String,
    pub is_match: bool,
}

pub struct GameController {
    room_id: RoomId,
    session_id: SessionId,

    open: bool,
    round: u32,
    turn_id: Option<SessionId>,
    my_selection: Option<String>,
    partner_selected: bool,

    result: Option<DisplayResult>,
    result_countdown: u32,

    out: mpsc::UnboundedSender<ClientEvent>,
}

impl GameController {
    pub fn new(room_id: RoomId, session_id: SessionId, out: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            room_id,
            session_id,
            open: false,
            round: 0,
            turn_id: None,
            my_selection: None,
            partner_selected: false,
            result: None,
            result_countdown: 0,
            out,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn my_turn(&self) -> bool {
        self.turn_id.as_ref() == Some(&self.session_id)
    }

    pub fn my_selection(&self) -> Option<&str> {
        self.my_selection.as_deref()
    }

    pub fn partner_selected(&self) -> bool {
        self.partner_selected
    }

    pub fn result(&self) -> Option<&DisplayResult> {
        self.result.as_ref()
    }

    fn emit(&self, event: ClientEvent) {
        if self.out.send(event).is_err() {
            debug!(room = %self.room_id, "event channel closed, dropping emit");
        }
    }

    /// Ask the server to open or close the game. No local state changes here;
    /// the broadcast decides.
    pub fn request_toggle(&self, open: bool) {
        self.emit(ClientEvent::GameToggle { room_id: self.room_id.clone(), open });
    }

    /// Pick an emoji for this round. Before the leader has picked, only the
    /// turn-holder may select; once the leader picked, the other party may
    /// respond. One pick per party per round.
    pub fn select(&mut self, emoji: &str) -> Result<(), ClientError> {
        if !self.open {
            return Err(ClientError::GameClosed);
        }
        if !CURATED_EMOJIS.contains(&emoji) {
            return Err(ClientError::UnknownEmoji);
        }
        if self.my_selection.is_some() {
            return Err(ClientError::AlreadySelected);
        }
        if !self.my_turn() && !self.partner_selected {
            return Err(ClientError::NotYourTurn);
        }

        self.my_selection = Some(emoji.to_string());
        self.emit(ClientEvent::GameSelect {
            room_id: self.room_id.clone(),
            session_id: self.session_id.clone(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Server events
    // -----------------------------------------------------------------------

    pub fn handle_toggled(&mut self, open: bool) {
        if open {
            self.open = true;
        } else {
            // Closing resets everything to closed defaults.
            *self = Self::new(self.room_id.clone(), self.session_id.clone(), self.out.clone());
        }
    }

    /// A new round: selections reset, any lingering result banner cleared.
    pub fn handle_state(&mut self, round: u32, turn_id: SessionId) {
        self.round = round;
        self.turn_id = Some(turn_id);
        self.my_selection = None;
        self.partner_selected = false;
        self.result = None;
        self.result_countdown = 0;
    }

    pub fn handle_partner_selected(&mut self) {
        self.partner_selected = true;
    }

    /// Resolve the round. Selections are keyed by session id; a missing
    /// entry falls back to a placeholder glyph rather than crashing.
    pub fn handle_result(&mut self, result: RoundResult) {
        let mine = result
            .selections
            .get(&self.session_id)
            .cloned()
            .unwrap_or_else(|| FALLBACK_GLYPH.to_string());
        let theirs = result
            .selections
            .iter()
            .find(|(id, _)| **id != self.session_id)
            .map(|(_, emoji)| emoji.clone())
            .unwrap_or_else(|| FALLBACK_GLYPH.to_string());

        self.result = Some(DisplayResult { mine, theirs, is_match: result.is_match });
        self.result_countdown = RESULT_BANNER_SECS;
    }

    /// Advance the result banner's self-dismiss countdown.
    pub fn tick_result(&mut self) {
        if self.result_countdown > 0 {
            self.result_countdown -= 1;
            if self.result_countdown == 0 {
                self.result = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn game() -> (GameController, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            GameController::new(RoomId("room-1".into()), SessionId::from("sess_me"), tx),
            rx,
        )
    }

    fn open_round(ctl: &mut GameController, leader: &str) {
        ctl.handle_toggled(true);
        ctl.handle_state(1, SessionId::from(leader));
    }

    #[test]
    fn toggle_is_not_optimistic() {
        let (ctl, mut rx) = game();
        ctl.request_toggle(true);
        assert!(!ctl.is_open());
        assert!(matches!(rx.try_recv(), Ok(ClientEvent::GameToggle { open: true, .. })));
    }

    #[test]
    fn non_leader_cannot_pick_until_leader_did() {
        let (mut ctl, _rx) = game();
        open_round(&mut ctl, "sess_partner");

        assert_eq!(ctl.select("🔥"), Err(ClientError::NotYourTurn));
        assert!(ctl.my_selection().is_none());

        ctl.handle_partner_selected();
        ctl.select("🔥").unwrap();
        assert_eq!(ctl.my_selection(), Some("🔥"));

        // One pick per round.
        assert_eq!(ctl.select("✨"), Err(ClientError::AlreadySelected));
    }

    #[test]
    fn leader_picks_freely_and_only_once() {
        let (mut ctl, mut rx) = game();
        open_round(&mut ctl, "sess_me");

        ctl.select("🌈").unwrap();
        assert_eq!(ctl.select("🌈"), Err(ClientError::AlreadySelected));

        let picks = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, ClientEvent::GameSelect { .. }))
            .count();
        assert_eq!(picks, 1);
    }

    #[test]
    fn selecting_while_closed_is_rejected() {
        let (mut ctl, _rx) = game();
        assert_eq!(ctl.select("🔥"), Err(ClientError::GameClosed));
    }

    #[test]
    fn off_palette_emoji_is_rejected() {
        let (mut ctl, _rx) = game();
        open_round(&mut ctl, "sess_me");
        assert_eq!(ctl.select("💀"), Err(ClientError::UnknownEmoji));
    }

    #[test]
    fn result_tolerates_missing_selection_entries() {
        let (mut ctl, _rx) = game();
        open_round(&mut ctl, "sess_me");

        let mut selections = HashMap::new();
        selections.insert(SessionId::from("sess_partner"), "🔥".to_string());
        ctl.handle_result(RoundResult { selections, is_match: false });

        let shown = ctl.result().unwrap();
        assert_eq!(shown.mine, FALLBACK_GLYPH);
        assert_eq!(shown.theirs, "🔥");
    }

    #[test]
    fn result_banner_self_dismisses_after_three_ticks() {
        let (mut ctl, _rx) = game();
        open_round(&mut ctl, "sess_me");

        let mut selections = HashMap::new();
        selections.insert(SessionId::from("sess_me"), "🔥".to_string());
        selections.insert(SessionId::from("sess_partner"), "🔥".to_string());
        ctl.handle_result(RoundResult { selections, is_match: true });
        assert!(ctl.result().unwrap().is_match);

        for _ in 0..RESULT_BANNER_SECS {
            ctl.tick_result();
        }
        assert!(ctl.result().is_none());
    }

    #[test]
    fn next_round_clears_selections_and_result() {
        let (mut ctl, _rx) = game();
        open_round(&mut ctl, "sess_me");
        ctl.select("🔥").unwrap();

        let mut selections = HashMap::new();
        selections.insert(SessionId::from("sess_me"), "🔥".to_string());
        ctl.handle_result(RoundResult { selections, is_match: false });

        ctl.handle_state(2, SessionId::from("sess_partner"));
        assert_eq!(ctl.round(), 2);
        assert!(!ctl.my_turn());
        assert!(ctl.my_selection().is_none());
        assert!(!ctl.partner_selected());
        assert!(ctl.result().is_none());
    }

    #[test]
    fn closing_resets_to_defaults() {
        let (mut ctl, _rx) = game();
        open_round(&mut ctl, "sess_me");
        ctl.select("🔥").unwrap();

        ctl.handle_toggled(false);
        assert!(!ctl.is_open());
        assert_eq!(ctl.round(), 0);
        assert!(ctl.my_selection().is_none());
    }
}

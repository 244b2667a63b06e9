//! Fire-and-forget reaction particles anchored to message bubbles.
//!
//! On receipt (including our own echo) the target bubble's current screen
//! position is resolved through a caller-supplied lookup; if the bubble is
//! not rendered the reaction is silently dropped. Particles live four
//! seconds and nothing else is retained.

use tokio::sync::mpsc;
use tracing::debug;

use vibelink_shared::constants::REACTION_LIFETIME_SECS;
use vibelink_shared::protocol::ClientEvent;
use vibelink_shared::types::RoomId;

/// A short-lived animated particle at a screen position.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub emoji: String,
    pub x: f64,
    pub y: f64,
    pub ttl: u32,
}

pub struct ReactionOverlay {
    room_id: RoomId,
    particles: Vec<Particle>,
    out: mpsc::UnboundedSender<ClientEvent>,
}

impl ReactionOverlay {
    pub fn new(room_id: RoomId, out: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { room_id, particles: Vec::new(), out }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// React to a message bubble by its client-or-server id.
    pub fn send(&self, target_id: &str, emoji: &str) {
        let event = ClientEvent::Reaction {
            room_id: self.room_id.clone(),
            target_id: target_id.to_string(),
            emoji: emoji.to_string(),
        };
        if self.out.send(event).is_err() {
            debug!(room = %self.room_id, "event channel closed, dropping reaction");
        }
    }

    /// Spawn a particle at the target bubble, if it is currently on screen.
    pub fn handle_reaction<F>(&mut self, target_id: &str, emoji: &str, locate: F)
    where
        F: Fn(&str) -> Option<(f64, f64)>,
    {
        let Some((x, y)) = locate(target_id) else {
            // Scrolled out or not yet loaded: drop silently.
            return;
        };
        self.particles.push(Particle {
            emoji: emoji.to_string(),
            x,
            y,
            ttl: REACTION_LIFETIME_SECS,
        });
    }

    /// Age particles by one second and discard the spent ones.
    pub fn tick(&mut self) {
        for particle in &mut self.particles {
            particle.ttl -= 1;
        }
        self.particles.retain(|particle| particle.ttl > 0);
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }
}

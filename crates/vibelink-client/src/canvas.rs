//! Shared drawing canvas: low-latency stroke relay, resolution-independent.
//!
//! Points are normalized to [0,1] fractions of the local canvas before
//! transmission; the receiver projects them onto its *own* dimensions, so
//! differently sized screens stay proportional. The canvas is a write-only
//! relay: no undo, no persistence, a reload loses everything.

use tokio::sync::mpsc;
use tracing::debug;

use vibelink_shared::protocol::ClientEvent;
use vibelink_shared::types::RoomId;

use crate::error::ClientError;

/// One polyline in normalized coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub color: String,
    pub points: Vec<(f64, f64)>,
}

pub struct DrawingRelay {
    room_id: RoomId,
    open: bool,
    strokes: Vec<Stroke>,
    /// Whether the local pointer is mid-stroke (between start and release).
    drawing: bool,
    out: mpsc::UnboundedSender<ClientEvent>,
}

impl DrawingRelay {
    pub fn new(room_id: RoomId, out: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            room_id,
            open: false,
            strokes: Vec::new(),
            drawing: false,
            out,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    fn emit(&self, event: ClientEvent) {
        if self.out.send(event).is_err() {
            debug!(room = %self.room_id, "event channel closed, dropping emit");
        }
    }

    /// Ask the server to open or close the canvas; the broadcast is what
    /// flips local state (same pattern as the game toggle).
    pub fn request_toggle(&self, open: bool) {
        self.emit(ClientEvent::DrawToggle { room_id: self.room_id.clone(), open });
    }

    /// Begin a stroke at a pixel position on a `width`×`height` canvas.
    pub fn begin_stroke(
        &mut self,
        x_px: f64,
        y_px: f64,
        width: f64,
        height: f64,
        color: &str,
    ) -> Result<(), ClientError> {
        if !self.open {
            return Err(ClientError::CanvasClosed);
        }
        let (x, y) = normalize(x_px, y_px, width, height);

        self.strokes.push(Stroke { color: color.to_string(), points: vec![(x, y)] });
        self.drawing = true;
        self.emit(ClientEvent::DrawStart {
            room_id: self.room_id.clone(),
            x,
            y,
            color: color.to_string(),
        });
        Ok(())
    }

    /// Continue the current stroke. A move without a preceding start is
    /// dropped (pointer entered the canvas mid-gesture).
    pub fn extend_stroke(&mut self, x_px: f64, y_px: f64, width: f64, height: f64) {
        if !self.drawing {
            return;
        }
        let (x, y) = normalize(x_px, y_px, width, height);
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.points.push((x, y));
        }
        self.emit(ClientEvent::DrawMove { room_id: self.room_id.clone(), x, y });
    }

    /// Pointer released; the next start opens a fresh path.
    pub fn finish_stroke(&mut self) {
        self.drawing = false;
    }

    /// Wipe the bitmap locally and on the peer's side.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.drawing = false;
        self.emit(ClientEvent::DrawClear { room_id: self.room_id.clone() });
    }

    /// Project every stroke onto a canvas of the given pixel dimensions.
    pub fn project(&self, width: f64, height: f64) -> Vec<(String, Vec<(f64, f64)>)> {
        self.strokes
            .iter()
            .map(|stroke| {
                let points = stroke
                    .points
                    .iter()
                    .map(|(x, y)| (x * width, y * height))
                    .collect();
                (stroke.color.clone(), points)
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Server events
    // -----------------------------------------------------------------------

    pub fn handle_started(&mut self, x: f64, y: f64, color: String) {
        self.strokes.push(Stroke { color, points: vec![(x, y)] });
    }

    pub fn handle_moved(&mut self, x: f64, y: f64) {
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.points.push((x, y));
        }
    }

    pub fn handle_cleared(&mut self) {
        self.strokes.clear();
    }

    pub fn handle_toggled(&mut self, open: bool) {
        self.open = open;
    }
}

fn normalize(x_px: f64, y_px: f64, width: f64, height: f64) -> (f64, f64) {
    let x = if width > 0.0 { (x_px / width).clamp(0.0, 1.0) } else { 0.0 };
    let y = if height > 0.0 { (y_px / height).clamp(0.0, 1.0) } else { 0.0 };
    (x, y)
}

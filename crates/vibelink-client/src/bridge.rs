//! Glue between the connection task (vibelink-net) and the session
//! controller: forwards controller emissions to the socket, feeds decoded
//! inbound events back into [`SessionController::dispatch`], and drives the
//! one-second tick every countdown runs on.
//!
//! [`SessionController::dispatch`]: crate::session::SessionController::dispatch

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use vibelink_net::{NetCommand, NetNotification};
use vibelink_shared::protocol::ClientEvent;

use crate::session::SessionController;

/// Pump the session until either channel closes.
///
/// `outbound` is the receiving half of the channel the controllers emit
/// into; `locate_bubble` resolves a message id to its on-screen position
/// for the reaction overlay.
pub async fn run<F>(
    mut session: SessionController,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    cmd_tx: mpsc::Sender<NetCommand>,
    mut notifications: mpsc::Receiver<NetNotification>,
    locate_bubble: F,
) where
    F: Fn(&str) -> Option<(f64, f64)>,
{
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            event = outbound.recv() => match event {
                Some(event) => {
                    if cmd_tx.send(NetCommand::Send(event)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            notification = notifications.recv() => match notification {
                Some(NetNotification::Event(event)) => session.dispatch(event, &locate_bubble),
                Some(NetNotification::Connected) => {
                    // Identity was re-announced by the connection task; if we
                    // were advertising availability before the blip, put us
                    // back on the roster.
                    if session.presence().is_free() {
                        let status = session.presence().status_text().to_string();
                        if let Err(e) = session.set_availability(true, &status) {
                            debug!(error = %e, "could not re-advertise availability");
                        }
                    }
                }
                Some(NetNotification::Disconnected) => {
                    debug!("connection dropped, waiting for reconnect");
                }
                None => break,
            },
            _ = ticker.tick() => session.tick(),
        }
    }
}

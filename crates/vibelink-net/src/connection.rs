//! WebSocket connection task with tokio mpsc command/notification pattern.
//!
//! The connection loop runs in a dedicated tokio task. External code talks to
//! it through typed command and notification channels, keeping the transport
//! fully asynchronous and decoupled from the session state machines.
//!
//! The contract of the manager is small: exactly one logical connection per
//! session, connect on first demand rather than at startup, and re-announce
//! identity with a `register` event on *every* successful (re)connection.
//! The server tolerates repeated registration of the same identity, so a
//! network blip never duplicates a presence entry.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use vibelink_shared::protocol::{ClientEvent, ServerEvent};
use vibelink_shared::types::SessionId;

/// Commands sent *into* the connection task.
#[derive(Debug)]
pub enum NetCommand {
    /// Emit an event to the relay server.
    Send(ClientEvent),
    /// Close the socket and end the task.
    Shutdown,
}

/// Notifications sent *from* the connection task to the application.
#[derive(Debug, Clone)]
pub enum NetNotification {
    /// The socket is up and identity has been re-announced.
    Connected,
    /// The socket dropped; a reconnect attempt follows.
    Disconnected,
    /// A decoded inbound event.
    Event(ServerEvent),
}

/// Configuration for spawning a connection.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// WebSocket URL of the relay server, e.g. `ws://localhost:5001/ws`.
    pub url: String,
    /// Base delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl NetConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Spawn the connection loop in a background tokio task.
///
/// The first connect attempt happens inside the task, so spawning is cheap
/// and pages that never need the socket never open one.
///
/// Returns `(command_tx, notification_rx)`. Dropping the command sender shuts
/// the task down; the notification channel closing is the teardown signal for
/// listeners, so a remount starts from a clean slate with no stale handlers.
pub fn spawn_connection(
    config: NetConfig,
    session_id: SessionId,
    display_name: String,
) -> (mpsc::Sender<NetCommand>, mpsc::Receiver<NetNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<NetCommand>(64);
    let (notify_tx, notify_rx) = mpsc::channel::<NetNotification>(256);

    tokio::spawn(run_connection(config, session_id, display_name, cmd_rx, notify_tx));

    (cmd_tx, notify_rx)
}

async fn run_connection(
    config: NetConfig,
    session_id: SessionId,
    display_name: String,
    mut cmd_rx: mpsc::Receiver<NetCommand>,
    notify_tx: mpsc::Sender<NetNotification>,
) {
    loop {
        let (ws, _) = match connect_async(config.url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(url = %config.url, error = %e, "connect failed, retrying");
                if wait_or_shutdown(&config, &mut cmd_rx).await {
                    return;
                }
                continue;
            }
        };

        info!(url = %config.url, session = %session_id, "connected to relay");
        let (mut sink, mut stream) = ws.split();

        // Identity first, before anything else goes over the wire.
        let register = ClientEvent::Register {
            session_id: session_id.clone(),
            name: display_name.clone(),
        };
        if let Err(e) = send_event(&mut sink, &register).await {
            warn!(error = %e, "registration failed, reconnecting");
            continue;
        }

        if notify_tx.send(NetNotification::Connected).await.is_err() {
            return;
        }

        // Pump commands out and frames in until either side drops.
        let mut shutdown = false;
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(NetCommand::Send(event)) => {
                        if let Err(e) = send_event(&mut sink, &event).await {
                            warn!(error = %e, "send failed, reconnecting");
                            break;
                        }
                    }
                    Some(NetCommand::Shutdown) | None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        shutdown = true;
                        break;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(raw))) => match ServerEvent::from_json(&raw) {
                        Ok(event) => {
                            if notify_tx.send(NetNotification::Event(event)).await.is_err() {
                                return;
                            }
                        }
                        // Unknown frames are dropped, never fatal.
                        Err(e) => debug!(error = %e, "ignoring undecodable frame"),
                    },
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "socket error, reconnecting");
                        break;
                    }
                },
            }
        }

        if notify_tx.send(NetNotification::Disconnected).await.is_err() {
            return;
        }
        if shutdown {
            info!(session = %session_id, "connection shut down");
            return;
        }
        if wait_or_shutdown(&config, &mut cmd_rx).await {
            return;
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<(), String>
where
    S: SinkExt<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = event.to_json().map_err(|e| e.to_string())?;
    sink.send(WsMessage::Text(json)).await.map_err(|e| e.to_string())
}

/// Sleep out the reconnect delay (with jitter so a fleet of clients does not
/// reconnect in lockstep). Returns `true` if a shutdown arrived meanwhile.
async fn wait_or_shutdown(config: &NetConfig, cmd_rx: &mut mpsc::Receiver<NetCommand>) -> bool {
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
    let delay = config.reconnect_delay + jitter;

    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        cmd = cmd_rx.recv() => !matches!(cmd, Some(NetCommand::Send(_))),
    }
}

//! Client-side connection manager: one persistent WebSocket per session,
//! lazily connected, with automatic reconnect and idempotent re-registration.

pub mod connection;

pub use connection::{spawn_connection, NetCommand, NetConfig, NetNotification};

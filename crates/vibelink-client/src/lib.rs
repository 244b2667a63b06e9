//! # vibelink-client
//!
//! The real-time session controller: the client-side state machines that
//! interpret relay events. Everything here is synchronous and single-owner;
//! the controllers are driven by decoded [`ServerEvent`]s, user actions, and
//! a one-second tick, and push their outbound [`ClientEvent`]s into an
//! injected channel sender. The [`SessionController`] wires the pieces to the
//! connection task (vibelink-net) and the local cache (vibelink-store).
//!
//! [`ServerEvent`]: vibelink_shared::ServerEvent
//! [`ClientEvent`]: vibelink_shared::ClientEvent
//! [`SessionController`]: crate::session::SessionController

pub mod bridge;
pub mod canvas;
pub mod chat;
pub mod game;
pub mod matchmaking;
pub mod reactions;
pub mod session;

mod error;

pub use error::ClientError;
pub use session::SessionController;

//! # vibelink-shared
//!
//! Types shared between the Vibelink client and relay server: the wire
//! protocol (typed event enums, JSON-framed), the chat message entity, the
//! presence / matchmaking records, and the timing constants that govern the
//! session state machines.

pub mod constants;
pub mod message;
pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use message::ChatMessage;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::{ChatRequest, MessageKind, PresenceRecord, RoomId, RoundResult, SessionId, UsageSnapshot};

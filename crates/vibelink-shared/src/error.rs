use thiserror::Error;

/// Errors produced while framing or parsing protocol events.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

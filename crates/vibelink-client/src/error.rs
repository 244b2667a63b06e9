use thiserror::Error;

/// Validation and lifecycle failures raised at the point of a user action.
///
/// None of these reach a global error boundary; they are surfaced where the
/// action happened and never travel over the wire.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClientError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message too long: {len} chars (max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("Image too large: {size} bytes (max {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Not a valid image data URI")]
    InvalidImage,

    #[error("Partner has left the session")]
    PartnerGone,

    #[error("Message was not sent by you")]
    NotYourMessage,

    #[error("No message with that id")]
    UnknownMessage,

    #[error("No active room")]
    NoActiveRoom,

    #[error("Game is closed")]
    GameClosed,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Emoji is not in the palette")]
    UnknownEmoji,

    #[error("Already picked this round")]
    AlreadySelected,

    #[error("Canvas is closed")]
    CanvasClosed,
}

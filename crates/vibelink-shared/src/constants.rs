/// Protocol version negotiated during registration
pub const PROTOCOL_VERSION: &str = "/vibelink/1.0.0";

/// Application name
pub const APP_NAME: &str = "Vibelink";

/// Seconds a chat request stays pending before it expires
pub const REQUEST_TIMEOUT_SECS: u32 = 15;

/// Seconds of keyboard inactivity before the typing indicator clears
pub const TYPING_IDLE_SECS: u32 = 2;

/// Seconds a snapshot (ephemeral image) stays viewable once opened
pub const SNAPSHOT_VIEW_SECS: u32 = 10;

/// Seconds a reaction particle stays on screen
pub const REACTION_LIFETIME_SECS: u32 = 4;

/// Seconds the match / miss result banner stays up before self-dismissing
pub const RESULT_BANNER_SECS: u32 = 3;

/// Maximum text message length in characters
pub const MAX_TEXT_LEN: usize = 2_000;

/// Maximum decoded image payload size in bytes (512 KiB)
pub const MAX_IMAGE_BYTES: usize = 512 * 1024;

/// Default daily chat-request allowance for free accounts
pub const DEFAULT_PING_LIMIT: u32 = 5;

/// Default daily availability-toggle allowance for free accounts
pub const DEFAULT_TOGGLE_LIMIT: u32 = 3;

/// Default WebSocket port of the relay server
pub const DEFAULT_HTTP_PORT: u16 = 5001;

/// Display text substituted for a deleted message
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Display text substituted for an expired snapshot
pub const EXPIRED_PLACEHOLDER: &str = "Snapshot Expired";

/// Glyph shown when a game result omits a party's selection
pub const FALLBACK_GLYPH: &str = "❔";

/// The curated palette the mini-game draws from
pub const CURATED_EMOJIS: [&str; 14] = [
    "❤️", "✨", "😂", "😍", "🔥", "🙌", "🥂", "🌟", "🌸", "🦋", "🍭", "🧸", "🦄", "🌈",
];

/// Version marker for the local history cache; bump to invalidate stale caches
pub const CACHE_SCHEMA_VERSION: u32 = 1;

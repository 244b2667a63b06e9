//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `cache_meta` (string key/value entries) and
//! `room_history` (the mirrored message list, one JSON row per message).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Key/value entries: schema-version marker, active-room pointer,
-- availability flag/text, theme preference.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cache_meta (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Mirrored chat history. Insertion order = display order, so the
-- position column is authoritative, not the timestamp.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS room_history (
    room_id  TEXT NOT NULL,
    position INTEGER NOT NULL,             -- 0-based index in the display list
    json     TEXT NOT NULL,                -- serialized ChatMessage

    PRIMARY KEY (room_id, position)
);

CREATE INDEX IF NOT EXISTS idx_room_history_room ON room_history(room_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

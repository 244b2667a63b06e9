//! String key/value entries in `cache_meta`: the schema-version marker, the
//! active-room pointer, the availability flag/text and the theme preference.

use rusqlite::{params, OptionalExtension};

use vibelink_shared::constants::CACHE_SCHEMA_VERSION;
use vibelink_shared::types::RoomId;

use crate::database::Database;
use crate::error::Result;

const KEY_SCHEMA_VERSION: &str = "schema_version";
const KEY_ACTIVE_ROOM: &str = "active_room";
const KEY_ACTIVE_PARTNER: &str = "active_partner";
const KEY_AVAILABLE: &str = "available";
const KEY_AVAILABLE_TEXT: &str = "available_text";
const KEY_THEME: &str = "theme";

impl Database {
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO cache_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_meta(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM cache_meta WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Validate the stored cache version against [`CACHE_SCHEMA_VERSION`].
    ///
    /// A mismatch wipes all cached history and rewrites the marker; it must
    /// never crash and never leave stale rows to be misread by newer code.
    pub fn ensure_cache_version(&self) -> Result<()> {
        let stored: Option<u32> = self
            .get_meta(KEY_SCHEMA_VERSION)?
            .and_then(|v| v.parse().ok());

        match stored {
            Some(version) if version == CACHE_SCHEMA_VERSION => {}
            Some(version) => {
                tracing::warn!(
                    stored = version,
                    expected = CACHE_SCHEMA_VERSION,
                    "cache schema mismatch, wiping history"
                );
                self.wipe_all_history()?;
                self.set_meta(KEY_SCHEMA_VERSION, &CACHE_SCHEMA_VERSION.to_string())?;
            }
            None => {
                self.set_meta(KEY_SCHEMA_VERSION, &CACHE_SCHEMA_VERSION.to_string())?;
            }
        }
        Ok(())
    }

    /// The room (and partner) a reload should rejoin, if any.
    pub fn active_room(&self) -> Result<Option<(RoomId, String)>> {
        let Some(room_id) = self.get_meta(KEY_ACTIVE_ROOM)? else {
            return Ok(None);
        };
        let partner = self.get_meta(KEY_ACTIVE_PARTNER)?.unwrap_or_default();
        Ok(Some((RoomId(room_id), partner)))
    }

    pub fn set_active_room(&self, room_id: &RoomId, partner_name: &str) -> Result<()> {
        self.set_meta(KEY_ACTIVE_ROOM, room_id.as_str())?;
        self.set_meta(KEY_ACTIVE_PARTNER, partner_name)
    }

    pub fn clear_active_room(&self) -> Result<()> {
        self.delete_meta(KEY_ACTIVE_ROOM)?;
        self.delete_meta(KEY_ACTIVE_PARTNER)?;
        Ok(())
    }

    pub fn availability(&self) -> Result<(bool, String)> {
        let is_free = matches!(self.get_meta(KEY_AVAILABLE)?.as_deref(), Some("1"));
        let text = self.get_meta(KEY_AVAILABLE_TEXT)?.unwrap_or_default();
        Ok((is_free, text))
    }

    pub fn set_availability(&self, is_free: bool, text: &str) -> Result<()> {
        self.set_meta(KEY_AVAILABLE, if is_free { "1" } else { "0" })?;
        self.set_meta(KEY_AVAILABLE_TEXT, text)
    }

    pub fn theme(&self) -> Result<Option<String>> {
        self.get_meta(KEY_THEME)
    }

    pub fn set_theme(&self, theme: &str) -> Result<()> {
        self.set_meta(KEY_THEME, theme)
    }
}

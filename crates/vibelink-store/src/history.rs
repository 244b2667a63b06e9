//! Mirrored chat history, keyed by room.
//!
//! The client rewrites a room's rows on every message-list change; reads
//! happen once at mount. All writes stay on the single UI-facing thread, so
//! no locking beyond SQLite's own is needed.

use rusqlite::params;

use vibelink_shared::message::ChatMessage;
use vibelink_shared::types::RoomId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Replace the cached history of a room with the given list, atomically.
    pub fn replace_history(&mut self, room_id: &RoomId, messages: &[ChatMessage]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "DELETE FROM room_history WHERE room_id = ?1",
            params![room_id.as_str()],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO room_history (room_id, position, json) VALUES (?1, ?2, ?3)",
            )?;
            for (position, message) in messages.iter().enumerate() {
                let json = serde_json::to_string(message)?;
                stmt.execute(params![room_id.as_str(), position as i64, json])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Load a room's cached history in display order.
    ///
    /// Rows that fail to deserialize are skipped with a warning rather than
    /// poisoning the whole replay.
    pub fn load_history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT json FROM room_history WHERE room_id = ?1 ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![room_id.as_str()], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let json = row?;
            match serde_json::from_str::<ChatMessage>(&json) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(room = %room_id, error = %e, "skipping corrupt history row");
                }
            }
        }
        Ok(messages)
    }

    /// Drop a room's cached history (explicit close).
    pub fn delete_history(&self, room_id: &RoomId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM room_history WHERE room_id = ?1",
            params![room_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Drop every room's cached history (schema-version mismatch).
    pub fn wipe_all_history(&self) -> Result<()> {
        self.conn().execute("DELETE FROM room_history", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use vibelink_shared::types::MessageKind;

    use super::*;

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn sample(text: &str) -> ChatMessage {
        ChatMessage::outgoing("Ada", text, MessageKind::Text, Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn history_survives_rewrite_in_order() {
        let (_dir, mut db) = open_temp();
        let room = RoomId("room-1".into());

        db.replace_history(&room, &[sample("one"), sample("two")]).unwrap();
        db.replace_history(&room, &[sample("one"), sample("two"), sample("three")])
            .unwrap();

        let loaded = db.load_history(&room).unwrap();
        let texts: Vec<&str> = loaded.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn delete_history_only_touches_one_room() {
        let (_dir, mut db) = open_temp();
        let room_a = RoomId("room-a".into());
        let room_b = RoomId("room-b".into());

        db.replace_history(&room_a, &[sample("a")]).unwrap();
        db.replace_history(&room_b, &[sample("b")]).unwrap();

        assert!(db.delete_history(&room_a).unwrap());
        assert!(db.load_history(&room_a).unwrap().is_empty());
        assert_eq!(db.load_history(&room_b).unwrap().len(), 1);
    }

    #[test]
    fn corrupt_rows_are_skipped_not_fatal() {
        let (_dir, mut db) = open_temp();
        let room = RoomId("room-1".into());
        db.replace_history(&room, &[sample("ok")]).unwrap();

        db.conn()
            .execute(
                "INSERT INTO room_history (room_id, position, json) VALUES (?1, 1, 'not json')",
                params![room.as_str()],
            )
            .unwrap();

        let loaded = db.load_history(&room).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "ok");
    }
}

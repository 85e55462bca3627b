//! CRUD operations for chat messages.

use rusqlite::params;
use uuid::Uuid;

use refugio_shared::protocol::ChatMessage;
use refugio_shared::types::RoomId;

use crate::database::Database;
use crate::error::Result;
use crate::rooms::{parse_timestamp, parse_uuid};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new message.
    pub fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, room_id, sender, nickname, content,
                                   encrypted, digest, deleted, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            params![
                message.id.to_string(),
                message.room_id.to_string(),
                message.sender,
                message.nickname,
                message.content,
                message.encrypted as i64,
                message.digest,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// The newest `limit` non-deleted messages of a room, oldest first.
    pub fn recent_messages(&self, room_id: RoomId, limit: u32) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, room_id, sender, nickname, content, encrypted, digest, timestamp
             FROM messages
             WHERE room_id = ?1 AND deleted = 0
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![room_id.to_string(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        // Queried newest-first to apply the limit; callers read oldest-first.
        messages.reverse();
        Ok(messages)
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    /// Soft-delete a message. Returns `true` if a row was marked.
    ///
    /// Deleted messages stay on disk but drop out of history reads.
    pub fn mark_message_deleted(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET deleted = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`ChatMessage`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id_str: String = row.get(0)?;
    let room_str: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let nickname: String = row.get(3)?;
    let content: String = row.get(4)?;
    let encrypted: bool = row.get(5)?;
    let digest: String = row.get(6)?;
    let ts_str: String = row.get(7)?;

    Ok(ChatMessage {
        id: parse_uuid(&id_str, 0)?,
        room_id: parse_uuid(&room_str, 1)?,
        sender,
        nickname,
        content,
        encrypted,
        digest,
        timestamp: parse_timestamp(&ts_str, 7)?,
    })
}

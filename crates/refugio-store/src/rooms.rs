//! CRUD operations for [`Room`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use refugio_shared::types::{Room, RoomId, RoomKind, RoomMember};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    /// Insert or update a room together with its member set.
    ///
    /// Membership is replaced wholesale inside one transaction so the stored
    /// set always mirrors a single in-memory state of the room.
    pub fn save_room(&mut self, room: &Room) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO rooms (id, pin_hash, pin_salt, name, kind, capacity,
                                creator, creator_nickname, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 name       = excluded.name,
                 active     = excluded.active,
                 updated_at = excluded.updated_at",
            params![
                room.id.to_string(),
                room.pin_hash,
                room.pin_salt,
                room.name,
                room.kind.as_str(),
                room.capacity as i64,
                room.creator,
                room.creator_nickname,
                room.active as i64,
                room.created_at.to_rfc3339(),
                room.updated_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "DELETE FROM room_members WHERE room_id = ?1",
            params![room.id.to_string()],
        )?;
        for member in &room.members {
            tx.execute(
                "INSERT INTO room_members (room_id, identity, nickname, fingerprint, joined_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    room.id.to_string(),
                    member.identity,
                    member.nickname,
                    member.fingerprint,
                    member.joined_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single room by UUID, members included.
    ///
    /// The returned room has an empty `ephemeral_key`: keys are memory-only
    /// and never reach the store.
    pub fn get_room(&self, id: RoomId) -> Result<Room> {
        let mut room = self
            .conn()
            .query_row(
                "SELECT id, pin_hash, pin_salt, name, kind, capacity,
                        creator, creator_nickname, active, created_at, updated_at
                 FROM rooms
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_room,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        room.members = self.load_members(id)?;
        Ok(room)
    }

    // ------------------------------------------------------------------
    // Deactivation
    // ------------------------------------------------------------------

    /// Deactivate every active room. Returns the number of rooms affected.
    ///
    /// Called at boot: rooms that outlived a previous process have
    /// unrecoverable ephemeral keys and can never be joined again.
    pub fn deactivate_all_rooms(&self) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE rooms SET active = 0, updated_at = ?1 WHERE active = 1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn load_members(&self, room_id: RoomId) -> Result<Vec<RoomMember>> {
        let mut stmt = self.conn().prepare(
            "SELECT identity, nickname, fingerprint, joined_at
             FROM room_members
             WHERE room_id = ?1
             ORDER BY joined_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![room_id.to_string()], row_to_member)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Room`] (members attached separately).
fn row_to_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
    let id_str: String = row.get(0)?;
    let pin_hash: String = row.get(1)?;
    let pin_salt: String = row.get(2)?;
    let name: String = row.get(3)?;
    let kind_str: String = row.get(4)?;
    let capacity: i64 = row.get(5)?;
    let creator: String = row.get(6)?;
    let creator_nickname: String = row.get(7)?;
    let active: bool = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    let id = parse_uuid(&id_str, 0)?;
    let kind = RoomKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown room kind: {kind_str}").into(),
        )
    })?;

    Ok(Room {
        id,
        pin_hash,
        pin_salt,
        name,
        kind,
        capacity: capacity as usize,
        creator,
        creator_nickname,
        ephemeral_key: String::new(),
        members: Vec::new(),
        active,
        created_at: parse_timestamp(&created_str, 9)?,
        updated_at: parse_timestamp(&updated_str, 10)?,
    })
}

/// Map a `rusqlite::Row` to a [`RoomMember`].
fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoomMember> {
    let identity: String = row.get(0)?;
    let nickname: String = row.get(1)?;
    let fingerprint: String = row.get(2)?;
    let joined_str: String = row.get(3)?;

    Ok(RoomMember {
        identity,
        nickname,
        fingerprint,
        joined_at: parse_timestamp(&joined_str, 3)?,
    })
}

pub(crate) fn parse_uuid(s: &str, column: usize) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(s: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn sample_room() -> Room {
        let now = Utc::now();
        Room {
            id: Uuid::new_v4(),
            pin_hash: "a".repeat(64),
            pin_salt: "b".repeat(32),
            name: "sala segura".to_string(),
            kind: RoomKind::Multimedia,
            capacity: 10,
            creator: "user-1".to_string(),
            creator_nickname: "ana".to_string(),
            ephemeral_key: "feedface".to_string(),
            members: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn member(fingerprint: &str) -> RoomMember {
        RoomMember {
            identity: format!("user-{fingerprint}"),
            nickname: format!("nick-{fingerprint}"),
            fingerprint: fingerprint.to_string(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn save_and_get_round_trip() {
        let (_dir, mut db) = test_db();
        let mut room = sample_room();
        room.members.push(member("fp-1"));
        room.members.push(member("fp-2"));

        db.save_room(&room).unwrap();
        let loaded = db.get_room(room.id).unwrap();

        assert_eq!(loaded.id, room.id);
        assert_eq!(loaded.pin_hash, room.pin_hash);
        assert_eq!(loaded.name, room.name);
        assert_eq!(loaded.kind, RoomKind::Multimedia);
        assert_eq!(loaded.capacity, 10);
        assert_eq!(loaded.members, room.members);
        // Keys never round-trip through the store.
        assert!(loaded.ephemeral_key.is_empty());
    }

    #[test]
    fn save_replaces_membership() {
        let (_dir, mut db) = test_db();
        let mut room = sample_room();
        room.members.push(member("fp-1"));
        db.save_room(&room).unwrap();

        room.members.clear();
        room.members.push(member("fp-2"));
        db.save_room(&room).unwrap();

        let loaded = db.get_room(room.id).unwrap();
        assert_eq!(loaded.members.len(), 1);
        assert_eq!(loaded.members[0].fingerprint, "fp-2");
    }

    #[test]
    fn get_missing_room_is_not_found() {
        let (_dir, db) = test_db();
        assert!(matches!(
            db.get_room(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn deactivate_all_rooms_touches_only_active_ones() {
        let (_dir, mut db) = test_db();

        let active = sample_room();
        let mut inactive = sample_room();
        inactive.active = false;
        db.save_room(&active).unwrap();
        db.save_room(&inactive).unwrap();

        assert_eq!(db.deactivate_all_rooms().unwrap(), 1);
        assert!(!db.get_room(active.id).unwrap().active);

        // Second sweep has nothing left to do.
        assert_eq!(db.deactivate_all_rooms().unwrap(), 0);
    }
}

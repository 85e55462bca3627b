//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `rooms`, `room_members`, `messages`, and
//! `files`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    id               TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    pin_hash         TEXT NOT NULL,              -- salted BLAKE3, hex
    pin_salt         TEXT NOT NULL,              -- hex
    name             TEXT NOT NULL,
    kind             TEXT NOT NULL,              -- 'text' | 'multimedia'
    capacity         INTEGER NOT NULL,
    creator          TEXT NOT NULL,              -- identity of the creator
    creator_nickname TEXT NOT NULL,
    active           INTEGER NOT NULL DEFAULT 1, -- boolean 0/1
    created_at       TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rooms_active ON rooms(active);

-- ----------------------------------------------------------------
-- Room members (current membership, replaced wholesale on save)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS room_members (
    room_id     TEXT NOT NULL,                   -- FK -> rooms(id)
    identity    TEXT NOT NULL,
    nickname    TEXT NOT NULL,
    fingerprint TEXT NOT NULL,                   -- device fingerprint, hex
    joined_at   TEXT NOT NULL,

    PRIMARY KEY (room_id, fingerprint),
    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        TEXT PRIMARY KEY NOT NULL,         -- UUID v4
    room_id   TEXT NOT NULL,                     -- FK -> rooms(id)
    sender    TEXT NOT NULL,                     -- identity of the sender
    nickname  TEXT NOT NULL,
    content   TEXT NOT NULL,
    encrypted INTEGER NOT NULL DEFAULT 0,        -- boolean 0/1
    digest    TEXT NOT NULL,                     -- BLAKE3, hex
    deleted   INTEGER NOT NULL DEFAULT 0,        -- soft delete, moderation
    timestamp TEXT NOT NULL,                     -- ISO-8601

    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_room_ts
    ON messages(room_id, timestamp DESC);

-- ----------------------------------------------------------------
-- Files (upload metadata plus analysis outcome)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS files (
    id           TEXT PRIMARY KEY NOT NULL,      -- UUID v4
    room_id      TEXT NOT NULL,                  -- FK -> rooms(id)
    uploader     TEXT NOT NULL,                  -- identity of the uploader
    nickname     TEXT NOT NULL,
    file_name    TEXT NOT NULL,                  -- client-supplied name
    stored_name  TEXT NOT NULL,                  -- vault file name
    mime         TEXT NOT NULL,
    size         INTEGER NOT NULL,
    digest       TEXT NOT NULL,                  -- BLAKE3, hex
    uploaded_at  TEXT NOT NULL,
    scan_checked INTEGER NOT NULL DEFAULT 0,     -- boolean 0/1
    scan_passed  INTEGER NOT NULL DEFAULT 0,     -- boolean 0/1
    scan_entropy REAL    NOT NULL DEFAULT 0,
    scan_details TEXT    NOT NULL DEFAULT '',

    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_files_room_uploaded
    ON files(room_id, uploaded_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

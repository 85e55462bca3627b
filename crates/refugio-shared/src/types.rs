//! Domain model structs shared by the engine, the store, and the server.
//!
//! Everything here derives `Serialize`/`Deserialize` so records can cross
//! the HTTP boundary or reach persistence without a separate mapping layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique room identifier.
pub type RoomId = Uuid;

/// Unique uploaded-file identifier.
pub type FileId = Uuid;

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// What a room carries: plain text only, or text plus file uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Text,
    Multimedia,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Text => "text",
            RoomKind::Multimedia => "multimedia",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(RoomKind::Text),
            "multimedia" => Some(RoomKind::Multimedia),
            _ => None,
        }
    }
}

/// A participant currently inside a room, keyed by device fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    /// Identity taken from the member's access token.
    pub identity: String,
    pub nickname: String,
    /// Deterministic device fingerprint (hex). Unique across all active
    /// rooms: one device, one room.
    pub fingerprint: String,
    pub joined_at: DateTime<Utc>,
}

/// A PIN-protected ephemeral chat room.
///
/// The clear PIN exists only in the creation response; everywhere else the
/// room carries its salted hash. The ephemeral key lives in memory for the
/// lifetime of the process and is never persisted, so rooms that survive a
/// restart on disk are unreadable and get retired at boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// Salted BLAKE3 hash of the six-digit PIN (hex).
    pub pin_hash: String,
    /// Per-room random salt for the PIN hash (hex).
    pub pin_salt: String,
    pub name: String,
    pub kind: RoomKind,
    /// Maximum number of concurrent members.
    pub capacity: usize,
    /// Identity of the creator. Only this identity may delete the room.
    pub creator: String,
    pub creator_nickname: String,
    /// Symmetric room key (hex), handed to members on join. Memory-only.
    pub ephemeral_key: String,
    pub members: Vec<RoomMember>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn has_device(&self, fingerprint: &str) -> bool {
        self.members.iter().any(|m| m.fingerprint == fingerprint)
    }

    /// Remove the member holding `fingerprint`, returning it if present.
    pub fn remove_device(&mut self, fingerprint: &str) -> Option<RoomMember> {
        let index = self
            .members
            .iter()
            .position(|m| m.fingerprint == fingerprint)?;
        Some(self.members.remove(index))
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Role carried by an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

/// The verified identity behind a connection or an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub identity: String,
    pub display_name: String,
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Uploaded files
// ---------------------------------------------------------------------------

/// Outcome of the hidden-data analysis for an uploaded file.
///
/// `checked` stays `false` until the out-of-band analysis completes. Records
/// whose analysis crashed or timed out remain unchecked forever; readers
/// must tolerate that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub checked: bool,
    pub passed: bool,
    /// Shannon entropy of the file, in bits per byte.
    pub entropy: f64,
    pub details: String,
}

impl Default for ScanReport {
    fn default() -> Self {
        Self {
            checked: false,
            passed: false,
            entropy: 0.0,
            details: String::new(),
        }
    }
}

/// Metadata for a file uploaded into a multimedia room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub room_id: RoomId,
    /// Identity of the uploader.
    pub uploader: String,
    pub nickname: String,
    /// Name the client supplied.
    pub file_name: String,
    /// UUID-based name of the file inside the vault.
    pub stored_name: String,
    pub mime: String,
    pub size: u64,
    /// BLAKE3 hash of the content (hex).
    pub digest: String,
    pub uploaded_at: DateTime<Utc>,
    pub scan: ScanReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(fingerprint: &str) -> RoomMember {
        RoomMember {
            identity: format!("user-{fingerprint}"),
            nickname: format!("nick-{fingerprint}"),
            fingerprint: fingerprint.to_string(),
            joined_at: Utc::now(),
        }
    }

    fn room(capacity: usize) -> Room {
        let now = Utc::now();
        Room {
            id: Uuid::new_v4(),
            pin_hash: "hash".to_string(),
            pin_salt: "salt".to_string(),
            name: "reading circle".to_string(),
            kind: RoomKind::Text,
            capacity,
            creator: "creator".to_string(),
            creator_nickname: "creator".to_string(),
            ephemeral_key: String::new(),
            members: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn room_kind_round_trips_through_str() {
        for kind in [RoomKind::Text, RoomKind::Multimedia] {
            assert_eq!(RoomKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RoomKind::parse("voice"), None);
    }

    #[test]
    fn room_fullness_tracks_capacity() {
        let mut room = room(2);
        assert!(!room.is_full());

        room.members.push(member("a"));
        room.members.push(member("b"));
        assert!(room.is_full());
    }

    #[test]
    fn remove_device_returns_the_member() {
        let mut room = room(5);
        room.members.push(member("a"));
        room.members.push(member("b"));

        let removed = room.remove_device("a").unwrap();
        assert_eq!(removed.fingerprint, "a");
        assert_eq!(room.members.len(), 1);
        assert!(!room.has_device("a"));
        assert!(room.has_device("b"));

        assert!(room.remove_device("a").is_none());
    }
}

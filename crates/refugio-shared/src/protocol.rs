//! Wire protocol for the real-time socket.
//!
//! Events are JSON objects tagged with a `type` field. Clients send
//! [`ClientEvent`]s; the server answers and fans out [`ServerEvent`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Room, RoomId, RoomKind, RoomMember};

/// Events a connected client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to the room answering to `pin`.
    JoinRoom { pin: String, nickname: String },
    /// Post a message to the bound room.
    SendMessage {
        content: String,
        #[serde(default)]
        encrypted: bool,
    },
    Typing,
    StopTyping,
    /// Unbind from the current room.
    LeaveRoom,
    /// Deactivate a room. Creator only; the requester need not be inside.
    DeleteRoom { room_id: RoomId },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to a successful join: full room state plus recent history.
    Joined {
        room: RoomSnapshot,
        recent_messages: Vec<ChatMessage>,
    },
    /// Someone else entered the room.
    UserJoined {
        nickname: String,
        members: Vec<MemberInfo>,
    },
    NewMessage(ChatMessage),
    UserTyping {
        nickname: String,
    },
    UserStopTyping {
        nickname: String,
    },
    /// Someone left; `members` is the roster after their departure.
    UserLeft {
        nickname: String,
        members: Vec<MemberInfo>,
    },
    /// Terminal event for a room. No further events follow it.
    RoomDeleted {
        message: String,
    },
    /// Scoped failure, delivered only to the client whose event caused it.
    Error {
        message: String,
    },
}

/// Room state handed to a member on join. Carries the ephemeral key, so it
/// must never be exposed over plain HTTP reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub name: String,
    pub kind: RoomKind,
    pub capacity: usize,
    pub ephemeral_key: String,
    pub members: Vec<MemberInfo>,
}

impl RoomSnapshot {
    pub fn from_room(room: &Room) -> Self {
        Self {
            id: room.id,
            name: room.name.clone(),
            kind: room.kind,
            capacity: room.capacity,
            ephemeral_key: room.ephemeral_key.clone(),
            members: room.members.iter().map(MemberInfo::from).collect(),
        }
    }
}

/// Public view of a room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub nickname: String,
    pub joined_at: DateTime<Utc>,
}

impl From<&RoomMember> for MemberInfo {
    fn from(member: &RoomMember) -> Self {
        Self {
            nickname: member.nickname.clone(),
            joined_at: member.joined_at,
        }
    }
}

/// A chat message as it travels the wire and as the store records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: RoomId,
    /// Identity of the sender.
    pub sender: String,
    pub nickname: String,
    pub content: String,
    /// Whether `content` is ciphertext under the room's ephemeral key.
    pub encrypted: bool,
    /// BLAKE3 digest over sender, content, and timestamp (hex).
    pub digest: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_parse_from_tagged_json() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join_room","pin":"483920","nickname":"ana"}"#)
                .unwrap();
        match event {
            ClientEvent::JoinRoom { pin, nickname } => {
                assert_eq!(pin, "483920");
                assert_eq!(nickname, "ana");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"send_message","content":"hola"}"#).unwrap();
        match event {
            ClientEvent::SendMessage { content, encrypted } => {
                assert_eq!(content, "hola");
                assert!(!encrypted, "encrypted defaults to false");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(matches!(
            serde_json::from_str::<ClientEvent>(r#"{"type":"leave_room"}"#).unwrap(),
            ClientEvent::LeaveRoom
        ));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"shout","content":"hi"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"content":"no tag"}"#).is_err());
    }

    #[test]
    fn server_events_serialize_with_snake_case_tags() {
        let event = ServerEvent::UserTyping {
            nickname: "ana".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "user_typing", "nickname": "ana"}));

        let event = ServerEvent::Error {
            message: "Invalid PIN".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Invalid PIN");
    }

    #[test]
    fn new_message_flattens_the_payload() {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            sender: "user-1".to_string(),
            nickname: "ana".to_string(),
            content: "hola".to_string(),
            encrypted: false,
            digest: "abc123".to_string(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(ServerEvent::NewMessage(message.clone())).unwrap();

        assert_eq!(value["type"], "new_message");
        assert_eq!(value["content"], "hola");
        assert_eq!(value["digest"], "abc123");
        assert_eq!(value["nickname"], "ana");
    }
}

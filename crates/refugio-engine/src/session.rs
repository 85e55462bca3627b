//! Per-connection protocol state machine and the engine facade.
//!
//! A [`Session`] is one authenticated connection. It starts unbound, may
//! bind to a single room, and ends terminated. [`ChatEngine`] drives every
//! session operation; failures are scoped, pushed back to the originating
//! session only, while accepted events fan out through the room's
//! broadcast group.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use refugio_shared::crypto;
use refugio_shared::protocol::{ChatMessage, ClientEvent, MemberInfo, RoomSnapshot, ServerEvent};
use refugio_shared::sanitize;
use refugio_shared::types::{Principal, RoomId};

use crate::audit::{events, AuditSink};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::hub::{RoomHub, SessionId};
use crate::lifecycle::RoomLifecycle;
use crate::persist::Persistence;

/// Protocol position of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Credential verified, not bound to any room.
    Authenticated,
    /// Bound to a room under a nickname.
    InRoom { room: RoomId, nickname: String },
    /// Connection is gone; nothing further is accepted.
    Terminated,
}

/// One authenticated connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub principal: Principal,
    /// Device fingerprint derived from the connection's origin.
    pub fingerprint: String,
    /// Network origin, for the audit trail.
    pub origin: String,
    pub state: SessionState,
    outbox: mpsc::Sender<String>,
}

impl Session {
    pub fn new(
        principal: Principal,
        fingerprint: String,
        origin: String,
        outbox: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal,
            fingerprint,
            origin,
            state: SessionState::Authenticated,
            outbox,
        }
    }

    /// The room this session is bound to, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match &self.state {
            SessionState::InRoom { room, .. } => Some(*room),
            _ => None,
        }
    }

    /// Push an event to this session only. Best-effort: a full outbox drops
    /// the event rather than blocking the engine.
    pub fn push(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                if self.outbox.try_send(payload).is_err() {
                    debug!(session = %self.id, "dropping direct event for slow session");
                }
            }
            Err(e) => warn!(session = %self.id, error = %e, "failed to serialize event"),
        }
    }
}

/// Ties the room lifecycle, the broadcast hub, persistence, and the audit
/// sink into the operations the socket layer drives.
pub struct ChatEngine {
    config: EngineConfig,
    lifecycle: Arc<RoomLifecycle>,
    hub: Arc<RoomHub>,
    persistence: Arc<dyn Persistence>,
    audit: Arc<dyn AuditSink>,
}

impl ChatEngine {
    pub fn new(
        config: EngineConfig,
        lifecycle: Arc<RoomLifecycle>,
        hub: Arc<RoomHub>,
        persistence: Arc<dyn Persistence>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            hub,
            persistence,
            audit,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dispatch one client event. Failures become scoped `error` events for
    /// the originating session; nothing leaks to the rest of the room.
    pub async fn handle_event(&self, session: &mut Session, event: ClientEvent) {
        let result = match event {
            ClientEvent::JoinRoom { pin, nickname } => {
                self.join_room(session, &pin, &nickname).await
            }
            ClientEvent::SendMessage { content, encrypted } => self
                .send_message(session, &content, encrypted)
                .await
                .map(|_| ()),
            ClientEvent::Typing => self.typing(session).await,
            ClientEvent::StopTyping => self.stop_typing(session).await,
            ClientEvent::LeaveRoom => self.leave_room(session).await,
            ClientEvent::DeleteRoom { room_id } => self.delete_room(session, room_id).await,
        };

        if let Err(e) = result {
            debug!(session = %session.id, error = %e, "client event rejected");
            session.push(&ServerEvent::Error {
                message: e.to_string(),
            });
        }
    }

    // ------------------------------------------------------------------
    // join_room
    // ------------------------------------------------------------------

    /// Bind the session to the room answering to `pin`, subscribe it to the
    /// room's broadcast group, reply with the snapshot and recent history,
    /// and announce the arrival to the other members.
    pub async fn join_room(
        &self,
        session: &mut Session,
        pin: &str,
        nickname: &str,
    ) -> Result<(), EngineError> {
        if let Some(bound) = session.room_id() {
            // Rebinding requires an explicit leave while the bound room is
            // alive. A deleted room leaves the binding dangling; clear it
            // quietly and let the join proceed.
            if self.lifecycle.room(bound).await.is_some() {
                return Err(EngineError::AlreadyMember);
            }
            self.hub.unsubscribe(&bound, &session.id).await;
            session.state = SessionState::Authenticated;
        }
        if !sanitize::valid_pin_format(pin) {
            return Err(EngineError::InvalidPinFormat);
        }
        let nickname = sanitize::sanitize_nickname(nickname);
        if !sanitize::valid_nickname(&nickname) {
            return Err(EngineError::InvalidNickname);
        }

        let room = self
            .lifecycle
            .join_room(
                pin,
                &session.principal.identity,
                &nickname,
                &session.fingerprint,
                &session.origin,
            )
            .await?;

        self.hub
            .subscribe(room.id, session.id, session.outbox.clone())
            .await;
        session.state = SessionState::InRoom {
            room: room.id,
            nickname: nickname.clone(),
        };

        // A history read failure degrades to an empty backlog; the seat is
        // already taken and must not be poisoned by a read error.
        let recent = match self
            .persistence
            .recent_messages(room.id, self.config.history_window)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room = %room.id, error = %e, "history fetch failed, joining with none");
                Vec::new()
            }
        };

        session.push(&ServerEvent::Joined {
            room: RoomSnapshot::from_room(&room),
            recent_messages: recent,
        });

        let members: Vec<MemberInfo> = room.members.iter().map(MemberInfo::from).collect();
        self.broadcast_except(
            &room.id,
            &session.id,
            &ServerEvent::UserJoined {
                nickname: nickname.clone(),
                members,
            },
        )
        .await;

        self.audit.record(
            events::SOCKET_JOIN_ROOM,
            &session.principal.identity,
            &session.origin,
            json!({ "room_id": room.id, "nickname": nickname }),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // send_message
    // ------------------------------------------------------------------

    /// Sanitize, digest, persist, then fan out (sender included). The room
    /// order guard spans persist-then-broadcast, so delivery order within a
    /// room equals acceptance order.
    pub async fn send_message(
        &self,
        session: &Session,
        content: &str,
        encrypted: bool,
    ) -> Result<ChatMessage, EngineError> {
        let SessionState::InRoom {
            room: room_id,
            nickname,
        } = &session.state
        else {
            return Err(EngineError::NotInRoom);
        };

        let content = sanitize::sanitize_message(content);
        if content.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let order = self
            .hub
            .room_order(room_id)
            .await
            .ok_or(EngineError::RoomInactive)?;
        let _guard = order.lock().await;

        // The room may have been deleted while we waited for the guard.
        let room = self
            .lifecycle
            .room(*room_id)
            .await
            .ok_or(EngineError::RoomInactive)?;
        if !room.active {
            return Err(EngineError::RoomInactive);
        }

        let timestamp = Utc::now();
        let digest = crypto::message_digest(
            &session.principal.identity,
            &content,
            timestamp.timestamp_millis(),
        );
        let message = ChatMessage {
            id: Uuid::new_v4(),
            room_id: *room_id,
            sender: session.principal.identity.clone(),
            nickname: nickname.clone(),
            content,
            encrypted,
            digest,
            timestamp,
        };

        self.persistence.save_message(&message).await?;
        self.broadcast(room_id, &ServerEvent::NewMessage(message.clone()))
            .await;

        self.audit.record(
            events::MESSAGE_SENT,
            &message.sender,
            &session.origin,
            json!({ "room_id": room_id, "chars": message.content.chars().count() }),
        );
        Ok(message)
    }

    // ------------------------------------------------------------------
    // typing indicators
    // ------------------------------------------------------------------

    /// Ephemeral indicator for the other members. Never persisted.
    pub async fn typing(&self, session: &Session) -> Result<(), EngineError> {
        let SessionState::InRoom {
            room: room_id,
            nickname,
        } = &session.state
        else {
            return Err(EngineError::NotInRoom);
        };

        self.broadcast_except(
            room_id,
            &session.id,
            &ServerEvent::UserTyping {
                nickname: nickname.clone(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn stop_typing(&self, session: &Session) -> Result<(), EngineError> {
        let SessionState::InRoom {
            room: room_id,
            nickname,
        } = &session.state
        else {
            return Err(EngineError::NotInRoom);
        };

        self.broadcast_except(
            room_id,
            &session.id,
            &ServerEvent::UserStopTyping {
                nickname: nickname.clone(),
            },
        )
        .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // leave_room
    // ------------------------------------------------------------------

    /// Unbind from the current room, unsubscribe, and announce the new
    /// roster. The leaver is unsubscribed first, so it never sees its own
    /// departure event.
    pub async fn leave_room(&self, session: &mut Session) -> Result<(), EngineError> {
        let SessionState::InRoom {
            room: room_id,
            nickname,
        } = session.state.clone()
        else {
            return Err(EngineError::NotInRoom);
        };

        match self
            .lifecycle
            .leave_room(room_id, &session.fingerprint, &session.origin)
            .await
        {
            Ok(room) => {
                self.hub.unsubscribe(&room_id, &session.id).await;
                session.state = SessionState::Authenticated;

                let members: Vec<MemberInfo> =
                    room.members.iter().map(MemberInfo::from).collect();
                self.broadcast(&room_id, &ServerEvent::UserLeft { nickname, members })
                    .await;

                self.audit.record(
                    events::SOCKET_LEAVE_ROOM,
                    &session.principal.identity,
                    &session.origin,
                    json!({ "room_id": room_id }),
                );
                Ok(())
            }
            // The room vanished underneath us (deleted or swept). Unbind
            // quietly; there is nobody left to announce to.
            Err(EngineError::RoomNotFound) => {
                self.hub.unsubscribe(&room_id, &session.id).await;
                session.state = SessionState::Authenticated;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // delete_room
    // ------------------------------------------------------------------

    /// Deactivate a room on behalf of `requester`, push the terminal event
    /// to every subscriber, and dissolve the broadcast group. Connections
    /// survive; only the room goes away.
    pub async fn delete_room_as(
        &self,
        requester: &str,
        origin: &str,
        room_id: RoomId,
    ) -> Result<(), EngineError> {
        self.lifecycle.delete_room(room_id, requester, origin).await?;

        self.broadcast(
            &room_id,
            &ServerEvent::RoomDeleted {
                message: "Room deleted by its creator".to_string(),
            },
        )
        .await;
        self.hub.close_room(&room_id).await;
        Ok(())
    }

    /// Socket-side deletion. The requester need not be inside the room.
    pub async fn delete_room(
        &self,
        session: &mut Session,
        room_id: RoomId,
    ) -> Result<(), EngineError> {
        self.delete_room_as(&session.principal.identity, &session.origin, room_id)
            .await?;

        if session.room_id() == Some(room_id) {
            session.state = SessionState::Authenticated;
        }

        self.audit.record(
            events::SOCKET_DELETE_ROOM,
            &session.principal.identity,
            &session.origin,
            json!({ "room_id": room_id }),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // disconnect
    // ------------------------------------------------------------------

    /// Implicit leave on connection teardown, then terminal state.
    pub async fn disconnect(&self, session: &mut Session) {
        if session.room_id().is_some() {
            if let Err(e) = self.leave_room(session).await {
                debug!(session = %session.id, error = %e, "leave on disconnect failed");
            }
        }

        self.audit.record(
            events::SOCKET_DISCONNECT,
            &session.principal.identity,
            &session.origin,
            json!({}),
        );
        session.state = SessionState::Terminated;
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn broadcast(&self, room_id: &RoomId, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => self.hub.broadcast(room_id, payload).await,
            Err(e) => warn!(room = %room_id, error = %e, "failed to serialize broadcast"),
        }
    }

    async fn broadcast_except(&self, room_id: &RoomId, skip: &SessionId, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => self.hub.broadcast_except(room_id, skip, payload).await,
            Err(e) => warn!(room = %room_id, error = %e, "failed to serialize broadcast"),
        }
    }
}

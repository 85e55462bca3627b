//! Room lifecycle: creation, PIN verification, join/leave, deletion, and
//! the idle sweep.
//!
//! All mutations run under one write lock, and candidate state is persisted
//! before it is committed to memory. Two clients racing for the last seat
//! of a room therefore resolve deterministically: one join commits, the
//! other observes a full room.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use refugio_shared::crypto;
use refugio_shared::sanitize;
use refugio_shared::types::{Room, RoomId, RoomKind, RoomMember};

use crate::audit::{events, AuditSink};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::persist::Persistence;
use crate::registry::RoomTable;

/// Parameters for [`RoomLifecycle::create_room`].
#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub name: String,
    pub kind: RoomKind,
    pub capacity: usize,
    /// Identity of the creator, from their access token.
    pub creator: String,
    pub creator_nickname: String,
    /// Network origin of the request, for the audit trail.
    pub origin: String,
    /// Requested PIN. Collisions fall back to random draws.
    pub custom_pin: Option<String>,
}

/// A freshly created room plus its clear PIN.
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room: Room,
    /// The clear PIN. This is the only place it is ever observable.
    pub pin: String,
}

/// Owner of the live room table.
pub struct RoomLifecycle {
    config: EngineConfig,
    table: RwLock<RoomTable>,
    persistence: Arc<dyn Persistence>,
    audit: Arc<dyn AuditSink>,
}

impl RoomLifecycle {
    pub fn new(
        config: EngineConfig,
        persistence: Arc<dyn Persistence>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            table: RwLock::new(RoomTable::new()),
            persistence,
            audit,
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a room and hand back its clear PIN.
    pub async fn create_room(&self, req: CreateRoom) -> Result<CreatedRoom, EngineError> {
        self.create_room_with(req, crypto::generate_pin).await
    }

    /// PIN source is injectable so collision exhaustion is testable.
    pub(crate) async fn create_room_with(
        &self,
        req: CreateRoom,
        mut next_pin: impl FnMut() -> String,
    ) -> Result<CreatedRoom, EngineError> {
        if !sanitize::valid_room_name(&req.name) {
            return Err(EngineError::InvalidName);
        }
        if !sanitize::valid_capacity(req.capacity) {
            return Err(EngineError::InvalidCapacity);
        }
        let nickname = sanitize::sanitize_nickname(&req.creator_nickname);
        if !sanitize::valid_nickname(&nickname) {
            return Err(EngineError::InvalidNickname);
        }
        if let Some(pin) = req.custom_pin.as_deref() {
            if !sanitize::valid_pin_format(pin) {
                return Err(EngineError::InvalidPinFormat);
            }
        }

        let mut table = self.table.write().await;

        // Requested PIN first, then random redraws on collision.
        let mut pin = match req.custom_pin {
            Some(pin) => pin,
            None => next_pin(),
        };
        let mut attempts: u32 = 0;
        while table.pin_in_use(&pin) {
            attempts += 1;
            if attempts >= self.config.max_pin_attempts {
                warn!(attempts, "PIN space exhausted while creating a room");
                return Err(EngineError::PinExhausted);
            }
            pin = next_pin();
        }

        let salt = crypto::generate_pin_salt();
        let now = Utc::now();
        let room = Room {
            id: Uuid::new_v4(),
            pin_hash: crypto::hash_pin(&pin, &salt),
            pin_salt: hex::encode(salt),
            name: req.name.trim().to_string(),
            kind: req.kind,
            capacity: req.capacity,
            creator: req.creator.clone(),
            creator_nickname: nickname,
            ephemeral_key: crypto::encode_key(&crypto::generate_room_key()),
            members: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        };

        self.persistence.save_room(&room).await?;
        table.insert(room.clone());

        info!(room = %room.id, name = %room.name, kind = ?room.kind, "room created");
        self.audit.record(
            events::ROOM_CREATED,
            &req.creator,
            &req.origin,
            json!({ "room_id": room.id, "name": room.name, "capacity": room.capacity }),
        );

        Ok(CreatedRoom { room, pin })
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Check a candidate PIN against every active room.
    pub async fn verify_pin(&self, pin: &str) -> Option<Room> {
        self.table.read().await.find_active_by_pin(pin).cloned()
    }

    /// Fetch a live room by id.
    pub async fn room(&self, id: RoomId) -> Option<Room> {
        self.table.read().await.get(&id).cloned()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.table.read().await.len()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Join the room answering to `pin`. On success the updated room is
    /// returned; the caller already holds a seat in it.
    pub async fn join_room(
        &self,
        pin: &str,
        identity: &str,
        nickname: &str,
        fingerprint: &str,
        origin: &str,
    ) -> Result<Room, EngineError> {
        if !sanitize::valid_nickname(nickname) {
            return Err(EngineError::InvalidNickname);
        }

        let mut table = self.table.write().await;

        let room_id = match table.find_active_by_pin(pin) {
            Some(room) => room.id,
            None => return Err(EngineError::InvalidPin),
        };

        // Check order is part of the protocol: fullness first, then
        // membership in this room, then the cross-room device check.
        let mut updated = match table.get(&room_id) {
            Some(room) => room.clone(),
            None => return Err(EngineError::RoomNotFound),
        };
        if updated.is_full() {
            return Err(EngineError::RoomFull);
        }
        if updated.has_device(fingerprint) {
            return Err(EngineError::AlreadyMember);
        }
        if table.device_room(fingerprint).is_some() {
            return Err(EngineError::DeviceElsewhere);
        }

        updated.members.push(RoomMember {
            identity: identity.to_string(),
            nickname: nickname.to_string(),
            fingerprint: fingerprint.to_string(),
            joined_at: Utc::now(),
        });
        updated.updated_at = Utc::now();

        self.persistence.save_room(&updated).await?;
        if let Some(room) = table.get_mut(&room_id) {
            *room = updated.clone();
        }

        info!(
            room = %updated.id,
            nickname,
            members = updated.members.len(),
            "member joined room"
        );
        self.audit.record(
            events::ROOM_JOINED,
            identity,
            origin,
            json!({ "room_id": updated.id, "nickname": nickname }),
        );

        Ok(updated)
    }

    /// Leave a room. The emptied room stays active; only the sweep retires
    /// idle rooms.
    pub async fn leave_room(
        &self,
        room_id: RoomId,
        fingerprint: &str,
        origin: &str,
    ) -> Result<Room, EngineError> {
        let mut table = self.table.write().await;

        let mut updated = match table.get(&room_id) {
            Some(room) => room.clone(),
            None => return Err(EngineError::RoomNotFound),
        };
        let member = match updated.remove_device(fingerprint) {
            Some(member) => member,
            None => return Err(EngineError::NotAMember),
        };
        updated.updated_at = Utc::now();

        self.persistence.save_room(&updated).await?;
        if let Some(room) = table.get_mut(&room_id) {
            *room = updated.clone();
        }

        info!(room = %room_id, nickname = %member.nickname, "member left room");
        self.audit.record(
            events::ROOM_LEFT,
            &member.identity,
            origin,
            json!({ "room_id": room_id, "nickname": member.nickname }),
        );

        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Deletion and sweep
    // ------------------------------------------------------------------

    /// Deactivate a room. Only its creator may do this; the row survives as
    /// a soft-deleted record while the live entry goes away.
    pub async fn delete_room(
        &self,
        room_id: RoomId,
        requester: &str,
        origin: &str,
    ) -> Result<Room, EngineError> {
        let mut table = self.table.write().await;

        let mut updated = match table.get(&room_id) {
            Some(room) => room.clone(),
            None => return Err(EngineError::RoomNotFound),
        };
        if updated.creator != requester {
            return Err(EngineError::Forbidden);
        }

        updated.active = false;
        updated.updated_at = Utc::now();

        self.persistence.save_room(&updated).await?;
        table.remove(&room_id);

        info!(room = %room_id, "room deactivated by creator");
        self.audit.record(
            events::ROOM_DELETED,
            requester,
            origin,
            json!({ "room_id": room_id }),
        );

        Ok(updated)
    }

    /// Retire active rooms that have sat empty beyond the retention window.
    /// Returns how many were swept.
    pub async fn sweep_idle_rooms(&self) -> Result<usize, EngineError> {
        let cutoff = Utc::now() - self.config.room_retention;
        let mut table = self.table.write().await;

        let mut swept = 0;
        for room_id in table.sweep_candidates(cutoff) {
            let mut room = match table.get(&room_id) {
                Some(room) => room.clone(),
                None => continue,
            };
            room.active = false;
            room.updated_at = Utc::now();

            self.persistence.save_room(&room).await?;
            table.remove(&room_id);
            swept += 1;
        }

        if swept > 0 {
            info!(swept, "idle rooms retired");
            self.audit.record(
                events::ROOMS_SWEPT,
                "system",
                "internal",
                json!({ "count": swept }),
            );
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAudit;
    use crate::persist::testing::MemoryPersistence;

    fn lifecycle_with(
        config: EngineConfig,
    ) -> (Arc<RoomLifecycle>, Arc<MemoryPersistence>) {
        let persistence = Arc::new(MemoryPersistence::default());
        let lifecycle = Arc::new(RoomLifecycle::new(
            config,
            persistence.clone(),
            Arc::new(TracingAudit),
        ));
        (lifecycle, persistence)
    }

    fn lifecycle() -> (Arc<RoomLifecycle>, Arc<MemoryPersistence>) {
        lifecycle_with(EngineConfig::default())
    }

    fn request(name: &str) -> CreateRoom {
        CreateRoom {
            name: name.to_string(),
            kind: RoomKind::Text,
            capacity: 5,
            creator: "creator-1".to_string(),
            creator_nickname: "ana".to_string(),
            origin: "127.0.0.1".to_string(),
            custom_pin: None,
        }
    }

    #[tokio::test]
    async fn create_room_exposes_the_pin_exactly_once() {
        let (lifecycle, persistence) = lifecycle();

        let created = lifecycle.create_room(request("lectura")).await.unwrap();
        assert_eq!(created.pin.len(), 6);
        assert_ne!(created.room.pin_hash, created.pin);
        assert_eq!(created.room.ephemeral_key.len(), 64);

        // Durable copy carries only the salted hash.
        let stored = persistence.rooms.lock().await;
        let stored = stored.get(&created.room.id).unwrap();
        assert!(!stored.pin_hash.contains(&created.pin));

        let found = lifecycle.verify_pin(&created.pin).await.unwrap();
        assert_eq!(found.id, created.room.id);
        assert!(lifecycle.verify_pin("000001").await.is_none());
    }

    #[tokio::test]
    async fn create_room_validates_its_inputs() {
        let (lifecycle, _) = lifecycle();

        let mut bad = request("ab");
        assert!(matches!(
            lifecycle.create_room(bad).await,
            Err(EngineError::InvalidName)
        ));

        bad = request("lectura");
        bad.capacity = 1;
        assert!(matches!(
            lifecycle.create_room(bad).await,
            Err(EngineError::InvalidCapacity)
        ));

        bad = request("lectura");
        bad.creator_nickname = "<>".to_string();
        assert!(matches!(
            lifecycle.create_room(bad).await,
            Err(EngineError::InvalidNickname)
        ));

        bad = request("lectura");
        bad.custom_pin = Some("12345".to_string());
        assert!(matches!(
            lifecycle.create_room(bad).await,
            Err(EngineError::InvalidPinFormat)
        ));
    }

    #[tokio::test]
    async fn colliding_custom_pin_falls_back_to_a_random_draw() {
        let (lifecycle, _) = lifecycle();

        let mut req = request("primera");
        req.custom_pin = Some("424242".to_string());
        let first = lifecycle.create_room(req).await.unwrap();
        assert_eq!(first.pin, "424242");

        let mut req = request("segunda");
        req.custom_pin = Some("424242".to_string());
        let second = lifecycle.create_room(req).await.unwrap();
        assert_ne!(second.pin, "424242");
        assert_eq!(second.pin.len(), 6);
    }

    #[tokio::test]
    async fn exhausted_pin_space_fails_creation() {
        let (lifecycle, _) = lifecycle();

        let mut req = request("primera");
        req.custom_pin = Some("424242".to_string());
        lifecycle.create_room(req).await.unwrap();

        // Every draw collides with the existing room.
        let result = lifecycle
            .create_room_with(request("segunda"), || "424242".to_string())
            .await;
        assert!(matches!(result, Err(EngineError::PinExhausted)));
    }

    #[tokio::test]
    async fn join_occupies_a_seat() {
        let (lifecycle, _) = lifecycle();
        let created = lifecycle.create_room(request("lectura")).await.unwrap();

        let room = lifecycle
            .join_room(&created.pin, "user-2", "beto", "fp-b", "127.0.0.2")
            .await
            .unwrap();
        assert_eq!(room.members.len(), 1);
        assert_eq!(room.members[0].nickname, "beto");
        assert!(room.updated_at >= created.room.updated_at);

        assert!(matches!(
            lifecycle
                .join_room("999999", "user-3", "carla", "fp-c", "127.0.0.3")
                .await,
            Err(EngineError::InvalidPin)
        ));
    }

    #[tokio::test]
    async fn full_room_rejects_a_new_device() {
        let (lifecycle, _) = lifecycle();
        let mut req = request("dueto");
        req.capacity = 2;
        let created = lifecycle.create_room(req).await.unwrap();

        lifecycle
            .join_room(&created.pin, "user-2", "beto", "fp-b", "o")
            .await
            .unwrap();
        lifecycle
            .join_room(&created.pin, "user-3", "carla", "fp-c", "o")
            .await
            .unwrap();

        assert!(matches!(
            lifecycle
                .join_room(&created.pin, "user-4", "dani", "fp-d", "o")
                .await,
            Err(EngineError::RoomFull)
        ));
        assert_eq!(lifecycle.room(created.room.id).await.unwrap().members.len(), 2);
    }

    #[tokio::test]
    async fn one_device_one_room() {
        let (lifecycle, _) = lifecycle();
        let first = lifecycle.create_room(request("primera")).await.unwrap();
        let second = lifecycle.create_room(request("segunda")).await.unwrap();

        lifecycle
            .join_room(&first.pin, "user-2", "beto", "fp-b", "o")
            .await
            .unwrap();

        assert!(matches!(
            lifecycle
                .join_room(&first.pin, "user-2", "beto", "fp-b", "o")
                .await,
            Err(EngineError::AlreadyMember)
        ));
        assert!(matches!(
            lifecycle
                .join_room(&second.pin, "user-2", "beto", "fp-b", "o")
                .await,
            Err(EngineError::DeviceElsewhere)
        ));
    }

    #[tokio::test]
    async fn racing_for_the_last_seat_admits_exactly_one() {
        let (lifecycle, _) = lifecycle();
        let mut req = request("dueto");
        req.capacity = 2;
        let created = lifecycle.create_room(req).await.unwrap();
        lifecycle
            .join_room(&created.pin, "user-2", "beto", "fp-b", "o")
            .await
            .unwrap();

        let (left, right) = tokio::join!(
            lifecycle.join_room(&created.pin, "user-3", "carla", "fp-c", "o"),
            lifecycle.join_room(&created.pin, "user-4", "dani", "fp-d", "o"),
        );

        let admitted = [&left, &right].iter().filter(|r| r.is_ok()).count();
        assert_eq!(admitted, 1);
        assert!(matches!(
            [left, right].into_iter().find(|r| r.is_err()),
            Some(Err(EngineError::RoomFull))
        ));
        assert_eq!(lifecycle.room(created.room.id).await.unwrap().members.len(), 2);
    }

    #[tokio::test]
    async fn leaving_frees_the_seat_and_keeps_the_room_active() {
        let (lifecycle, _) = lifecycle();
        let created = lifecycle.create_room(request("lectura")).await.unwrap();
        lifecycle
            .join_room(&created.pin, "user-2", "beto", "fp-b", "o")
            .await
            .unwrap();

        let room = lifecycle
            .leave_room(created.room.id, "fp-b", "o")
            .await
            .unwrap();
        assert!(room.members.is_empty());
        assert!(room.active);

        assert!(matches!(
            lifecycle.leave_room(created.room.id, "fp-b", "o").await,
            Err(EngineError::NotAMember)
        ));

        // The device can come back.
        lifecycle
            .join_room(&created.pin, "user-2", "beto", "fp-b", "o")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_the_creator_deletes() {
        let (lifecycle, persistence) = lifecycle();
        let created = lifecycle.create_room(request("lectura")).await.unwrap();

        assert!(matches!(
            lifecycle
                .delete_room(created.room.id, "someone-else", "o")
                .await,
            Err(EngineError::Forbidden)
        ));

        let deleted = lifecycle
            .delete_room(created.room.id, "creator-1", "o")
            .await
            .unwrap();
        assert!(!deleted.active);

        // Gone from memory, soft-deleted on disk.
        assert!(lifecycle.room(created.room.id).await.is_none());
        assert!(lifecycle.verify_pin(&created.pin).await.is_none());
        assert!(!persistence.rooms.lock().await[&created.room.id].active);
    }

    #[tokio::test]
    async fn sweep_retires_only_stale_empty_rooms() {
        let mut config = EngineConfig::default();
        config.room_retention = chrono::Duration::zero();
        let (lifecycle, _) = lifecycle_with(config);

        let idle = lifecycle.create_room(request("vacia")).await.unwrap();
        let busy = lifecycle.create_room(request("ocupada")).await.unwrap();
        lifecycle
            .join_room(&busy.pin, "user-2", "beto", "fp-b", "o")
            .await
            .unwrap();

        // Zero retention makes anything not updated this instant stale.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(lifecycle.sweep_idle_rooms().await.unwrap(), 1);
        assert!(lifecycle.room(idle.room.id).await.is_none());
        assert!(lifecycle.room(busy.room.id).await.is_some());
        assert_eq!(lifecycle.sweep_idle_rooms().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_persistence_leaves_memory_unchanged() {
        let (lifecycle, persistence) = lifecycle();

        persistence.fail_writes(true);
        assert!(lifecycle.create_room(request("lectura")).await.is_err());
        assert_eq!(lifecycle.room_count().await, 0);

        persistence.fail_writes(false);
        let created = lifecycle.create_room(request("lectura")).await.unwrap();

        persistence.fail_writes(true);
        assert!(lifecycle
            .join_room(&created.pin, "user-2", "beto", "fp-b", "o")
            .await
            .is_err());
        assert!(lifecycle
            .room(created.room.id)
            .await
            .unwrap()
            .members
            .is_empty());
    }
}

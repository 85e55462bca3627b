//! In-memory table of live rooms.
//!
//! Plain data guarded by the lifecycle lock; every method is synchronous
//! and cheap enough to call while holding it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use refugio_shared::crypto;
use refugio_shared::types::{Room, RoomId};

#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, Room>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    pub fn insert(&mut self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    pub fn remove(&mut self, id: &RoomId) -> Option<Room> {
        self.rooms.remove(id)
    }

    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn get_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    /// Linear scan of the active rooms, checking the candidate PIN against
    /// each salted hash. Deliberately not an index: the clear PIN exists
    /// nowhere to key one by.
    pub fn find_active_by_pin(&self, pin: &str) -> Option<&Room> {
        self.rooms
            .values()
            .filter(|room| room.active)
            .find(|room| match hex::decode(&room.pin_salt) {
                Ok(salt) => crypto::verify_pin(pin, &salt, &room.pin_hash),
                Err(_) => false,
            })
    }

    /// True when any active room already answers to this PIN.
    pub fn pin_in_use(&self, pin: &str) -> bool {
        self.find_active_by_pin(pin).is_some()
    }

    /// The active room currently holding this device, if any.
    pub fn device_room(&self, fingerprint: &str) -> Option<&Room> {
        self.rooms
            .values()
            .find(|room| room.active && room.has_device(fingerprint))
    }

    /// Ids of active, empty rooms whose last update is older than `cutoff`.
    pub fn sweep_candidates(&self, cutoff: DateTime<Utc>) -> Vec<RoomId> {
        self.rooms
            .values()
            .filter(|room| room.active && room.members.is_empty() && room.updated_at < cutoff)
            .map(|room| room.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

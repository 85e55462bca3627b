//! Persistence collaborator contract.
//!
//! The engine never talks to a database directly: every durable effect goes
//! through this narrow async trait. The engine persists candidate state
//! *before* committing it to memory, so a failing backend leaves the
//! in-memory world unchanged.

use async_trait::async_trait;
use thiserror::Error;

use refugio_shared::protocol::ChatMessage;
use refugio_shared::types::{FileId, FileRecord, Room, RoomId, ScanReport};

/// Error produced by a persistence backend.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct PersistError(pub String);

/// Durable storage operations the engine and server depend on.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Persist a room and its full member set atomically.
    async fn save_room(&self, room: &Room) -> Result<(), PersistError>;

    /// Persist an accepted chat message.
    async fn save_message(&self, message: &ChatMessage) -> Result<(), PersistError>;

    /// The newest `limit` non-deleted messages of a room, oldest first.
    async fn recent_messages(
        &self,
        room: RoomId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, PersistError>;

    /// Persist a freshly uploaded file record (analysis still pending).
    async fn save_file(&self, file: &FileRecord) -> Result<(), PersistError>;

    /// Attach an analysis outcome to a stored file.
    async fn update_file_analysis(
        &self,
        file: FileId,
        scan: &ScanReport,
    ) -> Result<(), PersistError>;

    /// Look up one file record.
    async fn file(&self, id: FileId) -> Result<Option<FileRecord>, PersistError>;

    /// The newest `limit` files of a room, most recent first.
    async fn room_files(&self, room: RoomId, limit: u32)
        -> Result<Vec<FileRecord>, PersistError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Mutex;

    use super::*;

    /// In-memory persistence double. `fail_writes` makes every write fail,
    /// for exercising the persist-before-commit ordering.
    #[derive(Default)]
    pub struct MemoryPersistence {
        pub rooms: Mutex<HashMap<RoomId, Room>>,
        pub messages: Mutex<Vec<ChatMessage>>,
        pub files: Mutex<HashMap<FileId, FileRecord>>,
        fail_writes: AtomicBool,
    }

    impl MemoryPersistence {
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn write_gate(&self) -> Result<(), PersistError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(PersistError("storage offline".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Persistence for MemoryPersistence {
        async fn save_room(&self, room: &Room) -> Result<(), PersistError> {
            self.write_gate()?;
            self.rooms.lock().await.insert(room.id, room.clone());
            Ok(())
        }

        async fn save_message(&self, message: &ChatMessage) -> Result<(), PersistError> {
            self.write_gate()?;
            self.messages.lock().await.push(message.clone());
            Ok(())
        }

        async fn recent_messages(
            &self,
            room: RoomId,
            limit: u32,
        ) -> Result<Vec<ChatMessage>, PersistError> {
            let messages = self.messages.lock().await;
            let mut of_room: Vec<ChatMessage> = messages
                .iter()
                .filter(|m| m.room_id == room)
                .cloned()
                .collect();
            let keep_from = of_room.len().saturating_sub(limit as usize);
            Ok(of_room.split_off(keep_from))
        }

        async fn save_file(&self, file: &FileRecord) -> Result<(), PersistError> {
            self.write_gate()?;
            self.files.lock().await.insert(file.id, file.clone());
            Ok(())
        }

        async fn update_file_analysis(
            &self,
            file: FileId,
            scan: &ScanReport,
        ) -> Result<(), PersistError> {
            self.write_gate()?;
            let mut files = self.files.lock().await;
            if let Some(record) = files.get_mut(&file) {
                record.scan = scan.clone();
            }
            Ok(())
        }

        async fn file(&self, id: FileId) -> Result<Option<FileRecord>, PersistError> {
            Ok(self.files.lock().await.get(&id).cloned())
        }

        async fn room_files(
            &self,
            room: RoomId,
            limit: u32,
        ) -> Result<Vec<FileRecord>, PersistError> {
            let files = self.files.lock().await;
            let mut of_room: Vec<FileRecord> = files
                .values()
                .filter(|f| f.room_id == room)
                .cloned()
                .collect();
            of_room.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
            of_room.truncate(limit as usize);
            Ok(of_room)
        }
    }
}

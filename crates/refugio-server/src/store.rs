//! SQLite-backed implementation of the engine's persistence contract.
//!
//! rusqlite connections are synchronous, so every call crosses onto the
//! blocking pool with the connection behind a mutex. Critical sections are
//! one statement or one small transaction; the engine's write lock already
//! serializes the hot paths above this layer.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use refugio_engine::{PersistError, Persistence};
use refugio_shared::protocol::ChatMessage;
use refugio_shared::types::{FileId, FileRecord, Room, RoomId, ScanReport};
use refugio_store::{Database, StoreError};

#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

fn persist_err(e: StoreError) -> PersistError {
    PersistError(e.to_string())
}

impl SqliteStore {
    /// Open the database at `path`, or at the platform data directory when
    /// no path is given.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        let db = match path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Soft-deactivate every room left active by a previous process. Their
    /// ephemeral keys died with that process, so the rooms are unusable.
    pub async fn deactivate_stale_rooms(&self) -> Result<usize, PersistError> {
        self.with_db(|db| db.deactivate_all_rooms()).await
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, PersistError>
    where
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut db).map_err(persist_err)
        })
        .await
        .map_err(|e| PersistError(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn save_room(&self, room: &Room) -> Result<(), PersistError> {
        let room = room.clone();
        self.with_db(move |db| db.save_room(&room)).await
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<(), PersistError> {
        let message = message.clone();
        self.with_db(move |db| db.insert_message(&message)).await
    }

    async fn recent_messages(
        &self,
        room: RoomId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, PersistError> {
        self.with_db(move |db| db.recent_messages(room, limit)).await
    }

    async fn save_file(&self, file: &FileRecord) -> Result<(), PersistError> {
        let file = file.clone();
        self.with_db(move |db| db.insert_file(&file)).await
    }

    async fn update_file_analysis(
        &self,
        file: FileId,
        scan: &ScanReport,
    ) -> Result<(), PersistError> {
        let scan = scan.clone();
        self.with_db(move |db| {
            let found = db.update_file_scan(file, &scan)?;
            if !found {
                debug!(file = %file, "Analysis outcome for a record that no longer exists");
            }
            Ok(())
        })
        .await
    }

    async fn file(&self, id: FileId) -> Result<Option<FileRecord>, PersistError> {
        self.with_db(move |db| match db.get_file(id) {
            Ok(file) => Ok(Some(file)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn room_files(
        &self,
        room: RoomId,
        limit: u32,
    ) -> Result<Vec<FileRecord>, PersistError> {
        self.with_db(move |db| db.list_room_files(room, limit)).await
    }
}

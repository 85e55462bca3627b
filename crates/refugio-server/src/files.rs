//! Upload vault and the hand-off to the analysis worker.
//!
//! Uploads are stored under fresh uuid names; the original file name only
//! contributes a sanitized extension. Analysis runs off the request path,
//! and its outcome is attached to the stored record when it completes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use refugio_engine::audit::{events, AuditSink};
use refugio_engine::{FileScanner, Persistence};
use refugio_shared::types::{FileId, FileRecord};

use crate::error::ApiError;

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ApiError> {
    // Canonicalize base; target may not exist yet so normalize manually
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ApiError::BadRequest("Path traversal detected".to_string()));
            }
            _ => {} // RootDir, CurDir, Prefix — skip
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ApiError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

/// Keep a short alphanumeric extension from an upload name, lowercased.
/// Anything else is dropped and the file is stored bare.
fn sanitized_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[derive(Debug, Clone)]
pub struct FileVault {
    base_dir: PathBuf,
    max_size: usize,
}

impl FileVault {
    pub async fn new(base_dir: PathBuf, max_size: usize) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            ApiError::Storage(format!(
                "Failed to create upload directory '{}': {}",
                base_dir.display(),
                e
            ))
        })?;

        info!(path = %base_dir.display(), "Upload vault initialized");

        Ok(Self { base_dir, max_size })
    }

    /// Write upload bytes under a fresh uuid name and hand back the id with
    /// the stored name.
    pub async fn store(&self, file_name: &str, data: &[u8]) -> Result<(FileId, String), ApiError> {
        if data.is_empty() {
            return Err(ApiError::BadRequest("Empty upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ApiError::FileTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let stored_name = match sanitized_extension(file_name) {
            Some(ext) => format!("{id}.{ext}"),
            None => id.to_string(),
        };
        let path = self.safe_path(&stored_name)?;

        fs::write(&path, data).await.map_err(|e| {
            ApiError::Storage(format!("Failed to write upload {}: {}", id, e))
        })?;

        debug!(id = %id, size = data.len(), "Stored upload");
        Ok((id, stored_name))
    }

    pub async fn read(&self, stored_name: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.safe_path(stored_name)?;

        if !path.exists() {
            return Err(ApiError::NotFound(format!(
                "Stored file {stored_name} is gone"
            )));
        }

        fs::read(&path).await.map_err(|e| {
            ApiError::Storage(format!("Failed to read upload {}: {}", stored_name, e))
        })
    }

    fn safe_path(&self, stored_name: &str) -> Result<PathBuf, ApiError> {
        let raw = self.base_dir.join(stored_name);
        ensure_within(&self.base_dir, &raw)
    }
}

/// Run the scanner over upload bytes in a detached task. A completed report
/// is attached to the stored record; a crashed or timed-out worker leaves
/// the record unchecked, which readers tolerate.
pub fn spawn_analysis(
    scanner: FileScanner,
    persistence: Arc<dyn Persistence>,
    audit: Arc<dyn AuditSink>,
    record: FileRecord,
    data: Vec<u8>,
) {
    tokio::spawn(async move {
        let report = match scanner.scan(data, &record.file_name).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    file = %record.id,
                    error = %e,
                    "Analysis did not complete, record stays unchecked"
                );
                return;
            }
        };

        if !report.passed {
            warn!(
                file = %record.id,
                details = %report.details,
                "Upload flagged by content analysis"
            );
            audit.record(
                events::FILE_SUSPICIOUS,
                &record.uploader,
                "internal",
                serde_json::json!({
                    "file_id": record.id,
                    "room_id": record.room_id,
                    "details": report.details,
                }),
            );
        }

        if let Err(e) = persistence.update_file_analysis(record.id, &report).await {
            warn!(file = %record.id, error = %e, "Failed to persist analysis outcome");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use refugio_engine::TracingAudit;
    use refugio_shared::types::ScanReport;
    use tempfile::TempDir;

    use crate::store::SqliteStore;

    async fn test_vault() -> (FileVault, TempDir) {
        let dir = TempDir::new().unwrap();
        let vault = FileVault::new(dir.path().to_path_buf(), 1024)
            .await
            .unwrap();
        (vault, dir)
    }

    #[tokio::test]
    async fn store_and_read_back() {
        let (vault, _dir) = test_vault().await;

        let (id, stored_name) = vault.store("photo.PNG", b"fake-bytes").await.unwrap();
        assert_eq!(stored_name, format!("{id}.png"));

        let data = vault.read(&stored_name).await.unwrap();
        assert_eq!(data, b"fake-bytes");
    }

    #[tokio::test]
    async fn hostile_names_lose_their_extension() {
        let (vault, _dir) = test_vault().await;

        let (id, stored_name) = vault.store("../../etc/passwd", b"data").await.unwrap();
        // The "extension" here spans a path separator, so it is dropped and
        // the upload is stored under the bare uuid.
        assert_eq!(stored_name, id.to_string());
        assert!(!stored_name.contains(".."));
        assert!(!stored_name.contains('/'));
    }

    #[tokio::test]
    async fn read_rejects_traversal() {
        let (vault, _dir) = test_vault().await;
        assert!(matches!(
            vault.read("../outside").await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn size_and_emptiness_are_enforced() {
        let (vault, _dir) = test_vault().await;

        assert!(matches!(
            vault.store("a.png", b"").await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            vault.store("a.png", &[0u8; 2048]).await,
            Err(ApiError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn analysis_attaches_to_the_record() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(Some(&dir.path().join("db"))).unwrap());

        let room = refugio_shared::types::Room {
            id: Uuid::new_v4(),
            pin_hash: "hash".to_string(),
            pin_salt: "00".repeat(16),
            name: "sala".to_string(),
            kind: refugio_shared::types::RoomKind::Multimedia,
            capacity: 5,
            creator: "user-1".to_string(),
            creator_nickname: "ana".to_string(),
            ephemeral_key: String::new(),
            members: Vec::new(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.save_room(&room).await.unwrap();

        let record = FileRecord {
            id: Uuid::new_v4(),
            room_id: room.id,
            uploader: "user-1".to_string(),
            nickname: "ana".to_string(),
            file_name: "noise.bin".to_string(),
            stored_name: "noise.bin".to_string(),
            mime: "application/pdf".to_string(),
            size: 256,
            digest: "digest".to_string(),
            uploaded_at: Utc::now(),
            scan: ScanReport::default(),
        };
        store.save_file(&record).await.unwrap();

        // A full byte spread saturates the entropy measure, so this flags.
        let noisy: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let scanner = FileScanner::new(7.5, Duration::from_secs(5));
        spawn_analysis(
            scanner,
            store.clone(),
            Arc::new(TracingAudit),
            record.clone(),
            noisy,
        );

        // The detached task owns completion; poll for its result.
        let mut checked = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let stored = store.file(record.id).await.unwrap().unwrap();
            if stored.scan.checked {
                assert!(!stored.scan.passed);
                assert!(stored.scan.details.contains("entropy"));
                checked = true;
                break;
            }
        }
        assert!(checked, "analysis never landed");
    }
}

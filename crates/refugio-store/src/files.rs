//! CRUD operations for uploaded-file records.

use rusqlite::params;

use refugio_shared::types::{FileId, FileRecord, RoomId, ScanReport};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rooms::{parse_timestamp, parse_uuid};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new file record, analysis state included.
    pub fn insert_file(&self, file: &FileRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO files (id, room_id, uploader, nickname, file_name, stored_name,
                                mime, size, digest, uploaded_at,
                                scan_checked, scan_passed, scan_entropy, scan_details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                file.id.to_string(),
                file.room_id.to_string(),
                file.uploader,
                file.nickname,
                file.file_name,
                file.stored_name,
                file.mime,
                file.size as i64,
                file.digest,
                file.uploaded_at.to_rfc3339(),
                file.scan.checked as i64,
                file.scan.passed as i64,
                file.scan.entropy,
                file.scan.details,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single file record by UUID.
    pub fn get_file(&self, id: FileId) -> Result<FileRecord> {
        self.conn()
            .query_row(
                "SELECT id, room_id, uploader, nickname, file_name, stored_name,
                        mime, size, digest, uploaded_at,
                        scan_checked, scan_passed, scan_entropy, scan_details
                 FROM files
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_file,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The newest `limit` files of a room, most recent first.
    pub fn list_room_files(&self, room_id: RoomId, limit: u32) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, room_id, uploader, nickname, file_name, stored_name,
                    mime, size, digest, uploaded_at,
                    scan_checked, scan_passed, scan_entropy, scan_details
             FROM files
             WHERE room_id = ?1
             ORDER BY uploaded_at DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![room_id.to_string(), limit], row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Attach an analysis outcome to a file. Returns `true` if a row was
    /// updated.
    pub fn update_file_scan(&self, id: FileId, scan: &ScanReport) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE files
             SET scan_checked = ?2, scan_passed = ?3, scan_entropy = ?4, scan_details = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                scan.checked as i64,
                scan.passed as i64,
                scan.entropy,
                scan.details,
            ],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`FileRecord`].
fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let id_str: String = row.get(0)?;
    let room_str: String = row.get(1)?;
    let uploader: String = row.get(2)?;
    let nickname: String = row.get(3)?;
    let file_name: String = row.get(4)?;
    let stored_name: String = row.get(5)?;
    let mime: String = row.get(6)?;
    let size: i64 = row.get(7)?;
    let digest: String = row.get(8)?;
    let uploaded_str: String = row.get(9)?;
    let scan_checked: bool = row.get(10)?;
    let scan_passed: bool = row.get(11)?;
    let scan_entropy: f64 = row.get(12)?;
    let scan_details: String = row.get(13)?;

    Ok(FileRecord {
        id: parse_uuid(&id_str, 0)?,
        room_id: parse_uuid(&room_str, 1)?,
        uploader,
        nickname,
        file_name,
        stored_name,
        mime,
        size: size as u64,
        digest,
        uploaded_at: parse_timestamp(&uploaded_str, 9)?,
        scan: ScanReport {
            checked: scan_checked,
            passed: scan_passed,
            entropy: scan_entropy,
            details: scan_details,
        },
    })
}

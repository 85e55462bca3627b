use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use refugio_engine::audit::{events, AuditSink};
use refugio_engine::{ChatEngine, CreateRoom, FileScanner, Persistence, RoomLifecycle};
use refugio_shared::protocol::{ChatMessage, MemberInfo};
use refugio_shared::sanitize;
use refugio_shared::types::{FileRecord, Room, RoomKind, ScanReport};

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::files::{spawn_analysis, FileVault};
use crate::ws;

/// Most recent file records returned per room listing.
const FILE_LIST_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub lifecycle: Arc<RoomLifecycle>,
    pub persistence: Arc<dyn Persistence>,
    pub vault: Arc<FileVault>,
    pub scanner: FileScanner,
    pub verifier: Arc<TokenVerifier>,
    pub audit: Arc<dyn AuditSink>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    // Multipart encoding overhead rides on top of the raw file cap.
    let body_limit = state.config.max_file_size + 1024 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/verify-pin", post(verify_pin))
        .route("/api/rooms/:id", get(room_details))
        .route("/api/rooms/:id", delete(delete_room))
        .route("/api/rooms/:id/messages", get(room_messages))
        .route("/api/rooms/:id/files", get(room_files))
        .route("/api/files/upload", post(upload_file))
        .route("/api/files/:id", get(download_file))
        .route("/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct CreateRoomRequest {
    name: String,
    /// "text" (default) or "multimedia".
    #[serde(default)]
    kind: Option<String>,
    capacity: usize,
    nickname: String,
    #[serde(default)]
    custom_pin: Option<String>,
}

#[derive(Serialize)]
struct CreateRoomResponse {
    room: RoomDetails,
    /// The clear PIN. Shown here once; only its salted hash survives.
    pin: String,
}

/// Public room view. No PIN material and no ephemeral key; those travel
/// only inside the socket join reply.
#[derive(Serialize)]
struct RoomDetails {
    id: Uuid,
    name: String,
    kind: RoomKind,
    capacity: usize,
    members: Vec<MemberInfo>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl RoomDetails {
    fn from_room(room: &Room) -> Self {
        Self {
            id: room.id,
            name: room.name.clone(),
            kind: room.kind,
            capacity: room.capacity,
            members: room.members.iter().map(MemberInfo::from).collect(),
            active: room.active,
            created_at: room.created_at,
        }
    }
}

#[derive(Deserialize)]
struct VerifyPinRequest {
    pin: String,
}

#[derive(Serialize)]
struct VerifyPinResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<RoomDetails>,
}

/// Stored-file view for listings and upload replies.
#[derive(Serialize)]
struct FileInfo {
    id: Uuid,
    room_id: Uuid,
    nickname: String,
    file_name: String,
    mime: String,
    size: u64,
    digest: String,
    uploaded_at: DateTime<Utc>,
    scan: ScanReport,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            room_id: record.room_id,
            nickname: record.nickname.clone(),
            file_name: record.file_name.clone(),
            mime: record.mime.clone(),
            size: record.size,
            digest: record.digest.clone(),
            uploaded_at: record.uploaded_at,
            scan: record.scan.clone(),
        }
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let principal = state.verifier.authorize(&headers)?;

    let kind = match req.kind.as_deref() {
        None | Some("") => RoomKind::Text,
        Some(raw) => RoomKind::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown room kind: {raw}")))?,
    };

    let created = state
        .lifecycle
        .create_room(CreateRoom {
            name: req.name,
            kind,
            capacity: req.capacity,
            creator: principal.identity,
            creator_nickname: req.nickname,
            origin: addr.ip().to_string(),
            custom_pin: req.custom_pin,
        })
        .await?;

    Ok(Json(CreateRoomResponse {
        room: RoomDetails::from_room(&created.room),
        pin: created.pin,
    }))
}

/// PIN validity probe. Public: joining still requires the socket, and the
/// reply carries no key material.
async fn verify_pin(
    State(state): State<AppState>,
    Json(req): Json<VerifyPinRequest>,
) -> Json<VerifyPinResponse> {
    match state.lifecycle.verify_pin(&req.pin).await {
        Some(room) => Json(VerifyPinResponse {
            valid: true,
            room: Some(RoomDetails::from_room(&room)),
        }),
        None => Json(VerifyPinResponse {
            valid: false,
            room: None,
        }),
    }
}

async fn room_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomDetails>, ApiError> {
    let room = state
        .lifecycle
        .room(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Room {id} not found")))?;
    Ok(Json(RoomDetails::from_room(&room)))
}

async fn room_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    if state.lifecycle.room(id).await.is_none() {
        return Err(ApiError::NotFound(format!("Room {id} not found")));
    }

    let window = state.engine.config().history_window;
    let messages = state
        .persistence
        .recent_messages(id, window)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    Ok(Json(messages))
}

async fn delete_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let principal = state.verifier.authorize(&headers)?;

    state
        .engine
        .delete_room_as(&principal.identity, &addr.ip().to_string(), id)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn room_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FileInfo>>, ApiError> {
    if state.lifecycle.room(id).await.is_none() {
        return Err(ApiError::NotFound(format!("Room {id} not found")));
    }

    let files = state
        .persistence
        .room_files(id, FILE_LIST_LIMIT)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    Ok(Json(files.iter().map(FileInfo::from).collect()))
}

async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Result<Json<FileInfo>, ApiError> {
    let principal = state.verifier.authorize(&headers)?;

    let mut file_name: Option<String> = None;
    let mut mime: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;
    let mut room_id: Option<Uuid> = None;
    let mut nickname: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                mime = field.content_type().map(|s| s.to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read field: {}", e))
                })?;
                data = Some(bytes.to_vec());
            }
            "room_id" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read field: {}", e))
                })?;
                room_id = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ApiError::BadRequest("Invalid room_id".to_string()))?,
                );
            }
            "nickname" => {
                nickname = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read field: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let data = data.ok_or_else(|| {
        ApiError::BadRequest("Missing 'file' field in multipart form".to_string())
    })?;
    let room_id = room_id
        .ok_or_else(|| ApiError::BadRequest("Missing 'room_id' field".to_string()))?;
    let file_name = file_name.unwrap_or_else(|| "unnamed".to_string());
    let mime = mime
        .unwrap_or_else(|| "application/octet-stream".to_string())
        .to_ascii_lowercase();
    let nickname = match nickname {
        Some(n) => sanitize::sanitize_nickname(&n),
        None => principal.display_name.clone(),
    };

    let room = state
        .lifecycle
        .room(room_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Room {room_id} not found")))?;
    if room.kind != RoomKind::Multimedia {
        return Err(ApiError::BadRequest(
            "Room does not accept file uploads".to_string(),
        ));
    }
    if !state.config.allowed_file_types.iter().any(|t| t == &mime) {
        return Err(ApiError::UnsupportedType(mime));
    }

    let (id, stored_name) = state.vault.store(&file_name, &data).await?;
    let record = FileRecord {
        id,
        room_id,
        uploader: principal.identity.clone(),
        nickname,
        file_name: file_name.clone(),
        stored_name,
        mime,
        size: data.len() as u64,
        digest: blake3::hash(&data).to_hex().to_string(),
        uploaded_at: Utc::now(),
        scan: ScanReport::default(),
    };
    state
        .persistence
        .save_file(&record)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;

    info!(id = %record.id, room = %room_id, size = record.size, "File uploaded");
    state.audit.record(
        events::FILE_UPLOADED,
        &record.uploader,
        &addr.ip().to_string(),
        serde_json::json!({
            "file_id": record.id,
            "room_id": room_id,
            "mime": record.mime,
            "size": record.size,
        }),
    );

    // Analysis runs off the request path; the record stays unchecked until
    // it completes.
    if state.config.scan_enabled {
        spawn_analysis(
            state.scanner.clone(),
            state.persistence.clone(),
            state.audit.clone(),
            record.clone(),
            data,
        );
    }

    Ok(Json(FileInfo::from(&record)))
}

async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .persistence
        .file(id)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("File {id} not found")))?;

    // Only a completed failing scan blocks the download. Unchecked files
    // flow; the analyzer may still be working or may never have run.
    if state.config.scan_enabled && record.scan.checked && !record.scan.passed {
        return Err(ApiError::FileBlocked {
            details: record.scan.details,
        });
    }

    let data = state.vault.read(&record.stored_name).await?;

    let headers = [
        (header::CONTENT_TYPE, record.mime.clone()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                record.file_name.replace('"', "")
            ),
        ),
    ];
    Ok((headers, data))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

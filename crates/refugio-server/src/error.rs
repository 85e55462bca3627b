use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use refugio_engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File blocked by content analysis")]
    FileBlocked { details: String },

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Missing or invalid access token")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// HTTP status for each engine outcome. Validation problems are the
/// caller's fault, conflicts describe a room state the request lost
/// against, and missing rooms and bad PINs look identical on purpose.
fn engine_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::InvalidName
        | EngineError::InvalidCapacity
        | EngineError::InvalidNickname
        | EngineError::InvalidPinFormat
        | EngineError::EmptyMessage => StatusCode::BAD_REQUEST,
        EngineError::PinExhausted
        | EngineError::RoomFull
        | EngineError::AlreadyMember
        | EngineError::DeviceElsewhere
        | EngineError::NotAMember
        | EngineError::NotInRoom
        | EngineError::RoomInactive => StatusCode::CONFLICT,
        EngineError::InvalidPin | EngineError::RoomNotFound => StatusCode::NOT_FOUND,
        EngineError::Forbidden => StatusCode::FORBIDDEN,
        EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::FileBlocked { .. } => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApiError::UnsupportedType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Engine(e) => {
                let status = engine_status(e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    (status, "Internal server error".to_string())
                } else {
                    (status, e.to_string())
                }
            }
            ApiError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = match &self {
            ApiError::FileBlocked { details } => serde_json::json!({
                "error": message,
                "details": details,
            }),
            _ => serde_json::json!({ "error": message }),
        };

        (status, axum::Json(body)).into_response()
    }
}

use thiserror::Error;

use crate::persist::PersistError;

/// Errors surfaced by room lifecycle and session operations.
///
/// Messages double as the user-facing text of scoped `error` events, so
/// they name the problem without leaking internals.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid room name")]
    InvalidName,

    #[error("Invalid room capacity")]
    InvalidCapacity,

    #[error("Invalid nickname")]
    InvalidNickname,

    #[error("PIN must be exactly six digits")]
    InvalidPinFormat,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Could not allocate a unique PIN")]
    PinExhausted,

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Room is full")]
    RoomFull,

    #[error("Already a member of this room")]
    AlreadyMember,

    #[error("This device is already in another room")]
    DeviceElsewhere,

    #[error("Not a member of this room")]
    NotAMember,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is no longer active")]
    RoomInactive,

    #[error("Only the creator may delete a room")]
    Forbidden,

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistError),
}

/// Errors from the analysis worker boundary.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Analysis worker crashed")]
    WorkerCrashed,

    #[error("Analysis timed out after {0:?}")]
    Timeout(std::time::Duration),
}

//! Protocol-wide constants.

/// Application name
pub const APP_NAME: &str = "Refugio";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Room PIN length in digits
pub const PIN_LENGTH: usize = 6;

/// Size of the per-room PIN salt in bytes
pub const PIN_SALT_SIZE: usize = 16;

/// Minimum room name length (after trimming)
pub const ROOM_NAME_MIN: usize = 3;

/// Maximum room name length (after trimming)
pub const ROOM_NAME_MAX: usize = 50;

/// Minimum room capacity
pub const ROOM_CAPACITY_MIN: usize = 2;

/// Maximum room capacity
pub const ROOM_CAPACITY_MAX: usize = 50;

/// Minimum nickname length (after sanitization)
pub const NICKNAME_MIN: usize = 3;

/// Maximum nickname length (after sanitization)
pub const NICKNAME_MAX: usize = 20;

/// Maximum chat message length in characters (after sanitization)
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Number of history messages handed to a joining member
pub const HISTORY_WINDOW: u32 = 50;

/// Maximum attempts to draw a non-colliding room PIN
pub const MAX_PIN_ATTEMPTS: u32 = 100;

/// Default Shannon entropy threshold for the file analyzer (bits per byte)
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 7.5;

/// Default idle window after which empty rooms are retired, in hours
pub const DEFAULT_ROOM_RETENTION_HOURS: i64 = 24;

/// Default HTTP listen port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// BLAKE3 key derivation context for PIN hashing
pub const KDF_CONTEXT_PIN_HASH: &str = "refugio-pin-hash-v1";

/// BLAKE3 key derivation context for message digests
pub const KDF_CONTEXT_MESSAGE_DIGEST: &str = "refugio-message-digest-v1";

/// BLAKE3 key derivation context for device fingerprints
pub const KDF_CONTEXT_DEVICE_FINGERPRINT: &str = "refugio-device-fingerprint-v1";

//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use refugio_engine::EngineConfig;
use refugio_shared::constants;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file. Unset means the platform data directory.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Filesystem path where uploaded files are stored.
    /// Env: `UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// Maximum upload size in bytes (10 MiB).
    /// Env: `MAX_FILE_SIZE`
    pub max_file_size: usize,

    /// Mime types accepted for upload.
    /// Env: `ALLOWED_FILE_TYPES` (comma-separated)
    pub allowed_file_types: Vec<String>,

    /// Ed25519 public key of the identity issuer (hex-encoded, 64 chars).
    /// Env: `TOKEN_ISSUER_PUBKEY`
    /// Default: all-zeros (development only).
    pub token_issuer_pubkey: [u8; 32],

    /// Whether uploads are analyzed for hidden content.
    /// Env: `SCAN_ENABLED` (true/false)
    /// Default: `true`
    pub scan_enabled: bool,

    /// Shannon entropy threshold above which an upload is flagged.
    /// Env: `ENTROPY_THRESHOLD`
    pub entropy_threshold: f64,

    /// Per-file analysis deadline in seconds.
    /// Env: `SCAN_TIMEOUT_SECS`
    /// Default: `30`
    pub scan_timeout_secs: u64,

    /// Hours an empty room survives before the sweep retires it.
    /// Env: `ROOM_RETENTION_HOURS`
    /// Default: `24`
    pub room_retention_hours: i64,

    /// Interval between idle-room sweeps, in seconds.
    /// Env: `SWEEP_INTERVAL_SECS`
    /// Default: `3600`
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], constants::DEFAULT_HTTP_PORT).into(),
            database_path: None,
            upload_dir: PathBuf::from("./uploads"),
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            allowed_file_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "application/pdf".to_string(),
            ],
            token_issuer_pubkey: [0u8; 32],
            scan_enabled: true,
            entropy_threshold: constants::DEFAULT_ENTROPY_THRESHOLD,
            scan_timeout_secs: 30,
            room_retention_hours: constants::DEFAULT_ROOM_RETENTION_HOURS,
            sweep_interval_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(path) = std::env::var("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("MAX_FILE_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_file_size = n;
            } else {
                tracing::warn!(value = %val, "Invalid MAX_FILE_SIZE, using default");
            }
        }

        if let Ok(list) = std::env::var("ALLOWED_FILE_TYPES") {
            let types: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !types.is_empty() {
                config.allowed_file_types = types;
            }
        }

        if let Ok(hex_key) = std::env::var("TOKEN_ISSUER_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.token_issuer_pubkey = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid TOKEN_ISSUER_PUBKEY, using default (dev-only)"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SCAN_ENABLED") {
            config.scan_enabled = val != "false" && val != "0";
        }

        if let Ok(val) = std::env::var("ENTROPY_THRESHOLD") {
            if let Ok(t) = val.parse::<f64>() {
                config.entropy_threshold = t;
            } else {
                tracing::warn!(value = %val, "Invalid ENTROPY_THRESHOLD, using default");
            }
        }

        if let Ok(val) = std::env::var("SCAN_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.scan_timeout_secs = n;
            }
        }

        if let Ok(val) = std::env::var("ROOM_RETENTION_HOURS") {
            if let Ok(n) = val.parse::<i64>() {
                config.room_retention_hours = n;
            }
        }

        if let Ok(val) = std::env::var("SWEEP_INTERVAL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.sweep_interval_secs = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The engine's view of this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_pin_attempts: constants::MAX_PIN_ATTEMPTS,
            history_window: constants::HISTORY_WINDOW,
            entropy_threshold: self.entropy_threshold,
            scan_timeout: Duration::from_secs(self.scan_timeout_secs),
            room_retention: chrono::Duration::hours(self.room_retention_hours),
        }
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex.len()));
    }

    let mut bytes = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let hi = hex_digit(chunk[0])?;
        let lo = hex_digit(chunk[1])?;
        bytes[i] = (hi << 4) | lo;
    }
    Ok(bytes)
}

fn hex_digit(c: u8) -> Result<u8, String> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(format!("invalid hex digit: {}", c as char)),
    }
}

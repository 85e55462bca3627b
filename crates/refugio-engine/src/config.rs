//! Engine tuning knobs.

use std::time::Duration;

use refugio_shared::constants::{
    DEFAULT_ENTROPY_THRESHOLD, DEFAULT_ROOM_RETENTION_HOURS, HISTORY_WINDOW, MAX_PIN_ATTEMPTS,
};

/// Knobs for the room lifecycle, the session protocol, and the analysis
/// boundary. Servers build one from their environment; tests tweak fields
/// directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum attempts to draw a non-colliding PIN before creation fails.
    pub max_pin_attempts: u32,
    /// Number of history messages handed to a joining member.
    pub history_window: u32,
    /// Shannon entropy threshold for the file analyzer (bits per byte).
    pub entropy_threshold: f64,
    /// Hard cap on a single analysis run.
    pub scan_timeout: Duration,
    /// Idle window after which active, empty rooms are retired.
    pub room_retention: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pin_attempts: MAX_PIN_ATTEMPTS,
            history_window: HISTORY_WINDOW,
            entropy_threshold: DEFAULT_ENTROPY_THRESHOLD,
            scan_timeout: Duration::from_secs(30),
            room_retention: chrono::Duration::hours(DEFAULT_ROOM_RETENTION_HOURS),
        }
    }
}

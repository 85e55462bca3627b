//! # refugio-server
//!
//! Backend for PIN-protected ephemeral chat rooms.
//!
//! This binary provides:
//! - **Room lifecycle** (PIN issuance, capacity limits, one-room-per-device,
//!   creator-only teardown) with a periodic idle-room sweep
//! - **Real-time WebSocket protocol** fanning out join/leave/typing/message
//!   events to room members
//! - **REST API** (axum) for room creation, PIN probes, message history, and
//!   file transfer
//! - **Content analysis** of uploads (entropy, metadata, embedded-container
//!   heuristics) on isolated worker threads

mod api;
mod auth;
mod config;
mod error;
mod files;
mod store;
mod ws;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use refugio_engine::{
    AuditSink, ChatEngine, FileScanner, Persistence, RoomHub, RoomLifecycle, TracingAudit,
};

use crate::api::AppState;
use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::files::FileVault;
use crate::store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,refugio_server=debug")),
        )
        .init();

    info!("Starting refugio server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    let store = SqliteStore::open(config.database_path.as_deref())?;

    // Rooms left active by a previous process are unusable: their ephemeral
    // keys died with it.
    let stale = store.deactivate_stale_rooms().await?;
    if stale > 0 {
        info!(stale, "Deactivated rooms left over from a previous run");
    }

    let persistence: Arc<dyn Persistence> = Arc::new(store);
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAudit);

    let engine_config = config.engine_config();
    let lifecycle = Arc::new(RoomLifecycle::new(
        engine_config.clone(),
        persistence.clone(),
        audit.clone(),
    ));
    let hub = Arc::new(RoomHub::new());
    let engine = Arc::new(ChatEngine::new(
        engine_config.clone(),
        lifecycle.clone(),
        hub,
        persistence.clone(),
        audit.clone(),
    ));

    let vault = Arc::new(
        FileVault::new(config.upload_dir.clone(), config.max_file_size)
            .await
            .map_err(|e| anyhow::anyhow!("failed to initialize upload vault: {e}"))?,
    );
    let scanner = FileScanner::new(engine_config.entropy_threshold, engine_config.scan_timeout);
    let verifier = Arc::new(TokenVerifier::new(config.token_issuer_pubkey));

    let app_state = AppState {
        engine,
        lifecycle: lifecycle.clone(),
        persistence,
        vault,
        scanner,
        verifier,
        audit,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic idle-room sweep.
    let sweep_lifecycle = lifecycle.clone();
    let sweep_interval = config.sweep_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval));
        loop {
            interval.tick().await;
            match sweep_lifecycle.sweep_idle_rooms().await {
                Ok(0) => {}
                Ok(swept) => info!(swept, "Idle-room sweep finished"),
                Err(e) => tracing::warn!(error = %e, "Idle-room sweep failed"),
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

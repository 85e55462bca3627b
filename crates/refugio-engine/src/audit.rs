//! Audit event sink.
//!
//! Security-relevant actions are reported through [`AuditSink`]. Delivery
//! is fire-and-forget: a sink must never block its caller or turn a logging
//! problem into an operation failure.

use serde_json::Value;

/// Names of audited actions.
pub mod events {
    pub const ROOM_CREATED: &str = "ROOM_CREATED";
    pub const ROOM_JOINED: &str = "ROOM_JOINED";
    pub const ROOM_LEFT: &str = "ROOM_LEFT";
    pub const ROOM_DELETED: &str = "ROOM_DELETED";
    pub const ROOMS_SWEPT: &str = "ROOMS_SWEPT";
    pub const SOCKET_JOIN_ROOM: &str = "SOCKET_JOIN_ROOM";
    pub const SOCKET_LEAVE_ROOM: &str = "SOCKET_LEAVE_ROOM";
    pub const SOCKET_DELETE_ROOM: &str = "SOCKET_DELETE_ROOM";
    pub const SOCKET_DISCONNECT: &str = "SOCKET_DISCONNECT";
    pub const MESSAGE_SENT: &str = "MESSAGE_SENT";
    pub const FILE_UPLOADED: &str = "FILE_UPLOADED";
    pub const FILE_SUSPICIOUS: &str = "FILE_SUSPICIOUS";
}

/// Receiver for audit events.
pub trait AuditSink: Send + Sync + 'static {
    /// Record one event. `identity` is the acting principal (or `system`),
    /// `origin` its network origin (or `internal`).
    fn record(&self, event: &str, identity: &str, origin: &str, metadata: Value);
}

/// Default sink: structured `tracing` events under the `audit` target, so
/// operators can route them to a separate layer or file.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: &str, identity: &str, origin: &str, metadata: Value) {
        tracing::info!(
            target: "audit",
            event,
            identity,
            origin,
            metadata = %metadata,
            "audit event"
        );
    }
}

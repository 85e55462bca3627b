// Room lifecycle, session protocol, broadcast fan-out, and file analysis.

pub mod audit;
pub mod config;
pub mod hub;
pub mod lifecycle;
pub mod persist;
pub mod registry;
pub mod scanner;
pub mod session;

mod error;

pub use audit::{AuditSink, TracingAudit};
pub use config::EngineConfig;
pub use error::{EngineError, ScanError};
pub use hub::{RoomHub, SessionId};
pub use lifecycle::{CreateRoom, CreatedRoom, RoomLifecycle};
pub use persist::{PersistError, Persistence};
pub use scanner::FileScanner;
pub use session::{ChatEngine, Session, SessionState};

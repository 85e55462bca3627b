//! # refugio-store
//!
//! SQLite persistence for refugio: rooms and their membership, chat
//! messages, and uploaded-file records with their analysis outcomes.
//!
//! The store is synchronous. Async callers wrap [`Database`] behind their
//! own executor boundary.

pub mod database;
pub mod files;
pub mod messages;
pub mod migrations;
pub mod rooms;

mod error;

pub use database::Database;
pub use error::StoreError;

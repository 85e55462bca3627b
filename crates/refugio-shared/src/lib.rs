//! # refugio-shared
//!
//! Domain types, the socket wire protocol, crypto helpers, input
//! sanitization, access tokens, and the hidden-data analyzer shared by the
//! refugio crates.

pub mod constants;
pub mod crypto;
pub mod protocol;
pub mod sanitize;
pub mod stego;
pub mod token;
pub mod types;

mod error;

pub use error::{CryptoError, TokenError};

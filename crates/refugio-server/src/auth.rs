//! Access-token checks at the HTTP boundary.
//!
//! Tokens are issued elsewhere (whatever provisions identities); this
//! server only holds the issuer's Ed25519 public key and verifies the
//! signature on each presented token.

use axum::http::HeaderMap;
use tracing::debug;

use refugio_shared::token;
use refugio_shared::types::Principal;

use crate::error::ApiError;

/// Verifies issuer-signed access tokens presented by clients.
#[derive(Clone)]
pub struct TokenVerifier {
    issuer_pubkey: [u8; 32],
}

impl TokenVerifier {
    pub fn new(issuer_pubkey: [u8; 32]) -> Self {
        Self { issuer_pubkey }
    }

    /// Verify an encoded token and hand back the principal it vouches for.
    pub fn verify(&self, encoded: &str) -> Result<Principal, ApiError> {
        token::verify_token(encoded, &self.issuer_pubkey).map_err(|e| {
            debug!(error = %e, "Access token rejected");
            ApiError::Unauthorized
        })
    }

    /// Authorize a request from its `Authorization: Bearer` header.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let encoded = auth.strip_prefix("Bearer ").unwrap_or(auth);
        if encoded.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        self.verify(encoded)
    }
}

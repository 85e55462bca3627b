//! Signed access tokens.
//!
//! A token is a bincode-serialized claims block plus a detached Ed25519
//! signature over those claims, transported as URL-safe base64. The backend
//! only ever needs the issuer's public key; issuance lives with whatever
//! provisions identities.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::types::{Principal, Role};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub identity: String,
    pub display_name: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A claims block with its detached signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub claims: AccessClaims,
    pub signature: Vec<u8>,
}

/// Sign claims and encode the result for transport.
pub fn issue_token(claims: &AccessClaims, issuer_key: &SigningKey) -> Result<String, TokenError> {
    let payload = bincode::serialize(claims).map_err(|_| TokenError::Malformed)?;
    let signature = issuer_key.sign(&payload);

    let token = AccessToken {
        claims: claims.clone(),
        signature: signature.to_bytes().to_vec(),
    };
    let bytes = bincode::serialize(&token).map_err(|_| TokenError::Malformed)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode and verify a token, returning the principal it vouches for.
///
/// Expiry is checked before the signature, so an expired token reports
/// [`TokenError::Expired`] even when the signature is also wrong.
pub fn verify_token(encoded: &str, issuer_pubkey: &[u8; 32]) -> Result<Principal, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| TokenError::Malformed)?;
    let token: AccessToken =
        bincode::deserialize(&bytes).map_err(|_| TokenError::Malformed)?;

    if Utc::now() > token.claims.expires_at {
        return Err(TokenError::Expired);
    }

    let verifying_key =
        VerifyingKey::from_bytes(issuer_pubkey).map_err(|_| TokenError::BadSignature)?;
    let payload = bincode::serialize(&token.claims).map_err(|_| TokenError::Malformed)?;
    let signature =
        Signature::from_slice(&token.signature).map_err(|_| TokenError::BadSignature)?;
    verifying_key
        .verify(&payload, &signature)
        .map_err(|_| TokenError::BadSignature)?;

    Ok(Principal {
        identity: token.claims.identity,
        display_name: token.claims.display_name,
        role: token.claims.role,
    })
}

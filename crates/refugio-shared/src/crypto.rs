//! Cryptographic primitives: room-key encryption, PIN hashing, message
//! digests, and device fingerprints.
//!
//! Symmetric encryption uses XChaCha20-Poly1305 with a random 24-byte nonce
//! prepended to the ciphertext. Hashing and key derivation use BLAKE3 in
//! derive-key mode with per-purpose context strings.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use subtle::ConstantTimeEq;

use crate::constants::{
    KDF_CONTEXT_DEVICE_FINGERPRINT, KDF_CONTEXT_MESSAGE_DIGEST, KDF_CONTEXT_PIN_HASH, NONCE_SIZE,
    PIN_SALT_SIZE, SYMMETRIC_KEY_SIZE,
};
use crate::error::CryptoError;

/// A 256-bit symmetric key.
pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// Generate a random symmetric key for a room.
pub fn generate_room_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random nonce for XChaCha20-Poly1305.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt plaintext under a room key.
///
/// Returns `nonce || ciphertext` so the payload is self-contained.
pub fn encrypt_message(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a `nonce || ciphertext` payload produced by [`encrypt_message`].
pub fn decrypt_message(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() <= NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
    let nonce = XNonce::from_slice(&data[..NONCE_SIZE]);

    cipher
        .decrypt(nonce, &data[NONCE_SIZE..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Hex-encode a symmetric key for transport inside a join reply.
pub fn encode_key(key: &SymmetricKey) -> String {
    hex::encode(key)
}

/// Decode a hex key produced by [`encode_key`].
pub fn decode_key(hex_key: &str) -> Result<SymmetricKey, CryptoError> {
    let bytes = hex::decode(hex_key).map_err(|_| CryptoError::InvalidKeyLength)?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)
}

/// Draw a random six-digit room PIN.
pub fn generate_pin() -> String {
    let n: u32 = OsRng.gen_range(100_000..1_000_000);
    n.to_string()
}

/// Generate a random salt for PIN hashing.
pub fn generate_pin_salt() -> [u8; PIN_SALT_SIZE] {
    let mut salt = [0u8; PIN_SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Salted BLAKE3 hash of a PIN (hex). The salt keeps equal PINs from
/// hashing alike across rooms.
pub fn hash_pin(pin: &str, salt: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PIN_HASH);
    hasher.update(salt);
    hasher.update(pin.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Constant-time check of a candidate PIN against a stored salted hash.
pub fn verify_pin(pin: &str, salt: &[u8], stored_hash: &str) -> bool {
    let candidate = hash_pin(pin, salt);
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Integrity digest for a chat message (hex).
pub fn message_digest(sender: &str, content: &str, timestamp_millis: i64) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_MESSAGE_DIGEST);
    hasher.update(sender.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp_millis.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Deterministic device fingerprint from the network origin and the
/// client's self-reported signature (hex).
pub fn device_fingerprint(origin: &str, client_signature: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_DEVICE_FINGERPRINT);
    hasher.update(origin.as_bytes());
    hasher.update(b"-");
    hasher.update(client_signature.as_bytes());
    hasher.finalize().to_hex().to_string()
}

//! AuthVerifier (C4): client identity and signed-request verification.
//!
//! Identity is the raw Ed25519 public key, full stop — no derived client ID,
//! no mnemonic import. Verification uses `ed25519-dalek`'s `Verifier` trait
//! directly against the canonical payload bytes from [`crate::envelope::canonicalize`].

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::Value;
use thiserror::Error;

use crate::envelope::{canonicalize, resolve_wire_payload};
use crate::error::HubError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed public key")]
    MissingKey,
    #[error("invalid public key encoding: {0}")]
    BadKeyEncoding(String),
    #[error("invalid signature encoding: {0}")]
    BadSignatureEncoding(String),
    #[error("signature verification failed")]
    BadSignature,
}

impl From<AuthError> for HubError {
    fn from(e: AuthError) -> Self {
        HubError::Auth(e.to_string())
    }
}

/// Decode a base64 or hex Ed25519 public key into bytes.
pub fn decode_public_key(raw: &str) -> Result<VerifyingKey, AuthError> {
    let bytes = decode_key_bytes(raw)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::BadKeyEncoding("expected 32 bytes".into()))?;
    VerifyingKey::from_bytes(&arr).map_err(|e| AuthError::BadKeyEncoding(e.to_string()))
}

fn decode_key_bytes(raw: &str) -> Result<Vec<u8>, AuthError> {
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(raw) {
        if bytes.len() == 32 {
            return Ok(bytes);
        }
    }
    hex::decode(raw).map_err(|e| AuthError::BadKeyEncoding(e.to_string()))
}

/// Extract the claimed identity from the `X-Client-ID` upgrade header, or
/// fall back to the `publicKey` field of the first decoded request payload.
pub fn extract_identity(
    header_value: Option<&str>,
    first_payload: Option<&Value>,
) -> Result<VerifyingKey, AuthError> {
    if let Some(header) = header_value {
        return decode_public_key(header.trim());
    }
    let candidate = first_payload
        .and_then(|v| v.get("public_key").or_else(|| v.get("publicKey")))
        .and_then(|v| v.as_str())
        .ok_or(AuthError::MissingKey)?;
    decode_public_key(candidate)
}

/// Verify a signed request's canonical payload bytes against `signature`,
/// a base64 or hex Ed25519 signature carried in the payload's `signature`
/// field.
pub fn verify_signed_payload(key: &VerifyingKey, payload: &Value) -> Result<(), AuthError> {
    // `payload` may arrive as nested JSON or as a base64-of-JSON string
    // (the same wire form `decode_payload` accepts); resolve once so both
    // the `signature` field lookup and `canonicalize` see the same object.
    let resolved = resolve_wire_payload(payload);
    let signature_raw = resolved
        .get("signature")
        .and_then(|v| v.as_str())
        .ok_or(AuthError::MissingKey)?;
    let sig_bytes = decode_key_bytes_any_len(signature_raw)?;
    let sig_arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| AuthError::BadSignatureEncoding("expected 64 bytes".into()))?;
    let signature = Signature::from_bytes(&sig_arr);

    let canonical = canonicalize(&resolved).map_err(|e| AuthError::BadKeyEncoding(e.to_string()))?;

    key.verify(&canonical, &signature)
        .map_err(|_| AuthError::BadSignature)
}

fn decode_key_bytes_any_len(raw: &str) -> Result<Vec<u8>, AuthError> {
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(raw) {
        return Ok(bytes);
    }
    hex::decode(raw).map_err(|e| AuthError::BadSignatureEncoding(e.to_string()))
}

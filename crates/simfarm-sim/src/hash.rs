//! Canonical hashing used for simulation fingerprints.

use serde::Serialize;
use sha2::{Digest, Sha256};
use simfarm_core::errors::{ErrorInfo, SimError};

/// Serializes a payload to canonical JSON bytes (object keys sorted).
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, SimError> {
    // serde_json's default map representation keeps keys sorted, so encoding
    // through a Value gives a canonical byte sequence.
    let value = serde_json::to_value(value)
        .map_err(|err| SimError::Serde(ErrorInfo::new("json-encode", err.to_string())))?;
    serde_json::to_vec(&value)
        .map_err(|err| SimError::Serde(ErrorInfo::new("json-encode", err.to_string())))
}

/// Computes a stable hexadecimal hash for the provided serializable payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, SimError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}

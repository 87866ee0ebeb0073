//! Wire format for delegations and permission contexts.
//!
//! Uses CBOR (RFC 8949) for compact binary serialization, with a base64
//! form for header-friendly transport. Decoding checks size limits before
//! touching the deserializer.

use crate::delegation::Delegation;
use crate::error::{Error, Result};
use crate::redemption::PermissionContext;
use base64::Engine;
use serde::Serialize;

/// Maximum allowed size for one serialized delegation (64 KB).
///
/// Typical delegations are well under a kilobyte; the cap protects
/// against memory exhaustion from oversized payloads.
pub const MAX_DELEGATION_SIZE: usize = 64 * 1024;

/// Maximum allowed size for one serialized permission context (256 KB).
///
/// A context carries a whole chain plus the execution payload, so it gets
/// more headroom than a single delegation.
pub const MAX_CONTEXT_SIZE: usize = 256 * 1024;

/// Serialize any serializable type to CBOR bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Encode a delegation to its compact binary form.
pub fn encode_delegation(delegation: &Delegation) -> Result<Vec<u8>> {
    to_vec(delegation)
}

/// Decode a delegation from binary.
///
/// Returns `PayloadTooLarge` if the input exceeds [`MAX_DELEGATION_SIZE`].
pub fn decode_delegation(data: &[u8]) -> Result<Delegation> {
    if data.len() > MAX_DELEGATION_SIZE {
        return Err(Error::PayloadTooLarge {
            size: data.len(),
            max: MAX_DELEGATION_SIZE,
        });
    }
    Ok(ciborium::de::from_reader(data)?)
}

/// Encode a permission context to its compact binary form.
pub fn encode_context(context: &PermissionContext) -> Result<Vec<u8>> {
    to_vec(context)
}

/// Decode a permission context from binary.
///
/// Returns `PayloadTooLarge` if the input exceeds [`MAX_CONTEXT_SIZE`].
pub fn decode_context(data: &[u8]) -> Result<PermissionContext> {
    if data.len() > MAX_CONTEXT_SIZE {
        return Err(Error::PayloadTooLarge {
            size: data.len(),
            max: MAX_CONTEXT_SIZE,
        });
    }
    Ok(ciborium::de::from_reader(data)?)
}

/// Encode a delegation to a base64 string (for HTTP headers).
pub fn encode_delegation_base64(delegation: &Delegation) -> Result<String> {
    let bytes = encode_delegation(delegation)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a delegation from a base64 string.
pub fn decode_delegation_base64(s: &str) -> Result<Delegation> {
    // base64 packs 3 bytes into 4 chars; reject oversized input before
    // decoding it.
    if (s.len() * 3) / 4 > MAX_DELEGATION_SIZE {
        return Err(Error::PayloadTooLarge {
            size: (s.len() * 3) / 4,
            max: MAX_DELEGATION_SIZE,
        });
    }
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;
    decode_delegation(&bytes)
}

/// Encode a permission context to a base64 string.
pub fn encode_context_base64(context: &PermissionContext) -> Result<String> {
    let bytes = encode_context(context)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a permission context from a base64 string.
pub fn decode_context_base64(s: &str) -> Result<PermissionContext> {
    if (s.len() * 3) / 4 > MAX_CONTEXT_SIZE {
        return Err(Error::PayloadTooLarge {
            size: (s.len() * 3) / 4,
            max: MAX_CONTEXT_SIZE,
        });
    }
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;
    decode_context(&bytes)
}

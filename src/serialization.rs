//! Versioned envelope for values written to durable storage.
//!
//! ```text
//! [MAGIC: b"CFLT"] [VERSION: u32 little-endian] [POSTCARD PAYLOAD]
//! ```
//!
//! Bumping [`CURRENT_SCHEMA_VERSION`] makes every previously persisted payload
//! fail with `Error::VersionMismatch`, which the persisted adapter treats as a
//! cold miss.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const CACHE_MAGIC: [u8; 4] = *b"CFLT";

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = CACHE_MAGIC.len() + std::mem::size_of::<u32>();

pub fn serialize_for_cache<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let payload =
        postcard::to_allocvec(value).map_err(|e| Error::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&CACHE_MAGIC);
    bytes.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn deserialize_from_cache<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "envelope too short: {} bytes",
            bytes.len()
        )));
    }

    let (magic, rest) = bytes.split_at(CACHE_MAGIC.len());
    if magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "bad magic header: {:?}",
            magic
        )));
    }

    let (version, payload) = rest.split_at(std::mem::size_of::<u32>());
    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(version);
    let found = u32::from_le_bytes(version_bytes);
    if found != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found,
        });
    }

    postcard::from_bytes(payload).map_err(|e| Error::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_layout() {
        let bytes = serialize_for_cache(&vec![1u32, 2, 3]).unwrap();
        assert_eq!(&bytes[..4], b"CFLT");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());

        let restored: Vec<u32> = deserialize_from_cache(&bytes).unwrap();
        assert_eq!(restored, vec![1, 2, 3]);
    }

    #[test]
    fn test_rejects_short_envelope() {
        let err = deserialize_from_cache::<u32>(b"CFL").unwrap_err();
        assert!(matches!(err, Error::InvalidCacheEntry(_)));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = serialize_for_cache(&"page").unwrap();
        bytes[0] = b'X';
        let err = deserialize_from_cache::<String>(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidCacheEntry(_)));
    }

    #[test]
    fn test_rejects_other_schema_version() {
        let mut bytes = serialize_for_cache(&42u64).unwrap();
        bytes[4..8].copy_from_slice(&9u32.to_le_bytes());
        let err = deserialize_from_cache::<u64>(&bytes).unwrap_err();
        assert_eq!(
            err,
            Error::VersionMismatch {
                expected: CURRENT_SCHEMA_VERSION,
                found: 9
            }
        );
    }

    #[test]
    fn test_rejects_corrupted_payload() {
        let mut bytes = serialize_for_cache(&"a longer string payload").unwrap();
        bytes.truncate(HEADER_LEN + 3);
        let err = deserialize_from_cache::<String>(&bytes).unwrap_err();
        assert!(matches!(err, Error::DeserializationError(_)));
    }
}

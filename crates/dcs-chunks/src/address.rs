//! BLAKE3 content addressing for files and chunks
//!
//! Three pure functions produce 256-bit identifiers:
//!   - `hash_bytes`: digest of the bytes alone, used for integrity checks and dedup
//!   - `file_id`: digest of (name, content)
//!   - `chunk_id`: digest of (parent file id, index, content)
//!
//! Identifiers render as 64 lowercase hex characters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of hex characters used as the on-disk shard directory name
pub const SHARD_PREFIX_LEN: usize = 2;

/// A 256-bit content address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; 32]);

#[derive(Debug, thiserror::Error)]
#[error("invalid content id '{input}': expected 64 hex characters")]
pub struct ParseIdError {
    input: String,
}

impl ContentId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex string (64 chars)
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Parse a 64-char hex string
    pub fn from_hex(hex: &str) -> Result<Self, ParseIdError> {
        blake3::Hash::from_hex(hex)
            .map(|h| Self(*h.as_bytes()))
            .map_err(|_| ParseIdError {
                input: hex.to_string(),
            })
    }

    /// Shard directory name: the first two hex characters
    pub fn shard(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHARD_PREFIX_LEN);
        hex
    }
}

impl From<blake3::Hash> for ContentId {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash a byte slice. Pure content, no positional context.
pub fn hash_bytes(data: &[u8]) -> ContentId {
    blake3::hash(data).into()
}

/// Derive a file identifier from its name and full plaintext.
///
/// The name is length-prefixed so ("ab", "c") and ("a", "bc") differ.
pub fn file_id(name: &str, content: &[u8]) -> ContentId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(name.len() as u64).to_be_bytes());
    hasher.update(name.as_bytes());
    hasher.update(content);
    hasher.finalize().into()
}

/// Derive a chunk identifier: file id (hex) || index (8 bytes BE) || plaintext.
pub fn chunk_id(file_id: &ContentId, index: u64, content: &[u8]) -> ContentId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_id.to_hex().as_bytes());
    hasher.update(&index.to_be_bytes());
    hasher.update(content);
    hasher.finalize().into()
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Caller-supplied description of a file about to be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub content_type: String,
    pub owner: String,
    /// Target replica count (placement is delegated to a `ReplicaPlacement` policy)
    pub replicas: u32,
    /// Seal chunks under the caller's key before persisting them
    pub encrypted: bool,
}

impl FileMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: "application/octet-stream".into(),
            owner: String::new(),
            replicas: 1,
            encrypted: true,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }
}

/// Metadata for a stored file: the result of a successful store operation.
///
/// Invariants: `size` is the sum of chunk sizes, chunk indices run
/// `0..chunks.len()` in order, and `hash` is the BLAKE3 hex digest of the
/// full plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Content address (64 hex chars)
    pub id: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub owner: String,
    /// Hex digest of the full plaintext
    pub hash: String,
    /// Unix timestamp (seconds)
    pub created_at: u64,
    /// Unix timestamp (seconds)
    pub updated_at: u64,
    pub encrypted: bool,
    pub chunks: Vec<ChunkRecord>,
    pub replicas: u32,
}

impl FileRecord {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes occupied on disk by this file's blobs
    pub fn stored_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.stored_size).sum()
    }

    /// Check the structural invariants (size sum, contiguous indices).
    pub fn is_consistent(&self) -> bool {
        let total: u64 = self.chunks.iter().map(|c| c.size).sum();
        total == self.size
            && self
                .chunks
                .iter()
                .enumerate()
                .all(|(i, c)| c.index == i as u64)
    }
}

/// A single chunk of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Content address derived from (file id, index, plaintext)
    pub id: String,
    pub index: u64,
    /// Plaintext size in bytes
    pub size: u64,
    /// Hex digest of the chunk plaintext
    pub hash: String,
    /// Hex digest of the persisted (possibly sealed) blob
    pub checksum: String,
    /// Size of the persisted blob in bytes
    #[serde(default)]
    pub stored_size: u64,
    /// Nodes currently holding a copy; may be empty
    #[serde(default)]
    pub node_ids: BTreeSet<String>,
}

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64, size: u64) -> ChunkRecord {
        ChunkRecord {
            id: format!("{index:064x}"),
            index,
            size,
            hash: String::new(),
            checksum: String::new(),
            stored_size: size + 40,
            node_ids: BTreeSet::new(),
        }
    }

    fn record(size: u64, chunks: Vec<ChunkRecord>) -> FileRecord {
        FileRecord {
            id: "ab".repeat(32),
            name: "a.txt".into(),
            size,
            content_type: "text/plain".into(),
            owner: "alice".into(),
            hash: String::new(),
            created_at: 0,
            updated_at: 0,
            encrypted: true,
            chunks,
            replicas: 1,
        }
    }

    #[test]
    fn consistent_record() {
        let r = record(10, vec![chunk(0, 3), chunk(1, 3), chunk(2, 3), chunk(3, 1)]);
        assert!(r.is_consistent());
        assert_eq!(r.chunk_count(), 4);
        assert_eq!(r.stored_size(), 10 + 4 * 40);
    }

    #[test]
    fn size_mismatch_is_inconsistent() {
        let r = record(11, vec![chunk(0, 3), chunk(1, 3), chunk(2, 3), chunk(3, 1)]);
        assert!(!r.is_consistent());
    }

    #[test]
    fn index_gap_is_inconsistent() {
        let r = record(6, vec![chunk(0, 3), chunk(2, 3)]);
        assert!(!r.is_consistent());
    }

    #[test]
    fn json_roundtrip_keeps_node_ids() {
        let mut c = chunk(0, 5);
        c.node_ids.insert("node-1".into());
        let r = record(5, vec![c]);
        let json = serde_json::to_string(&r).unwrap();
        let back: FileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn file_meta_builder() {
        let meta = FileMeta::new("report.pdf")
            .content_type("application/pdf")
            .owner("bob")
            .replicas(3)
            .encrypted(false);
        assert_eq!(meta.name, "report.pdf");
        assert_eq!(meta.content_type, "application/pdf");
        assert_eq!(meta.replicas, 3);
        assert!(!meta.encrypted);
    }
}

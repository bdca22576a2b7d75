//! Storage node: the chunk manager plus its collaborators.
//!
//! `StorageNode` owns the pieces a request-handling layer needs around the
//! chunk manager: a metadata repository for [`FileRecord`]s, a key provider,
//! size and quota limits, and a per-file-id lock table. Operations on
//! distinct ids never contend; operations on the same id run one at a time.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use dcs_chunks::{segment_count, ContentId};
use dcs_core::config::{expand_tilde, DcsConfig};
use dcs_core::{FileMeta, FileRecord};
use dcs_crypto::{EncryptionKey, KeyProvider, KEY_SIZE, SEAL_OVERHEAD};
use dcs_storage::FsBlobStore;
use tracing::{info, warn};

use crate::chunk_manager::ChunkManager;
use crate::error::{EngineError, EngineResult, Operation};
use crate::metadata::{JsonMetadataRepository, MetadataRepository};
use crate::placement::LocalPlacement;

/// Upload limits. A zero limit disables that check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeLimits {
    pub max_file_size: u64,
    pub max_storage: u64,
}

/// Usage summary for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    /// Bytes occupied by blobs
    pub usage: u64,
    pub blob_count: usize,
    pub file_count: usize,
    /// Configured storage quota in bytes
    pub capacity: u64,
}

/// One mutex per file id, created on demand and dropped when unused.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let out = {
            let _guard = entry.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        drop(entry);

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
        out
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct StorageNode {
    manager: ChunkManager,
    metadata: Arc<dyn MetadataRepository>,
    keys: Arc<dyn KeyProvider>,
    limits: NodeLimits,
    locks: KeyedLocks,
}

impl StorageNode {
    pub fn new(
        manager: ChunkManager,
        metadata: Arc<dyn MetadataRepository>,
        keys: Arc<dyn KeyProvider>,
        limits: NodeLimits,
    ) -> Self {
        Self {
            manager,
            metadata,
            keys,
            limits,
            locks: KeyedLocks::default(),
        }
    }

    /// Open a node backed by the on-disk blob store and JSON index named in
    /// `config`.
    pub fn from_config(config: &DcsConfig, keys: Arc<dyn KeyProvider>) -> EngineResult<Self> {
        let blob_dir = expand_tilde(&config.storage.path);
        let store = FsBlobStore::new(&blob_dir)
            .map_err(|e| EngineError::storage(Operation::Store, blob_dir.display(), e))?;
        let metadata = JsonMetadataRepository::open(expand_tilde(&config.storage.index_path))?;

        let manager = ChunkManager::new(
            Arc::new(store),
            Arc::new(LocalPlacement::new(config.node.id.clone())),
            config.node.chunk_size,
            config.node.workers,
        )?;

        info!(
            node = %config.node.id,
            blobs = %blob_dir.display(),
            chunk_size = config.node.chunk_size,
            workers = config.node.workers,
            "storage node ready"
        );

        Ok(Self::new(
            manager,
            Arc::new(metadata),
            keys,
            NodeLimits {
                max_file_size: config.storage.max_file_size,
                max_storage: config.node.max_storage,
            },
        ))
    }

    pub fn manager(&self) -> &ChunkManager {
        &self.manager
    }

    pub fn limits(&self) -> NodeLimits {
        self.limits
    }

    /// Store a file and record it. Uploading content that maps to an
    /// existing id replaces the old record, keeping the original creation
    /// time. The old copy stays readable until the new one is recorded.
    pub fn upload(&self, meta: FileMeta, data: &[u8]) -> EngineResult<FileRecord> {
        let size = data.len() as u64;
        if self.limits.max_file_size > 0 && size > self.limits.max_file_size {
            return Err(EngineError::FileTooLarge {
                name: meta.name,
                size,
                limit: self.limits.max_file_size,
            });
        }

        let fid = self.manager.file_id_for(&meta, data);
        let fid_hex = fid.to_hex();

        self.locks
            .with_lock(&fid_hex, || self.upload_locked(fid, &fid_hex, &meta, data))
    }

    fn upload_locked(
        &self,
        fid: ContentId,
        fid_hex: &str,
        meta: &FileMeta,
        data: &[u8],
    ) -> EngineResult<FileRecord> {
        let existing = self.metadata.get(fid_hex)?;
        self.check_quota(meta, data, existing.as_ref())?;
        let key = self.key_for(Operation::Store, fid_hex, meta.encrypted)?;

        if existing.is_some() {
            info!(file_id = fid_hex, "replacing existing file");
        }
        let created_at = existing.as_ref().map(|old| old.created_at);
        let record = self
            .manager
            .store_file_with(fid, meta, data, &key, |record| {
                if let Some(created_at) = created_at {
                    record.created_at = created_at;
                }
                self.metadata.put(record.clone())?;
                Ok(())
            })?;

        if let Some(old) = &existing {
            self.remove_stale_chunks(old, &record);
        }
        Ok(record)
    }

    /// Delete chunks of `old` that `new` no longer references. Failures
    /// leave orphaned blobs behind and are only logged.
    fn remove_stale_chunks(&self, old: &FileRecord, new: &FileRecord) {
        let live: HashSet<&str> = new.chunks.iter().map(|c| c.id.as_str()).collect();
        let stale: Vec<ContentId> = old
            .chunks
            .iter()
            .filter(|c| !live.contains(c.id.as_str()))
            .filter_map(|c| match ContentId::from_hex(&c.id) {
                Ok(cid) => Some(cid),
                Err(e) => {
                    warn!(file_id = %old.id, chunk_id = %c.id, error = %e, "skipping malformed chunk id");
                    None
                }
            })
            .collect();
        if stale.is_empty() {
            return;
        }

        let failures = self.manager.rollback(&old.id, &stale);
        info!(file_id = %old.id, removed = stale.len() - failures, failures, "removed stale chunks");
    }

    /// Key for `id`, consulted only when the file is encrypted. Unencrypted
    /// files get a zero key that the chunk manager never reads.
    fn key_for(&self, op: Operation, id: &str, encrypted: bool) -> EngineResult<EncryptionKey> {
        if !encrypted {
            return Ok(EncryptionKey::from_bytes([0u8; KEY_SIZE]));
        }
        self.keys
            .key_for(id)
            .map_err(|e| EngineError::crypto(op, id, None, e))
    }

    fn check_quota(
        &self,
        meta: &FileMeta,
        data: &[u8],
        existing: Option<&FileRecord>,
    ) -> EngineResult<()> {
        if self.limits.max_storage == 0 {
            return Ok(());
        }

        let usage = self
            .manager
            .store()
            .usage()
            .map_err(|e| EngineError::storage(Operation::Store, &meta.name, e))?;
        let reclaimed = existing.map(FileRecord::stored_size).unwrap_or(0);
        let overhead = if meta.encrypted {
            (segment_count(data.len(), self.manager.chunk_size()) * SEAL_OVERHEAD) as u64
        } else {
            0
        };

        let projected = usage.saturating_sub(reclaimed) + data.len() as u64 + overhead;
        if projected > self.limits.max_storage {
            return Err(EngineError::QuotaExceeded {
                name: meta.name.clone(),
                projected,
                limit: self.limits.max_storage,
            });
        }
        Ok(())
    }

    /// Fetch a file's record and its verified plaintext.
    pub fn download(&self, id: &str) -> EngineResult<(FileRecord, Vec<u8>)> {
        let op = Operation::Retrieve;
        self.locks.with_lock(id, || -> EngineResult<_> {
            let record = self.require(op, id)?;
            let key = self.key_for(op, id, record.encrypted)?;
            let data = self.manager.retrieve_file(&record, &key)?;
            Ok((record, data))
        })
    }

    /// Delete a file's chunks, then its record.
    pub fn remove(&self, id: &str) -> EngineResult<FileRecord> {
        let op = Operation::Delete;
        self.locks.with_lock(id, || -> EngineResult<_> {
            let record = self.require(op, id)?;
            self.manager.delete_file(&record)?;
            self.metadata.delete(id)?;
            info!(file_id = id, name = %record.name, "removed file");
            Ok(record)
        })
    }

    /// Check that every blob of a file is present and intact.
    pub fn verify(&self, id: &str) -> EngineResult<FileRecord> {
        let op = Operation::Verify;
        self.locks.with_lock(id, || -> EngineResult<_> {
            let record = self.require(op, id)?;
            self.manager.verify_file(&record)?;
            Ok(record)
        })
    }

    pub fn get(&self, id: &str) -> EngineResult<Option<FileRecord>> {
        Ok(self.metadata.get(id)?)
    }

    pub fn files(&self) -> EngineResult<Vec<FileRecord>> {
        Ok(self.metadata.list()?)
    }

    pub fn stats(&self) -> EngineResult<NodeStats> {
        let store = self.manager.store();
        let usage = store
            .usage()
            .map_err(|e| EngineError::storage(Operation::Verify, "node", e))?;
        let blob_count = store
            .list()
            .map_err(|e| EngineError::storage(Operation::Verify, "node", e))?
            .len();

        Ok(NodeStats {
            usage,
            blob_count,
            file_count: self.metadata.list()?.len(),
            capacity: self.limits.max_storage,
        })
    }

    fn require(&self, op: Operation, id: &str) -> EngineResult<FileRecord> {
        self.metadata.get(id)?.ok_or_else(|| EngineError::NotFound {
            op,
            id: id.to_string(),
        })
    }
}

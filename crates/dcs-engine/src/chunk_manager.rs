//! Chunk manager: whole-file store, retrieve, delete, and verify
//!
//! Store pipeline, per chunk:
//!   split → hash plaintext → derive chunk id → seal → checksum blob → persist
//!
//! Chunks are processed on a bounded rayon pool, so at most `workers`
//! sealed blobs are in flight at once. A blob already stored under the
//! chunk id that still yields the same plaintext is reused, not rewritten.
//! If any chunk fails, every write made by this store is undone before the
//! error is returned: new blobs are deleted, overwritten blobs restored.
//!
//! Retrieve is strictly sequential by index:
//!   fetch → verify blob checksum → open → verify chunk hash → append,
//! then the reassembled bytes are checked against the file-level hash.

use std::fmt;
use std::sync::Arc;

use dcs_chunks::{chunk_id, file_id, hash_bytes, split, ContentId};
use dcs_core::types::unix_now;
use dcs_core::{ChunkRecord, FileMeta, FileRecord};
use dcs_crypto::{open, seal, CryptoError, EncryptionKey};
use dcs_storage::{BlobStore, StoreError};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult, IntegrityLevel, Operation};
use crate::placement::ReplicaPlacement;

/// Default fixed chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default bound on concurrent chunk writes
pub const DEFAULT_WORKERS: usize = 4;

/// Stages of a single store operation, recorded in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStage {
    Splitting,
    Hashing,
    Encrypting,
    Persisting,
    Committed,
    RollingBack,
    Failed,
}

impl fmt::Display for StoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreStage::Splitting => "splitting",
            StoreStage::Hashing => "hashing",
            StoreStage::Encrypting => "encrypting",
            StoreStage::Persisting => "persisting",
            StoreStage::Committed => "committed",
            StoreStage::RollingBack => "rolling_back",
            StoreStage::Failed => "failed",
        })
    }
}

/// Why a single chunk could not be stored
enum ChunkFailure {
    Seal(CryptoError),
    Persist(StoreError),
}

struct FailedChunk {
    index: u64,
    failure: ChunkFailure,
}

/// What was under a chunk id before this store touched it
enum Prior {
    /// Nothing; the blob was written by this store
    Absent,
    /// A blob with the same plaintext, left as is
    Reused,
    /// A blob that did not match (other key or mode), overwritten
    Replaced(Vec<u8>),
}

struct StoredChunk {
    id: ContentId,
    record: ChunkRecord,
    prior: Prior,
}

impl StoredChunk {
    fn written(&self) -> bool {
        !matches!(self.prior, Prior::Reused)
    }
}

pub struct ChunkManager {
    store: Arc<dyn BlobStore>,
    placement: Arc<dyn ReplicaPlacement>,
    chunk_size: usize,
    pool: rayon::ThreadPool,
}

impl ChunkManager {
    /// Build a manager writing through `store` with at most `workers`
    /// concurrent chunk operations. A `chunk_size` of 0 stores each file
    /// as a single chunk.
    pub fn new(
        store: Arc<dyn BlobStore>,
        placement: Arc<dyn ReplicaPlacement>,
        chunk_size: usize,
        workers: usize,
    ) -> EngineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("dcs-chunk-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;

        Ok(Self {
            store,
            placement,
            chunk_size,
            pool,
        })
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Content address a file would receive.
    pub fn file_id_for(&self, meta: &FileMeta, plaintext: &[u8]) -> ContentId {
        file_id(&meta.name, plaintext)
    }

    /// Split, seal, and persist `plaintext`, returning its finished record.
    ///
    /// All-or-nothing: on any failure the chunks already written for this
    /// file are removed. `key` is unused when `meta.encrypted` is false.
    pub fn store_file(
        &self,
        meta: &FileMeta,
        plaintext: &[u8],
        key: &EncryptionKey,
    ) -> EngineResult<FileRecord> {
        let fid = self.file_id_for(meta, plaintext);
        self.store_file_as(fid, meta, plaintext, key)
    }

    /// Like [`store_file`](Self::store_file) with a precomputed file id.
    pub fn store_file_as(
        &self,
        fid: ContentId,
        meta: &FileMeta,
        plaintext: &[u8],
        key: &EncryptionKey,
    ) -> EngineResult<FileRecord> {
        self.store_file_with(fid, meta, plaintext, key, |_| Ok(()))
    }

    /// Store `plaintext`, then hand the finished record to `commit`.
    ///
    /// If `commit` fails, the chunk writes are undone exactly as for a
    /// failed chunk and the commit error is returned.
    pub fn store_file_with(
        &self,
        fid: ContentId,
        meta: &FileMeta,
        plaintext: &[u8],
        key: &EncryptionKey,
        commit: impl FnOnce(&mut FileRecord) -> EngineResult<()>,
    ) -> EngineResult<FileRecord> {
        let fid_hex = fid.to_hex();
        debug!(file_id = %fid_hex, size = plaintext.len(), stage = %StoreStage::Splitting);
        let segments = split(plaintext, self.chunk_size);
        let total = segments.len();

        debug!(file_id = %fid_hex, chunks = total, stage = %StoreStage::Persisting);
        let outcomes: Vec<Result<StoredChunk, FailedChunk>> = self.pool.install(|| {
            segments
                .par_iter()
                .enumerate()
                .map(|(index, segment)| self.store_chunk(&fid, index as u64, segment, meta, key))
                .collect()
        });

        let mut stored = Vec::with_capacity(total);
        let mut first_failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(chunk) => stored.push(chunk),
                Err(failed) if first_failure.is_none() => first_failure = Some(failed),
                Err(failed) => {
                    debug!(file_id = %fid_hex, index = failed.index, "additional chunk failure")
                }
            }
        }

        if let Some(failed) = first_failure {
            let persisted = stored.iter().filter(|c| c.written()).count();
            warn!(
                file_id = %fid_hex,
                index = failed.index,
                persisted,
                total,
                stage = %StoreStage::RollingBack,
                "store failed, rolling back persisted chunks"
            );
            let rollback_failures = self.undo(&fid_hex, stored);
            debug!(file_id = %fid_hex, rollback_failures, stage = %StoreStage::Failed);

            return Err(match failed.failure {
                ChunkFailure::Persist(source) => EngineError::PartialWrite {
                    file_id: fid_hex,
                    failed_index: failed.index,
                    persisted,
                    total,
                    rollback_failures,
                    source,
                },
                ChunkFailure::Seal(source) => {
                    EngineError::crypto(Operation::Store, &fid_hex, None, source)
                }
            });
        }

        let now = unix_now();
        let mut record = FileRecord {
            id: fid_hex,
            name: meta.name.clone(),
            size: plaintext.len() as u64,
            content_type: meta.content_type.clone(),
            owner: meta.owner.clone(),
            hash: hash_bytes(plaintext).to_hex(),
            created_at: now,
            updated_at: now,
            encrypted: meta.encrypted,
            chunks: stored.iter().map(|c| c.record.clone()).collect(),
            replicas: meta.replicas,
        };

        if let Err(e) = commit(&mut record) {
            warn!(file_id = %record.id, error = %e, stage = %StoreStage::RollingBack, "commit failed");
            let rollback_failures = self.undo(&record.id, stored);
            debug!(file_id = %record.id, rollback_failures, stage = %StoreStage::Failed);
            return Err(e);
        }

        let reused = stored.iter().filter(|c| !c.written()).count();

        info!(
            file_id = %record.id,
            name = %record.name,
            size = record.size,
            chunks = record.chunks.len(),
            reused,
            stage = %StoreStage::Committed,
            "stored file"
        );
        Ok(record)
    }

    fn store_chunk(
        &self,
        fid: &ContentId,
        index: u64,
        segment: &[u8],
        meta: &FileMeta,
        key: &EncryptionKey,
    ) -> Result<StoredChunk, FailedChunk> {
        let persist_failure = |e: StoreError| FailedChunk {
            index,
            failure: ChunkFailure::Persist(e),
        };
        let hash = hash_bytes(segment);
        let cid = chunk_id(fid, index, segment);

        let prior = match self.store.get(&cid) {
            Ok(existing) => {
                let same = if meta.encrypted {
                    open(&existing, key).is_ok_and(|p| p == segment)
                } else {
                    existing == segment
                };
                if same {
                    debug!(chunk_id = %cid, index, "chunk already stored");
                    let record = self.chunk_record(&cid, index, segment, &hash, &existing, meta);
                    return Ok(StoredChunk {
                        id: cid,
                        record,
                        prior: Prior::Reused,
                    });
                }
                Prior::Replaced(existing)
            }
            Err(StoreError::NotFound(_)) => Prior::Absent,
            Err(e) => return Err(persist_failure(e)),
        };

        let sealed;
        let blob: &[u8] = if meta.encrypted {
            sealed = seal(segment, key).map_err(|e| FailedChunk {
                index,
                failure: ChunkFailure::Seal(e),
            })?;
            &sealed
        } else {
            segment
        };

        self.store.put(&cid, blob).map_err(persist_failure)?;
        debug!(chunk_id = %cid, index, size = segment.len(), "persisted chunk");

        Ok(StoredChunk {
            id: cid,
            record: self.chunk_record(&cid, index, segment, &hash, blob, meta),
            prior,
        })
    }

    fn chunk_record(
        &self,
        cid: &ContentId,
        index: u64,
        segment: &[u8],
        hash: &ContentId,
        blob: &[u8],
        meta: &FileMeta,
    ) -> ChunkRecord {
        ChunkRecord {
            id: cid.to_hex(),
            index,
            size: segment.len() as u64,
            hash: hash.to_hex(),
            checksum: hash_bytes(blob).to_hex(),
            stored_size: blob.len() as u64,
            node_ids: self.placement.place(cid, meta.replicas),
        }
    }

    /// Revert the writes of a failed store. Blobs this store created are
    /// deleted and blobs it overwrote get their old bytes back.
    fn undo(&self, file_id: &str, stored: Vec<StoredChunk>) -> usize {
        let mut created = Vec::new();
        let mut failures = 0;
        for chunk in stored {
            match chunk.prior {
                Prior::Absent => created.push(chunk.id),
                Prior::Reused => {}
                Prior::Replaced(old) => {
                    if let Err(e) = self.store.put(&chunk.id, &old) {
                        warn!(file_id, chunk_id = %chunk.id, error = %e, "rollback could not restore chunk");
                        failures += 1;
                    }
                }
            }
        }
        failures + self.rollback(file_id, &created)
    }

    /// Delete `chunk_ids` on behalf of a failed or cancelled store.
    ///
    /// Returns the number of blobs that could not be removed; each is logged.
    pub fn rollback(&self, file_id: &str, chunk_ids: &[ContentId]) -> usize {
        let mut failures = 0;
        for cid in chunk_ids {
            if let Err(e) = self.store.delete(cid) {
                warn!(file_id, chunk_id = %cid, error = %e, "rollback could not delete chunk");
                failures += 1;
            }
        }
        failures
    }

    /// Reassemble and verify a file. No bytes are returned unless every
    /// chunk and the whole file pass their integrity checks.
    pub fn retrieve_file(&self, record: &FileRecord, key: &EncryptionKey) -> EngineResult<Vec<u8>> {
        let op = Operation::Retrieve;
        check_record(op, record)?;

        // Grown as chunks verify; record sizes are not trusted for allocation.
        let mut out = Vec::new();
        for chunk in &record.chunks {
            let cid = parse_chunk_id(op, record, chunk)?;
            let blob = self
                .store
                .get(&cid)
                .map_err(|e| EngineError::storage(op, &chunk.id, e))?;
            verify_digest(op, &chunk.id, IntegrityLevel::Blob, &chunk.checksum, &blob)?;

            let plaintext = if record.encrypted {
                open(&blob, key)
                    .map_err(|e| EngineError::crypto(op, &record.id, Some(&chunk.id), e))?
            } else {
                blob
            };
            verify_digest(op, &chunk.id, IntegrityLevel::Chunk, &chunk.hash, &plaintext)?;
            if plaintext.len() as u64 != chunk.size {
                return Err(EngineError::IntegrityMismatch {
                    op,
                    id: chunk.id.clone(),
                    level: IntegrityLevel::Chunk,
                    expected: format!("{} bytes", chunk.size),
                    actual: format!("{} bytes", plaintext.len()),
                });
            }

            out.extend_from_slice(&plaintext);
        }

        verify_digest(op, &record.id, IntegrityLevel::File, &record.hash, &out)?;
        debug!(file_id = %record.id, size = out.len(), "retrieved file");
        Ok(out)
    }

    /// Remove every chunk blob of a file. Already-absent blobs are fine, so
    /// deleting twice succeeds. All chunks are attempted; the first failure
    /// is returned.
    pub fn delete_file(&self, record: &FileRecord) -> EngineResult<()> {
        let op = Operation::Delete;
        let mut first_error = None;

        for chunk in &record.chunks {
            let result = parse_chunk_id(op, record, chunk).and_then(|cid| {
                self.store
                    .delete(&cid)
                    .map_err(|e| EngineError::storage(op, &chunk.id, e))
            });
            if let Err(e) = result {
                warn!(file_id = %record.id, chunk_id = %chunk.id, error = %e, "chunk delete failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(file_id = %record.id, chunks = record.chunks.len(), "deleted file chunks");
                Ok(())
            }
        }
    }

    /// Check that every chunk blob is present and matches its recorded
    /// checksum, without decrypting anything.
    pub fn verify_file(&self, record: &FileRecord) -> EngineResult<()> {
        let op = Operation::Verify;
        check_record(op, record)?;

        for chunk in &record.chunks {
            let cid = parse_chunk_id(op, record, chunk)?;
            let blob = self
                .store
                .get(&cid)
                .map_err(|e| EngineError::storage(op, &chunk.id, e))?;
            verify_digest(op, &chunk.id, IntegrityLevel::Blob, &chunk.checksum, &blob)?;
        }
        debug!(file_id = %record.id, chunks = record.chunks.len(), "verified file");
        Ok(())
    }
}

fn check_record(op: Operation, record: &FileRecord) -> EngineResult<()> {
    if record.chunks.is_empty() || !record.is_consistent() {
        return Err(EngineError::InvalidRecord {
            op,
            id: record.id.clone(),
            reason: "chunk sizes or indices do not match the file".into(),
        });
    }
    Ok(())
}

fn parse_chunk_id(op: Operation, record: &FileRecord, chunk: &ChunkRecord) -> EngineResult<ContentId> {
    ContentId::from_hex(&chunk.id).map_err(|e| EngineError::InvalidRecord {
        op,
        id: record.id.clone(),
        reason: e.to_string(),
    })
}

fn verify_digest(
    op: Operation,
    id: &str,
    level: IntegrityLevel,
    expected: &str,
    data: &[u8],
) -> EngineResult<()> {
    let actual = hash_bytes(data).to_hex();
    if !actual.eq_ignore_ascii_case(expected) {
        warn!(%op, id, %level, "integrity mismatch");
        return Err(EngineError::IntegrityMismatch {
            op,
            id: id.to_string(),
            level,
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

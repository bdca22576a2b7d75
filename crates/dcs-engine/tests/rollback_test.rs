//! Integration tests for partial-failure handling.
//!
//! A `FaultyBlobStore` fails a chosen write; the chunk manager must remove
//! every blob it already persisted and report the failure.

use std::sync::Arc;

use dcs_core::FileMeta;
use dcs_crypto::generate_key;
use dcs_engine::{ChunkManager, EngineError, NoPlacement};
use dcs_storage::{BlobStore, FaultyBlobStore, FsBlobStore, MemoryBlobStore, StoreError};
use tempfile::TempDir;

#[test]
fn third_write_of_five_fails_and_nothing_remains() {
    let tmp = TempDir::new().unwrap();
    let inner = Arc::new(FsBlobStore::new(tmp.path()).unwrap());
    let faulty = Arc::new(FaultyBlobStore::new(inner.clone()).fail_put_at(3));
    let manager = ChunkManager::new(faulty, Arc::new(NoPlacement), 3, 1).unwrap();

    let data = b"abcdefghijklmno"; // five chunks of three bytes
    let err = manager
        .store_file(&FileMeta::new("five.bin"), data, &generate_key())
        .expect_err("store must fail");

    match &err {
        EngineError::PartialWrite {
            file_id,
            total,
            persisted,
            rollback_failures,
            source,
            ..
        } => {
            assert_eq!(file_id, &dcs_chunks::file_id("five.bin", data).to_hex());
            assert_eq!(*total, 5);
            assert_eq!(*persisted, 4);
            assert_eq!(*rollback_failures, 0);
            assert!(matches!(source, StoreError::Backend(_)));
        }
        other => panic!("expected PartialWrite, got {other:?}"),
    }
    assert!(err.to_string().starts_with("store "));

    assert!(inner.list().unwrap().is_empty(), "rollback left blobs behind");
    assert_eq!(inner.usage().unwrap(), 0);
}

#[test]
fn first_write_failing_leaves_store_untouched() {
    let inner = Arc::new(MemoryBlobStore::new());
    let faulty = Arc::new(FaultyBlobStore::new(inner.clone()).fail_put_at(1));
    let manager = ChunkManager::new(faulty, Arc::new(NoPlacement), 4, 4).unwrap();

    let err = manager
        .store_file(&FileMeta::new("x"), &[7u8; 64], &generate_key())
        .unwrap_err();
    assert!(matches!(err, EngineError::PartialWrite { total: 16, persisted: 15, .. }));
    assert!(inner.list().unwrap().is_empty());
}

#[test]
fn other_files_survive_a_failed_store() {
    let inner = Arc::new(MemoryBlobStore::new());
    let key = generate_key();

    let healthy = ChunkManager::new(inner.clone(), Arc::new(NoPlacement), 4, 2).unwrap();
    let kept = healthy.store_file(&FileMeta::new("kept"), b"keep these bytes", &key).unwrap();

    let faulty = Arc::new(FaultyBlobStore::new(inner.clone()).fail_put_at(2));
    let failing = ChunkManager::new(faulty, Arc::new(NoPlacement), 4, 2).unwrap();
    failing
        .store_file(&FileMeta::new("lost"), b"these bytes are lost", &key)
        .unwrap_err();

    assert_eq!(inner.list().unwrap().len(), kept.chunks.len());
    assert_eq!(healthy.retrieve_file(&kept, &key).unwrap(), b"keep these bytes");
}

#[test]
fn failed_restore_of_a_stored_file_keeps_its_blobs() {
    let tmp = TempDir::new().unwrap();
    let inner = Arc::new(FsBlobStore::new(tmp.path()).unwrap());
    let key = generate_key();
    let healthy = ChunkManager::new(inner.clone(), Arc::new(NoPlacement), 4, 2).unwrap();
    let first = healthy.store_file(&FileMeta::new("twice"), b"abcdefghijkl", &key).unwrap();

    // An intact copy needs no writes, so an unreliable store cannot hurt it.
    let faulty = Arc::new(FaultyBlobStore::new(inner.clone()).fail_put_at(1));
    let again = ChunkManager::new(faulty.clone(), Arc::new(NoPlacement), 4, 2).unwrap();
    again.store_file(&FileMeta::new("twice"), b"abcdefghijkl", &key).unwrap();
    assert_eq!(faulty.put_count(), 0);

    // With the last blob gone, only that one is written; its failure must not
    // take the other two with it.
    let last = dcs_chunks::ContentId::from_hex(&first.chunks[2].id).unwrap();
    inner.delete(&last).unwrap();
    let err = again
        .store_file(&FileMeta::new("twice"), b"abcdefghijkl", &key)
        .unwrap_err();
    assert!(matches!(err, EngineError::PartialWrite { persisted: 0, failed_index: 2, .. }));
    assert_eq!(inner.list().unwrap().len(), 2);

    let repaired = healthy.store_file(&FileMeta::new("twice"), b"abcdefghijkl", &key).unwrap();
    assert_eq!(repaired.chunks[..2], first.chunks[..2]);
    assert_eq!(healthy.retrieve_file(&repaired, &key).unwrap(), b"abcdefghijkl");
}

#[test]
fn explicit_rollback_removes_listed_chunks() {
    let inner = Arc::new(MemoryBlobStore::new());
    let manager = ChunkManager::new(inner.clone(), Arc::new(NoPlacement), 2, 2).unwrap();
    let record = manager.store_file(&FileMeta::new("r"), b"abcdef", &generate_key()).unwrap();

    let ids: Vec<_> = record
        .chunks
        .iter()
        .map(|c| dcs_chunks::ContentId::from_hex(&c.id).unwrap())
        .collect();
    assert_eq!(manager.rollback(&record.id, &ids), 0);
    assert!(inner.list().unwrap().is_empty());
}

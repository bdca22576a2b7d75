//! In-memory blob store backed by a `RwLock<HashMap>`.
//!
//! Useful for tests and for embedding the engine without a data directory.

use std::collections::HashMap;
use std::sync::RwLock;

use dcs_chunks::ContentId;
use tracing::debug;

use crate::blob::BlobStore;
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentId, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".into())
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, id: &ContentId, data: &[u8]) -> Result<(), StoreError> {
        let mut map = self.blobs.write().map_err(poisoned)?;
        debug!(%id, size = data.len(), "storing blob in memory");
        map.insert(*id, data.to_vec());
        Ok(())
    }

    fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        let map = self.blobs.read().map_err(poisoned)?;
        map.get(id).cloned().ok_or(StoreError::NotFound(*id))
    }

    fn delete(&self, id: &ContentId) -> Result<(), StoreError> {
        let mut map = self.blobs.write().map_err(poisoned)?;
        map.remove(id);
        Ok(())
    }

    fn contains(&self, id: &ContentId) -> Result<bool, StoreError> {
        Ok(self.blobs.read().map_err(poisoned)?.contains_key(id))
    }

    fn list(&self) -> Result<Vec<ContentId>, StoreError> {
        Ok(self.blobs.read().map_err(poisoned)?.keys().copied().collect())
    }

    fn usage(&self) -> Result<u64, StoreError> {
        let map = self.blobs.read().map_err(poisoned)?;
        Ok(map.values().map(|v| v.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcs_chunks::hash_bytes;

    #[test]
    fn put_get_delete() {
        let store = MemoryBlobStore::new();
        let id = hash_bytes(b"mem");

        store.put(&id, b"abc").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"abc");
        assert_eq!(store.usage().unwrap(), 3);
        assert_eq!(store.list().unwrap(), vec![id]);

        store.delete(&id).unwrap();
        store.delete(&id).unwrap();
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(_))));
        assert_eq!(store.usage().unwrap(), 0);
    }
}

//! A [`BlobStore`] wrapper that fails a chosen write, for exercising
//! rollback paths.
//!
//! ```ignore
//! let store = FaultyBlobStore::new(inner).fail_put_at(3); // third put fails
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dcs_chunks::ContentId;

use crate::blob::BlobStore;
use crate::error::StoreError;

pub struct FaultyBlobStore {
    inner: Arc<dyn BlobStore>,
    /// 1-based put number that fails; 0 disables injection
    fail_put_at: usize,
    puts: AtomicUsize,
}

impl FaultyBlobStore {
    /// Wrap an existing store as a pass-through by default.
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            fail_put_at: 0,
            puts: AtomicUsize::new(0),
        }
    }

    /// Fail the `n`th call to `put` (1-based). Other calls pass through.
    pub fn fail_put_at(mut self, n: usize) -> Self {
        self.fail_put_at = n;
        self
    }

    /// Number of `put` calls observed so far, including the failed one.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl BlobStore for FaultyBlobStore {
    fn put(&self, id: &ContentId, data: &[u8]) -> Result<(), StoreError> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_put_at {
            return Err(StoreError::Backend(format!("injected failure on put #{n} ({id})")));
        }
        self.inner.put(id, data)
    }

    fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        self.inner.get(id)
    }

    fn delete(&self, id: &ContentId) -> Result<(), StoreError> {
        self.inner.delete(id)
    }

    fn contains(&self, id: &ContentId) -> Result<bool, StoreError> {
        self.inner.contains(id)
    }

    fn list(&self) -> Result<Vec<ContentId>, StoreError> {
        self.inner.list()
    }

    fn usage(&self) -> Result<u64, StoreError> {
        self.inner.usage()
    }
}

//! The blob store contract

use dcs_chunks::ContentId;

use crate::error::StoreError;

/// Persists opaque byte blobs by content address.
///
/// Operations on distinct ids are safe to run concurrently. Concurrent
/// writers for the same id must be serialized by the caller.
pub trait BlobStore: Send + Sync {
    /// Store `data` under `id`, replacing any previous blob.
    fn put(&self, id: &ContentId, data: &[u8]) -> Result<(), StoreError>;

    /// Fetch a blob. Fails with `NotFound` if absent.
    fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError>;

    /// Remove a blob. Removing an absent id succeeds.
    fn delete(&self, id: &ContentId) -> Result<(), StoreError>;

    fn contains(&self, id: &ContentId) -> Result<bool, StoreError>;

    /// Every stored id, in no particular order.
    fn list(&self) -> Result<Vec<ContentId>, StoreError>;

    /// Total bytes currently stored across all blobs.
    fn usage(&self) -> Result<u64, StoreError>;
}

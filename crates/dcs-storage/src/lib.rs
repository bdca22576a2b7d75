//! dcs-storage: content-addressed blob persistence
//!
//! - `FsBlobStore`: sharded on-disk layout `{base}/{hex[0..2]}/{hex}`
//! - `MemoryBlobStore`: in-process map, for tests and embedding
//! - `FaultyBlobStore`: failure injection wrapper for rollback testing

pub mod blob;
pub mod error;
pub mod faulty_store;
pub mod fs_store;
pub mod memory_store;

pub use blob::BlobStore;
pub use error::StoreError;
pub use faulty_store::FaultyBlobStore;
pub use fs_store::FsBlobStore;
pub use memory_store::MemoryBlobStore;

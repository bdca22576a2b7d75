//! dcs-engine: whole-file storage on top of chunk blobs
//!
//! - `chunk_manager`: split → seal → persist with rollback; verified retrieve
//! - `metadata`: `FileRecord` repositories (memory, JSON index)
//! - `node`: `StorageNode` facade with per-id locking and quota checks
//! - `placement`: pluggable replica placement policies

pub mod chunk_manager;
pub mod error;
pub mod metadata;
pub mod node;
pub mod placement;

pub use chunk_manager::{ChunkManager, StoreStage, DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
pub use error::{EngineError, EngineResult, IntegrityLevel, Operation};
pub use metadata::{JsonMetadataRepository, MemoryMetadataRepository, MetadataRepository};
pub use node::{NodeLimits, NodeStats, StorageNode};
pub use placement::{LocalPlacement, NoPlacement, ReplicaPlacement};

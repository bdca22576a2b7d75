//! Engine error taxonomy.
//!
//! Every variant names the operation and the file or chunk id involved.
//! Key material never appears in any message.

use std::fmt;

use dcs_core::DcsError;
use dcs_crypto::CryptoError;
use dcs_storage::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// The public operation an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Store,
    Retrieve,
    Delete,
    Verify,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Store => "store",
            Operation::Retrieve => "retrieve",
            Operation::Delete => "delete",
            Operation::Verify => "verify",
        })
    }
}

/// Which digest failed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityLevel {
    /// Checksum of the persisted (sealed) blob
    Blob,
    /// Plaintext hash of a single chunk
    Chunk,
    /// Hash of the reassembled file
    File,
}

impl fmt::Display for IntegrityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntegrityLevel::Blob => "blob",
            IntegrityLevel::Chunk => "chunk",
            IntegrityLevel::File => "file",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{op} {id}: not found")]
    NotFound { op: Operation, id: String },

    #[error("{op} {id}: invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        op: Operation,
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("{op} {file_id} chunk {chunk_id}: authentication failed (corrupt blob or wrong key)")]
    AuthenticationFailed {
        op: Operation,
        file_id: String,
        chunk_id: String,
    },

    #[error("{op} {id}: {level} integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch {
        op: Operation,
        /// Chunk id for blob/chunk level, file id for file level
        id: String,
        level: IntegrityLevel,
        expected: String,
        actual: String,
    },

    #[error("store {file_id}: aborted at chunk {failed_index} ({persisted}/{total} persisted, rolled back): {source}")]
    PartialWrite {
        file_id: String,
        failed_index: u64,
        persisted: usize,
        total: usize,
        /// Blobs that could not be removed or restored during rollback
        rollback_failures: usize,
        #[source]
        source: StoreError,
    },

    #[error("{op} {id}: storage I/O failed: {source}")]
    StorageIo {
        op: Operation,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("{op} {id}: {source}")]
    Crypto {
        op: Operation,
        id: String,
        #[source]
        source: CryptoError,
    },

    #[error("{op} {id}: malformed file record: {reason}")]
    InvalidRecord {
        op: Operation,
        id: String,
        reason: String,
    },

    #[error("store {name}: file is {size} bytes, limit is {limit}")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    #[error("store {name}: quota exceeded: {projected} bytes projected, limit is {limit}")]
    QuotaExceeded {
        name: String,
        projected: u64,
        limit: u64,
    },

    #[error("metadata: {0}")]
    Metadata(#[from] DcsError),

    #[error("worker pool: {0}")]
    WorkerPool(String),
}

impl EngineError {
    /// Classify a blob-store failure: absence stays `NotFound`, everything
    /// else is an I/O failure.
    pub(crate) fn storage(op: Operation, id: impl fmt::Display, source: StoreError) -> Self {
        match source {
            StoreError::NotFound(_) => EngineError::NotFound {
                op,
                id: id.to_string(),
            },
            source => EngineError::StorageIo {
                op,
                id: id.to_string(),
                source,
            },
        }
    }

    /// Classify a crypto failure for `file_id`, optionally at `chunk_id`.
    pub(crate) fn crypto(
        op: Operation,
        file_id: impl fmt::Display,
        chunk_id: Option<&str>,
        source: CryptoError,
    ) -> Self {
        match source {
            CryptoError::InvalidKeyLength { expected, actual } => EngineError::InvalidKeyLength {
                op,
                id: file_id.to_string(),
                expected,
                actual,
            },
            CryptoError::AuthenticationFailed => EngineError::AuthenticationFailed {
                op,
                file_id: file_id.to_string(),
                chunk_id: chunk_id.unwrap_or_default().to_string(),
            },
            source => EngineError::Crypto {
                op,
                id: chunk_id.map(str::to_string).unwrap_or_else(|| file_id.to_string()),
                source,
            },
        }
    }
}

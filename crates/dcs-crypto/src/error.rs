use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Truncated or corrupted blob, or a blob sealed under another key.
    /// Never accompanied by partial plaintext.
    #[error("authentication failed: sealed blob is truncated, corrupted, or was sealed under a different key")]
    AuthenticationFailed,

    #[error("encryption failed")]
    SealFailed,

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("no encryption key available: {0}")]
    KeyUnavailable(String),

    #[error("key file {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

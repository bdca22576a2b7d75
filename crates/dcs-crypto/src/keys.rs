//! Encryption keys and key providers

use rand::RngCore;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::KEY_SIZE;

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from arbitrary-length input, rejecting anything other
    /// than exactly `KEY_SIZE` bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self::from_bytes(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit key.
pub fn generate_key() -> EncryptionKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    EncryptionKey::from_bytes(bytes)
}

/// Supplies the key for a file. Lifecycle and rotation live behind this trait.
pub trait KeyProvider: Send + Sync {
    fn key_for(&self, file_id: &str) -> Result<EncryptionKey, CryptoError>;
}

/// One key for every file
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: EncryptionKey,
}

impl StaticKeyProvider {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key_for(&self, _file_id: &str) -> Result<EncryptionKey, CryptoError> {
        Ok(self.key.clone())
    }
}

/// Reads the key from a raw 32-byte file on every request, so replacing
/// the file rotates the key for subsequent operations.
#[derive(Debug, Clone)]
pub struct KeyFileProvider {
    path: PathBuf,
}

impl KeyFileProvider {
    /// Use an existing key file; fails if it is missing or malformed.
    pub fn open(path: &Path) -> Result<Self, CryptoError> {
        load_key_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Write a freshly generated key to `path` and use it.
    pub fn create(path: &Path) -> Result<Self, CryptoError> {
        write_key_file(path, &generate_key())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyProvider for KeyFileProvider {
    fn key_for(&self, _file_id: &str) -> Result<EncryptionKey, CryptoError> {
        load_key_file(&self.path)
    }
}

/// Load a raw key file. The file must contain exactly `KEY_SIZE` bytes.
pub fn load_key_file(path: &Path) -> Result<EncryptionKey, CryptoError> {
    let mut raw = std::fs::read(path).map_err(|source| CryptoError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    let key = EncryptionKey::from_slice(&raw);
    raw.zeroize();
    key
}

/// Write a raw key file, owner-readable only on Unix.
pub fn write_key_file(path: &Path, key: &EncryptionKey) -> Result<(), CryptoError> {
    let io_err = |source| CryptoError::KeyFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, key.as_bytes()).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    tracing::debug!(path = %path.display(), "wrote key file");
    Ok(())
}

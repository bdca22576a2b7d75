//! dcs-crypto: authenticated encryption of chunk blobs
//!
//! Sealed blob format: `[24-byte nonce][ciphertext][16-byte Poly1305 tag]`
//!
//! Keys never live in this crate's state. Callers obtain an [`EncryptionKey`]
//! from a [`KeyProvider`] (or derive one from a passphrase via Argon2id) and
//! pass it into every seal/open call.

pub mod error;
pub mod kdf;
pub mod keys;
pub mod seal;

pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, KdfParams, SALT_SIZE};
pub use keys::{
    generate_key, load_key_file, write_key_file, EncryptionKey, KeyFileProvider, KeyProvider,
    StaticKeyProvider,
};
pub use seal::{open, seal};

/// Size of an encryption key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Bytes a sealed blob adds on top of its plaintext
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

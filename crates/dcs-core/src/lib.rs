pub mod config;
pub mod error;
pub mod types;

pub use error::{DcsError, DcsResult};
pub use types::{ChunkRecord, FileMeta, FileRecord};

/// Length of a hex-encoded content address
pub const ID_HEX_LEN: usize = 64;

/// Returns true if `id` is a well-formed content address (64 hex chars).
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_HEX_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Format a byte count for humans, 1024-based ("1.5 KB", "3.0 GB").
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = b"KMGTPE"[exp] as char;
    format!("{:.1} {suffix}B", bytes as f64 / div as f64)
}

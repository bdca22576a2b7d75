//! dcs-chunks: content addressing and fixed-size splitting
//!
//! # Overview
//! - `address`: deterministic BLAKE3 identifiers for files, chunks, and raw bytes
//! - `split`: order-preserving fixed-size segmentation and its inverse

pub mod address;
pub mod split;

pub use address::{chunk_id, file_id, hash_bytes, ContentId, ParseIdError, SHARD_PREFIX_LEN};
pub use split::{join, segment_count, split};

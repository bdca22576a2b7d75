//! Fixed-size splitting and its exact inverse
//!
//! Every segment except possibly the last is exactly `chunk_size` bytes.
//! Two inputs are returned whole as a single segment: a zero `chunk_size`,
//! and empty data (one empty segment, so an empty file still has a chunk).

/// Split `data` into ordered fixed-size segments borrowed from the input.
pub fn split(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if chunk_size == 0 || data.is_empty() {
        return vec![data];
    }
    data.chunks(chunk_size).collect()
}

/// Number of segments `split` would produce for `len` bytes.
pub fn segment_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 || len == 0 {
        1
    } else {
        len.div_ceil(chunk_size)
    }
}

/// Concatenate segments in order.
pub fn join<S: AsRef<[u8]>>(segments: &[S]) -> Vec<u8> {
    let total = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for segment in segments {
        out.extend_from_slice(segment.as_ref());
    }
    out
}

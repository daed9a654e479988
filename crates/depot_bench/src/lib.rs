//! Benchmark utilities.

/// Deterministic payload of the given size with no reserved bytes, so the
/// writer takes the raw (unescaped) path.
pub fn raw_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| b'a' + (i % 26) as u8).collect()
}

/// Deterministic payload where every fourth byte is reserved, forcing the
/// escaped encoding.
pub fn reserved_payload(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| if i % 4 == 0 { b'\n' } else { b'x' })
        .collect()
}

//! Voxel field geometry: grid shape, chunk layout derivation and the raw little-endian f64 wire form

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Grid dimensions. Samples are addressed `(i, j, k)` with flat index
/// `k * nx * ny + j * nx + i` (x fastest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 3]", into = "[u64; 3]")]
pub struct Shape {
    pub nx: u64,
    pub ny: u64,
    pub nz: u64,
}

impl Shape {
    pub fn new(nx: u64, ny: u64, nz: u64) -> Self {
        Self { nx, ny, nz }
    }

    /// Total number of samples in the grid
    pub fn len(&self) -> u64 {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<[u64; 3]> for Shape {
    fn from(v: [u64; 3]) -> Self {
        Self { nx: v[0], ny: v[1], nz: v[2] }
    }
}

impl From<Shape> for [u64; 3] {
    fn from(s: Shape) -> Self {
        [s.nx, s.ny, s.nz]
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

/// Half-open element range `[start, end)` of the flat sample array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkDescriptor {
    /// Number of f64 samples in the chunk
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition `[0, data_length)` into ascending chunks of `chunk_size` elements,
/// the last one possibly shorter. Empty input yields no chunks.
pub fn derive_chunks(data_length: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
    if data_length == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = data_length.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            ChunkDescriptor {
                index: i as u32,
                start,
                end: (start + chunk_size).min(data_length),
            }
        })
        .collect()
}

/// Encode samples as the little-endian f64 wire form
pub fn encode_f64_le(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode the little-endian f64 wire form; the byte length must be a whole
/// multiple of 8
pub fn decode_f64_le(bytes: &[u8]) -> Result<Vec<f64>> {
    if !bytes.len().is_multiple_of(8) {
        anyhow::bail!("payload length {} is not a multiple of 8", bytes.len());
    }

    Ok(bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

/// Single-pass min/max seeded from the first element. `None` for empty input;
/// callers treat that as an error rather than a +inf/-inf pair.
pub fn scan_min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    let mut min = first;
    let mut max = first;
    for &v in &values[1..] {
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_chunks_partition() {
        // 4x4x4 grid in chunks of 20: [0,20) [20,40) [40,60) [60,64)
        let chunks = derive_chunks(64, 20);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[3].end, 64);
        assert_eq!(chunks[3].len(), 4);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
        for c in &chunks[..3] {
            assert_eq!(c.len(), 20);
        }
    }

    #[test]
    fn test_derive_chunks_exact_fit() {
        let chunks = derive_chunks(40, 20);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 20));
    }

    #[test]
    fn test_derive_chunks_oversized_chunk() {
        let chunks = derive_chunks(7, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 7);
    }

    #[test]
    fn test_derive_chunks_empty() {
        assert!(derive_chunks(0, 20).is_empty());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let values = vec![0.0, -1.5, f64::MAX, f64::MIN_POSITIVE, 42.0];
        let bytes = encode_f64_le(&values);
        assert_eq!(bytes.len(), values.len() * 8);
        assert_eq!(decode_f64_le(&bytes).unwrap(), values);
    }

    #[test]
    fn test_decode_rejects_ragged_payload() {
        assert!(decode_f64_le(&[0u8; 9]).is_err());
    }

    #[test]
    fn test_scan_min_max() {
        assert_eq!(scan_min_max(&[3.0, -2.0, 7.5, 0.0]), Some((-2.0, 7.5)));
        assert_eq!(scan_min_max(&[1.0]), Some((1.0, 1.0)));
        assert_eq!(scan_min_max(&[]), None);
    }

    #[test]
    fn test_shape_serde_wire_form() {
        let shape = Shape::new(4, 5, 6);
        let json = serde_json::to_string(&shape).unwrap();
        assert_eq!(json, "[4,5,6]");
        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
        assert_eq!(back.len(), 120);
    }
}

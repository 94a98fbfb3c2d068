//! Iso-surface mesher contract. Extraction itself lives outside this crate;
//! the loader only promises the field buffer and its global min/max.

use crate::field::Shape;
use anyhow::Result;

/// Triangle mesh produced by an iso-surface extractor
#[derive(Debug, Clone, Default)]
pub struct SurfaceMesh {
    /// Vertex positions, xyz triples
    pub positions: Vec<f32>,
    /// Triangle vertex indices
    pub indices: Vec<u32>,
}

/// Extracts the surface `{p : field(p) == level}` from a loaded field.
/// `values` is the contiguous x-fastest sample buffer; `level` must lie
/// within the field's global min/max for a non-empty result.
pub trait SurfaceMesher {
    fn mesh(&self, shape: Shape, values: &[f64], level: f64) -> Result<SurfaceMesh>;
}

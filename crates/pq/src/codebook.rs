//! Subspace partitioning and per-subspace codebooks.

use crate::config::PqParams;
use crate::error::{PqError, PqResult};
use crate::kmeans::KMeansClusterer;
use rayon::prelude::*;
use std::ops::Range;
use tessera_core::{l2_distance_squared, Metric};

/// Centroids per codebook; one code fits in a byte.
pub const CODEBOOK_SIZE: usize = 256;

/// Split of `dim` dimensions into contiguous, non-overlapping spans.
///
/// Every span has `dim / m` dimensions; the first `dim % m` spans get one
/// extra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubspacePartition {
    dim: usize,
    sizes: Vec<usize>,
    offsets: Vec<usize>,
}

impl SubspacePartition {
    pub fn new(dim: usize, num_subspaces: usize) -> PqResult<Self> {
        if num_subspaces == 0 || num_subspaces > dim {
            return Err(PqError::InvalidConfiguration(format!(
                "cannot split {} dimensions into {} subspaces",
                dim, num_subspaces
            )));
        }

        let base = dim / num_subspaces;
        let remainder = dim % num_subspaces;
        let sizes: Vec<usize> = (0..num_subspaces)
            .map(|m| base + usize::from(m < remainder))
            .collect();

        let mut offsets = Vec::with_capacity(num_subspaces);
        let mut offset = 0;
        for &size in &sizes {
            offsets.push(offset);
            offset += size;
        }
        debug_assert_eq!(offset, dim);

        Ok(Self { dim, sizes, offsets })
    }

    /// Total dimension covered.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of subspaces (M).
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[inline]
    pub fn size(&self, m: usize) -> usize {
        self.sizes[m]
    }

    #[inline]
    pub fn offset(&self, m: usize) -> usize {
        self.offsets[m]
    }

    #[inline]
    pub fn span(&self, m: usize) -> Range<usize> {
        self.offsets[m]..self.offsets[m] + self.sizes[m]
    }

    /// The `m`-th span of `vector`.
    #[inline]
    pub fn subvector<'a>(&self, vector: &'a [f32], m: usize) -> &'a [f32] {
        &vector[self.span(m)]
    }

    #[inline]
    pub fn subvector_mut<'a>(&self, vector: &'a mut [f32], m: usize) -> &'a mut [f32] {
        &mut vector[self.span(m)]
    }

    /// Gather span `m` of every row of a flat `n × dim` buffer.
    pub fn gather(&self, rows: &[f32], m: usize) -> Vec<f32> {
        let span = self.span(m);
        let mut out = Vec::with_capacity(rows.len() / self.dim * span.len());
        for row in rows.chunks_exact(self.dim) {
            out.extend_from_slice(&row[span.clone()]);
        }
        out
    }
}

/// The 256 centroids of one subspace, stored contiguously.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    dim: usize,
    centroids: Vec<f32>,
}

impl Codebook {
    /// Wrap a flat buffer of exactly `CODEBOOK_SIZE * dim` values.
    pub fn from_flat(dim: usize, centroids: Vec<f32>) -> PqResult<Self> {
        if centroids.len() != CODEBOOK_SIZE * dim {
            return Err(PqError::DimensionMismatch {
                expected: CODEBOOK_SIZE * dim,
                got: centroids.len(),
            });
        }
        Ok(Self { dim, centroids })
    }

    /// Dimension of each centroid.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Always `CODEBOOK_SIZE`.
    #[inline]
    pub fn len(&self) -> usize {
        self.centroids.len() / self.dim
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Centroid for a code byte. The byte is widened, never sign-extended.
    #[inline]
    pub fn get(&self, code: u8) -> &[f32] {
        self.centroid(usize::from(code))
    }

    #[inline]
    pub fn centroid(&self, index: usize) -> &[f32] {
        &self.centroids[index * self.dim..(index + 1) * self.dim]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.centroids
    }

    /// Exhaustive nearest-centroid search.
    #[inline]
    pub fn nearest(&self, subvector: &[f32]) -> u8 {
        let mut best = 0usize;
        let mut best_dist = f32::MAX;

        for (k, centroid) in self.centroids.chunks_exact(self.dim).enumerate() {
            let dist = l2_distance_squared(subvector, centroid);
            if dist < best_dist {
                best_dist = dist;
                best = k;
            }
        }

        debug_assert!(best < CODEBOOK_SIZE);
        best as u8
    }
}

/// Train one codebook per subspace of a flat `n × dim` buffer.
///
/// Subspaces are clustered independently in parallel. Either every codebook
/// is produced or an error is returned.
pub fn train_codebooks(
    rows: &[f32],
    partition: &SubspacePartition,
    params: &PqParams,
) -> PqResult<Vec<Codebook>> {
    (0..partition.len())
        .into_par_iter()
        .map(|m| -> PqResult<Codebook> {
            let points = partition.gather(rows, m);
            let config = params.kmeans_config(m);
            let mut clusterer = KMeansClusterer::new(points, partition.size(m), &config, Metric::L2)?;
            let (iterations, converged) = clusterer.run(config.max_iterations);
            tracing::debug!(subspace = m, iterations, converged, "trained codebook");
            Codebook::from_flat(partition.size(m), clusterer.into_centroids())
        })
        .collect()
}

//! The trained product quantizer: encode, decode and asymmetric scoring.

use crate::codebook::{train_codebooks, Codebook, SubspacePartition, CODEBOOK_SIZE};
use crate::config::{PqParams, RotationKind};
use crate::error::{PqError, PqResult};
use crate::opq::{pca_rotation, train_rotation, Rotation};
use crate::source::VectorSource;
use rayon::prelude::*;
use std::borrow::Cow;
use std::time::Instant;
use tessera_core::{add_in_place, dot_product, l2_distance_squared, mean_of_rows, sub, sub_in_place};
use tracing::info;

/// A trained product quantizer.
///
/// Immutable after training; safe to share across threads for concurrent
/// encode, decode and scoring.
#[derive(Debug, Clone)]
pub struct ProductQuantizer {
    partition: SubspacePartition,
    codebooks: Vec<Codebook>,
    global_centroid: Option<Vec<f32>>,
    rotation: Option<Rotation>,
    fast_dot_product: bool,
}

impl ProductQuantizer {
    /// Train on every vector of `source`.
    ///
    /// Steps: validate, center (optional), rotate (optional), then cluster
    /// each subspace into 256 centroids. Either a complete model is returned
    /// or an error.
    pub fn train<S: VectorSource + ?Sized>(source: &S, params: &PqParams) -> PqResult<Self> {
        let start = Instant::now();
        let n = source.len();
        if n == 0 {
            return Err(PqError::EmptyTrainingSet);
        }
        let dim = source.dimension();
        params.validate(dim, n)?;

        let mut rows = Vec::with_capacity(n * dim);
        for i in 0..n {
            let v = source.vector(i);
            if v.len() != dim {
                return Err(PqError::DimensionMismatch {
                    expected: dim,
                    got: v.len(),
                });
            }
            rows.extend_from_slice(v);
        }

        info!(
            vectors = n,
            dim,
            subspaces = params.num_subspaces,
            centering = params.global_centering,
            rotation = ?params.rotation,
            "Training product quantizer"
        );

        let partition = SubspacePartition::new(dim, params.num_subspaces)?;

        let global_centroid = if params.global_centering {
            let centroid = mean_of_rows(&rows, dim)?;
            for row in rows.chunks_exact_mut(dim) {
                sub_in_place(row, &centroid)?;
            }
            Some(centroid)
        } else {
            None
        };

        let (rotation, codebooks) = match &params.rotation {
            RotationKind::None => (None, train_codebooks(&rows, &partition, params)?),
            RotationKind::Opq(opq) => {
                let trained = train_rotation(&rows, &partition, params, opq)?;
                (Some(trained.rotation), trained.codebooks)
            }
            RotationKind::Pca => {
                let rotation = pca_rotation(&rows, dim)?;
                let rotated = rotation.rotate_rows(&rows);
                let codebooks = train_codebooks(&rotated, &partition, params)?;
                (Some(rotation), codebooks)
            }
        };
        debug_assert!(codebooks.iter().all(|c| c.len() == CODEBOOK_SIZE));

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Product quantizer trained"
        );

        Ok(Self {
            partition,
            codebooks,
            global_centroid,
            rotation,
            fast_dot_product: params.fast_dot_product,
        })
    }

    /// Convenience for an in-memory list.
    pub fn train_vectors(vectors: &[Vec<f32>], params: &PqParams) -> PqResult<Self> {
        Self::train(vectors, params)
    }

    /// Encode `vector` into `num_subspaces()` bytes.
    pub fn encode(&self, vector: &[f32]) -> PqResult<Vec<u8>> {
        let mut code = vec![0u8; self.num_subspaces()];
        self.encode_into(vector, &mut code)?;
        Ok(code)
    }

    /// Encode into a caller-owned buffer of exactly `num_subspaces()` bytes.
    pub fn encode_into(&self, vector: &[f32], code: &mut [u8]) -> PqResult<()> {
        self.check_dimension(vector.len())?;
        self.check_code(code.len())?;

        let prepared = self.prepare(vector)?;
        for (m, (slot, codebook)) in code.iter_mut().zip(&self.codebooks).enumerate() {
            *slot = codebook.nearest(self.partition.subvector(&prepared, m));
        }
        Ok(())
    }

    /// Reconstruct the approximate vector for `code` into `target`.
    ///
    /// `target` must have length `dimension()`. Never allocates.
    pub fn decode_into<'t>(&self, code: &[u8], target: &'t mut [f32]) -> PqResult<&'t mut [f32]> {
        self.check_code(code.len())?;
        self.check_dimension(target.len())?;

        match &self.rotation {
            None => self.copy_centroids(code, target),
            Some(rotation) => {
                // Rᵗ·c == Σ_j c[j]·R.row(j)
                target.fill(0.0);
                for (m, (&c, codebook)) in code.iter().zip(&self.codebooks).enumerate() {
                    let offset = self.partition.span(m).start;
                    for (j, &cj) in codebook.get(c).iter().enumerate() {
                        let row = rotation.matrix().row(offset + j);
                        for (t, &r) in target.iter_mut().zip(row) {
                            *t += cj * r;
                        }
                    }
                }
            }
        }

        if let Some(centroid) = &self.global_centroid {
            add_in_place(target, centroid)?;
        }
        Ok(target)
    }

    /// Allocating form of [`decode_into`](Self::decode_into).
    pub fn decode(&self, code: &[u8]) -> PqResult<Vec<f32>> {
        let mut target = vec![0.0f32; self.dimension()];
        self.decode_into(code, &mut target)?;
        Ok(target)
    }

    /// Dot product of `query` with the decoded form of `code`, computed
    /// subspace by subspace without materializing the decoded vector.
    ///
    /// Fails with [`PqError::FastPathMisuse`] on a centered model.
    ///
    /// Rotated models rotate `query` on every call; when scoring many codes
    /// against one query, build a [`scorer`](Self::scorer) once instead.
    pub fn decoded_dot_product(&self, code: &[u8], query: &[f32]) -> PqResult<f32> {
        self.check_fast_path()?;
        self.check_code(code.len())?;
        self.check_dimension(query.len())?;

        // dot(Rᵗc, q) == dot(c, R·q)
        let query = self.prepare(query)?;
        let mut sum = 0.0f32;
        for (m, (&c, codebook)) in code.iter().zip(&self.codebooks).enumerate() {
            sum += dot_product(codebook.get(c), self.partition.subvector(&query, m));
        }
        Ok(sum)
    }

    /// Precompute per-centroid dot products for `query` so each candidate
    /// costs `num_subspaces()` lookups.
    pub fn scorer(&self, query: &[f32]) -> PqResult<QueryScorer> {
        self.check_fast_path()?;
        self.check_dimension(query.len())?;

        let query = self.prepare(query)?;
        let mut table = vec![0.0f32; self.num_subspaces() * CODEBOOK_SIZE];
        for (m, (row, codebook)) in table
            .chunks_exact_mut(CODEBOOK_SIZE)
            .zip(&self.codebooks)
            .enumerate()
        {
            let q = self.partition.subvector(&query, m);
            for (k, slot) in row.iter_mut().enumerate() {
                *slot = dot_product(codebook.centroid(k), q);
            }
        }

        Ok(QueryScorer {
            table,
            num_subspaces: self.num_subspaces(),
        })
    }

    /// Mean squared reconstruction error over `source`.
    pub fn reconstruction_error<S: VectorSource + ?Sized>(&self, source: &S) -> PqResult<f32> {
        let n = source.len();
        if n == 0 {
            return Err(PqError::EmptyTrainingSet);
        }

        let total = (0..n)
            .into_par_iter()
            .map(|i| -> PqResult<f64> {
                let v = source.vector(i);
                let decoded = self.decode(&self.encode(v)?)?;
                Ok(l2_distance_squared(v, &decoded) as f64)
            })
            .collect::<PqResult<Vec<_>>>()?
            .into_iter()
            .sum::<f64>();

        Ok((total / n as f64) as f32)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.partition.dim()
    }

    /// Number of subspaces (M), which is also the code length in bytes.
    #[inline]
    pub fn num_subspaces(&self) -> usize {
        self.partition.len()
    }

    #[inline]
    pub fn partition(&self) -> &SubspacePartition {
        &self.partition
    }

    pub fn codebooks(&self) -> &[Codebook] {
        &self.codebooks
    }

    pub fn codebook(&self, m: usize) -> Option<&Codebook> {
        self.codebooks.get(m)
    }

    pub fn global_centroid(&self) -> Option<&[f32]> {
        self.global_centroid.as_deref()
    }

    pub fn rotation(&self) -> Option<&Rotation> {
        self.rotation.as_ref()
    }

    pub fn uses_fast_dot_product(&self) -> bool {
        self.fast_dot_product && self.global_centroid.is_none()
    }

    /// Center, then rotate. Borrows the input when neither applies.
    fn prepare<'v>(&self, vector: &'v [f32]) -> PqResult<Cow<'v, [f32]>> {
        let centered = match &self.global_centroid {
            Some(centroid) => Cow::Owned(sub(vector, centroid)?),
            None => Cow::Borrowed(vector),
        };
        match &self.rotation {
            Some(rotation) => Ok(Cow::Owned(rotation.rotate(&centered)?)),
            None => Ok(centered),
        }
    }

    fn copy_centroids(&self, code: &[u8], target: &mut [f32]) {
        for (m, (&c, codebook)) in code.iter().zip(&self.codebooks).enumerate() {
            self.partition
                .subvector_mut(target, m)
                .copy_from_slice(codebook.get(c));
        }
    }

    fn check_dimension(&self, got: usize) -> PqResult<()> {
        if got != self.dimension() {
            return Err(PqError::DimensionMismatch {
                expected: self.dimension(),
                got,
            });
        }
        Ok(())
    }

    fn check_code(&self, got: usize) -> PqResult<()> {
        if got != self.num_subspaces() {
            return Err(PqError::InvalidCodeLength {
                expected: self.num_subspaces(),
                got,
            });
        }
        Ok(())
    }

    fn check_fast_path(&self) -> PqResult<()> {
        if self.uses_fast_dot_product() {
            Ok(())
        } else {
            Err(PqError::FastPathMisuse)
        }
    }
}

/// Dot-product lookup table for one query.
///
/// Layout: `[M][256]`, entry `[m][k]` = dot of query span `m` with centroid `k`.
#[derive(Debug, Clone)]
pub struct QueryScorer {
    table: Vec<f32>,
    num_subspaces: usize,
}

impl QueryScorer {
    /// Unchecked lookup; callers guarantee `code.len() == num_subspaces`.
    #[inline]
    pub(crate) fn score(&self, code: &[u8]) -> f32 {
        debug_assert_eq!(code.len(), self.num_subspaces);
        let mut sum = 0.0f32;
        for (row, &c) in self.table.chunks_exact(CODEBOOK_SIZE).zip(code) {
            sum += row[usize::from(c)];
        }
        sum
    }

    /// Approximate dot product for one code of `num_subspaces()` bytes.
    pub fn try_score(&self, code: &[u8]) -> PqResult<f32> {
        if code.len() != self.num_subspaces {
            return Err(PqError::InvalidCodeLength {
                expected: self.num_subspaces,
                got: code.len(),
            });
        }
        Ok(self.score(code))
    }

    #[inline]
    pub fn num_subspaces(&self) -> usize {
        self.num_subspaces
    }
}

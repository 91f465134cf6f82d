//! Random-access vector collections, raw and encoded.

use crate::encoding::encode_all;
use crate::error::{PqError, PqResult};
use crate::quantizer::{ProductQuantizer, QueryScorer};

/// Indexed, read-only access to a set of equal-length vectors.
///
/// Implementations must be shareable across the worker pool.
pub trait VectorSource: Sync {
    /// Number of vectors.
    fn len(&self) -> usize;

    /// Length of every vector.
    fn dimension(&self) -> usize;

    /// The `i`-th vector. Panics if `i >= len()`.
    fn vector(&self, i: usize) -> &[f32];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorSource for [Vec<f32>] {
    fn len(&self) -> usize {
        <[Vec<f32>]>::len(self)
    }

    fn dimension(&self) -> usize {
        self.first().map_or(0, Vec::len)
    }

    fn vector(&self, i: usize) -> &[f32] {
        &self[i]
    }
}

impl VectorSource for Vec<Vec<f32>> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn dimension(&self) -> usize {
        VectorSource::dimension(self.as_slice())
    }

    fn vector(&self, i: usize) -> &[f32] {
        &self[i]
    }
}

/// An owned list of vectors whose dimension is checked up front.
#[derive(Debug, Clone, PartialEq)]
pub struct ListVectorSource {
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

impl ListVectorSource {
    pub fn new(vectors: Vec<Vec<f32>>) -> PqResult<Self> {
        let dim = vectors.first().map(Vec::len).ok_or(PqError::EmptyTrainingSet)?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(PqError::DimensionMismatch {
                expected: dim,
                got: bad.len(),
            });
        }
        Ok(Self { vectors, dim })
    }

    pub fn into_inner(self) -> Vec<Vec<f32>> {
        self.vectors
    }
}

impl VectorSource for ListVectorSource {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn vector(&self, i: usize) -> &[f32] {
        &self.vectors[i]
    }
}

/// Encoded vectors backed by the quantizer that produced them.
///
/// Serves the `(candidate, query) -> score` callback a graph search needs
/// without decoding candidates.
#[derive(Debug, Clone)]
pub struct EncodedVectorSource<'a> {
    quantizer: &'a ProductQuantizer,
    codes: Vec<Vec<u8>>,
}

impl<'a> EncodedVectorSource<'a> {
    /// Wrap existing codes; every code must be `num_subspaces` bytes.
    pub fn new(quantizer: &'a ProductQuantizer, codes: Vec<Vec<u8>>) -> PqResult<Self> {
        let expected = quantizer.num_subspaces();
        if let Some(bad) = codes.iter().find(|c| c.len() != expected) {
            return Err(PqError::InvalidCodeLength {
                expected,
                got: bad.len(),
            });
        }
        Ok(Self { quantizer, codes })
    }

    /// Encode every vector of `source` in parallel.
    pub fn encode<S: VectorSource + ?Sized>(
        quantizer: &'a ProductQuantizer,
        source: &S,
    ) -> PqResult<Self> {
        let codes = encode_all(quantizer, source)?;
        Ok(Self { quantizer, codes })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.quantizer.dimension()
    }

    #[inline]
    pub fn code(&self, i: usize) -> &[u8] {
        &self.codes[i]
    }

    pub fn quantizer(&self) -> &'a ProductQuantizer {
        self.quantizer
    }

    pub fn decode_into<'t>(&self, i: usize, target: &'t mut [f32]) -> PqResult<&'t mut [f32]> {
        self.quantizer.decode_into(&self.codes[i], target)
    }

    /// One-off score. Rotated models redo the query rotation each call;
    /// [`scorer`](Self::scorer) pays it once per query.
    pub fn decoded_dot_product(&self, i: usize, query: &[f32]) -> PqResult<f32> {
        self.quantizer.decoded_dot_product(&self.codes[i], query)
    }

    /// Dot-product similarity mapped to `[0, 1]` for unit vectors:
    /// `(1 + dot) / 2`.
    pub fn decoded_score(&self, i: usize, query: &[f32]) -> PqResult<f32> {
        Ok(similarity(self.decoded_dot_product(i, query)?))
    }

    /// Prepare `query` once for scoring many candidates.
    pub fn scorer(&self, query: &[f32]) -> PqResult<EncodedScorer<'_>> {
        Ok(EncodedScorer {
            codes: &self.codes,
            scorer: self.quantizer.scorer(query)?,
        })
    }
}

/// Per-query scoring callback over an [`EncodedVectorSource`].
pub struct EncodedScorer<'s> {
    codes: &'s [Vec<u8>],
    scorer: QueryScorer,
}

impl EncodedScorer<'_> {
    /// Same mapping as [`EncodedVectorSource::decoded_score`].
    #[inline]
    pub fn score(&self, i: usize) -> f32 {
        similarity(self.scorer.score(&self.codes[i]))
    }
}

#[inline]
fn similarity(dot: f32) -> f32 {
    (1.0 + dot) / 2.0
}

//! Batch encoding and decoding against a shared quantizer.

use crate::error::PqResult;
use crate::quantizer::ProductQuantizer;
use crate::source::VectorSource;
use rayon::prelude::*;

/// Encode every vector of `source` in parallel.
///
/// Fails on the first vector with the wrong dimension.
pub fn encode_all<S: VectorSource + ?Sized>(
    quantizer: &ProductQuantizer,
    source: &S,
) -> PqResult<Vec<Vec<u8>>> {
    (0..source.len())
        .into_par_iter()
        .map(|i| quantizer.encode(source.vector(i)))
        .collect()
}

/// Encode into one contiguous buffer of `len * num_subspaces` bytes.
pub fn encode_all_flat<S: VectorSource + ?Sized>(
    quantizer: &ProductQuantizer,
    source: &S,
) -> PqResult<Vec<u8>> {
    let m = quantizer.num_subspaces();
    let mut codes = vec![0u8; source.len() * m];
    codes
        .par_chunks_exact_mut(m)
        .enumerate()
        .try_for_each(|(i, code)| quantizer.encode_into(source.vector(i), code))?;
    Ok(codes)
}

/// Decode multiple codes in parallel.
pub fn decode_all(quantizer: &ProductQuantizer, codes: &[Vec<u8>]) -> PqResult<Vec<Vec<f32>>> {
    codes.par_iter().map(|code| quantizer.decode(code)).collect()
}

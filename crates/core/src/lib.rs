//! Vector math kernels and distance metrics for Tessera.
//!
//! Everything in here operates on flat `f32` slices. The unchecked kernels
//! (`l2_distance_squared`, `dot_product`) are the innermost loops of codebook
//! training and encoding; the checked variants guard public entry points.

pub mod distance;
pub mod error;
pub mod matrix;
pub mod metric;
pub mod ops;

pub use distance::{dot, dot_product, l2_distance, l2_distance_squared, squared_distance};
pub use error::{MathError, MathResult};
pub use matrix::Matrix;
pub use metric::{DistanceFunction, Metric};
pub use ops::{add_in_place, centroid_of, div_in_place, mean_of_rows, sub, sub_in_place};

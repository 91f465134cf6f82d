//! PQ configuration types.

use crate::codebook::CODEBOOK_SIZE;
use crate::error::{PqError, PqResult};
use serde::{Deserialize, Serialize};

/// Default cap on Lloyd's iterations per clustering.
pub const DEFAULT_KMEANS_ITERATIONS: usize = 15;

/// Default number of alternating rotation/codebook rounds.
pub const DEFAULT_OPQ_ITERATIONS: usize = 15;

/// Configuration for k-means clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Number of clusters (k).
    pub num_clusters: usize,
    /// Maximum Lloyd's iterations.
    pub max_iterations: usize,
    /// Stop once the fraction of points that changed cluster is at or below this.
    pub convergence_ratio: f64,
    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl KMeansConfig {
    pub fn new(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            num_clusters: CODEBOOK_SIZE,
            max_iterations: DEFAULT_KMEANS_ITERATIONS,
            convergence_ratio: 0.01,
            seed: None,
        }
    }
}

/// Parameters for the OPQ rotation search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpqParams {
    /// Number of alternating rounds (rotation update + re-clustering).
    pub iterations: usize,

    /// Lloyd's iterations for the initial per-subspace clustering. Later
    /// rounds continue from the previous codebooks with a single step.
    pub kmeans_iterations: usize,
}

impl OpqParams {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_kmeans_iterations(mut self, iterations: usize) -> Self {
        self.kmeans_iterations = iterations;
        self
    }
}

impl Default for OpqParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_OPQ_ITERATIONS,
            kmeans_iterations: DEFAULT_KMEANS_ITERATIONS,
        }
    }
}

/// Which rotation, if any, is applied before splitting into subspaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RotationKind {
    /// Axis-aligned subspaces.
    #[default]
    None,

    /// Rotation learned by alternating optimization against the codebooks.
    Opq(OpqParams),

    /// Principal axes of the (centered) training set.
    Pca,
}

impl RotationKind {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, RotationKind::None)
    }
}

/// Parameters for Product Quantization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PqParams {
    /// Number of subspaces (M). Must satisfy 1 <= M <= dimension.
    pub num_subspaces: usize,

    /// Subtract the training mean before quantizing.
    pub global_centering: bool,

    /// Rotation applied after centering.
    #[serde(default)]
    pub rotation: RotationKind,

    /// Maximum Lloyd's iterations per codebook.
    pub kmeans_iterations: usize,

    /// Whether the model will serve `decoded_dot_product`. Incompatible with
    /// global centering.
    pub fast_dot_product: bool,

    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl PqParams {
    /// Create new PQ parameters with defaults.
    pub fn new(num_subspaces: usize) -> Self {
        Self {
            num_subspaces,
            global_centering: false,
            rotation: RotationKind::None,
            kmeans_iterations: DEFAULT_KMEANS_ITERATIONS,
            fast_dot_product: true,
            seed: None,
        }
    }

    /// Center globally. This also turns off the decoded dot product, which
    /// cannot account for the centroid offset.
    pub fn with_global_centering(mut self) -> Self {
        self.global_centering = true;
        self.fast_dot_product = false;
        self
    }

    /// Learn an OPQ rotation with default parameters.
    pub fn with_rotation(self) -> Self {
        self.with_opq_params(OpqParams::default())
    }

    pub fn with_opq_params(mut self, params: OpqParams) -> Self {
        self.rotation = RotationKind::Opq(params);
        self
    }

    pub fn with_pca_rotation(mut self) -> Self {
        self.rotation = RotationKind::Pca;
        self
    }

    pub fn with_kmeans_iterations(mut self, iterations: usize) -> Self {
        self.kmeans_iterations = iterations;
        self
    }

    pub fn with_fast_dot_product(mut self) -> Self {
        self.fast_dot_product = true;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate parameters against a training set of `count` vectors of
    /// dimension `dim`.
    pub fn validate(&self, dim: usize, count: usize) -> PqResult<()> {
        if self.num_subspaces == 0 {
            return Err(PqError::InvalidConfiguration(
                "num_subspaces must be > 0".to_string(),
            ));
        }
        if self.num_subspaces > dim {
            return Err(PqError::InvalidConfiguration(format!(
                "num_subspaces {} exceeds dimension {}",
                self.num_subspaces, dim
            )));
        }
        if self.kmeans_iterations == 0 {
            return Err(PqError::InvalidConfiguration(
                "kmeans_iterations must be > 0".to_string(),
            ));
        }
        if let RotationKind::Opq(opq) = &self.rotation {
            if opq.iterations == 0 || opq.kmeans_iterations == 0 {
                return Err(PqError::InvalidConfiguration(
                    "OPQ iterations must be > 0".to_string(),
                ));
            }
        }
        if self.global_centering && self.fast_dot_product {
            return Err(PqError::FastPathMisuse);
        }
        if count < CODEBOOK_SIZE {
            return Err(PqError::TrainingSetTooSmall {
                min: CODEBOOK_SIZE,
                got: count,
            });
        }
        Ok(())
    }

    /// Clustering configuration for subspace `m`.
    pub fn kmeans_config(&self, m: usize) -> KMeansConfig {
        KMeansConfig {
            num_clusters: CODEBOOK_SIZE,
            max_iterations: self.kmeans_iterations,
            convergence_ratio: 0.01,
            seed: self.seed.map(|s| s.wrapping_add(m as u64)),
        }
    }
}

impl Default for PqParams {
    fn default() -> Self {
        Self::new(8)
    }
}

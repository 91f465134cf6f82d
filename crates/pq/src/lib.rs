//! Product Quantization (PQ) and Optimized Product Quantization (OPQ) for Tessera.
//!
//! This crate implements:
//! - K-means++ clustering with Lloyd's refinement and triangle-inequality pruning
//! - PQ: splits vectors into M contiguous subspaces, each quantized to one of
//!   256 centroids, so a code is M bytes
//! - OPQ: a learned orthogonal rotation applied before PQ for lower distortion
//!   (PCA axes are available as a cheaper alternative)
//! - Asymmetric scoring: dot products between a full-precision query and an
//!   encoded vector without decoding it
//!
//! # Example
//! ```ignore
//! use tessera_pq::{PqParams, ProductQuantizer};
//!
//! let params = PqParams::new(8).with_rotation(); // 8 subspaces, OPQ
//! let pq = ProductQuantizer::train(&training_vectors, &params)?;
//! let code = pq.encode(&vector)?; // 8 bytes
//! let approx = pq.decode(&code)?;
//! let score = pq.decoded_dot_product(&code, &query)?;
//! ```

pub mod codebook;
pub mod config;
pub mod encoding;
pub mod error;
pub mod kmeans;
pub mod opq;
pub mod quantizer;
pub mod source;

pub use codebook::{train_codebooks, Codebook, SubspacePartition, CODEBOOK_SIZE};
pub use config::{KMeansConfig, OpqParams, PqParams, RotationKind};
pub use encoding::{decode_all, encode_all, encode_all_flat};
pub use error::{PqError, PqResult};
pub use kmeans::{kmeans, kmeans_with, KMeansClusterer, KMeansResult};
pub use opq::{pca_rotation, train_rotation, Rotation, RotationTraining};
pub use quantizer::{ProductQuantizer, QueryScorer};
pub use source::{EncodedScorer, EncodedVectorSource, ListVectorSource, VectorSource};

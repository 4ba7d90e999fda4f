//! Unsupervised fitting primitives for the opcost cost model.
//!
//! This crate provides the two numeric fits the training phase needs, on
//! plain row-major `f64` data:
//!
//! - [`fit_pca`]: principal component analysis via a cyclic Jacobi
//!   eigendecomposition of the sample covariance matrix.
//! - [`fit_kmeans`]: Lloyd's k-means with k-means++ seeding.
//!
//! Both fits are deterministic given their parameters. The only source of
//! randomness is the seeded generator inside k-means, so two runs with the
//! same seed on the same data produce identical centroids.

mod kmeans;
mod pca;
mod rng;

pub use kmeans::{KMeansFit, KMeansParams, fit_kmeans};
pub use pca::{PcaFit, PcaParams, fit_pca};

//! Clustering of joint optical-depth / cloud-top-height histograms into
//! cloud regimes, by Euclidean or Earth Mover's Distance k-means.
//!
//! The crate is the clustering engine only: it consumes an already-validated
//! (n, d) histogram matrix plus optional per-row weights, and produces
//! centroids, labels, and inertia diagnostics. Dataset loading, masking, and
//! plotting live with the caller.

pub mod classify;
pub mod diagnostics;
pub mod distance;
pub mod error;
pub mod fit;
pub mod init;
pub mod lattice;
pub mod lloyd;

mod emd;

pub use classify::classify;
pub use diagnostics::{centroid_correlation, relative_frequency};
pub use distance::{DistanceEngine, DistanceMetric};
pub use error::{ClusterError, Result};
pub use fit::{fit, FitResult, KMeansConfig};
pub use init::InitMethod;
pub use lattice::BinLattice;
pub use lloyd::RunResult;

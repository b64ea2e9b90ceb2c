use thiserror::Error;

/// Errors raised by the clustering engine.
///
/// Only contract violations are errors. Recoverable conditions
/// (non-convergence at the hard iteration stop, a cluster losing all of its
/// members mid-run) are reported through result flags and `log` warnings
/// instead, alongside a valid best-effort result.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Dimension disagreement between the histogram matrix, a centroid set,
    /// or the bin lattice. Raised before any computation starts.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An argument that is invalid regardless of shapes, e.g. `k` larger
    /// than the number of histograms, or a negative weight.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClusterError {
    /// Create a `ShapeMismatch` error with a descriptive message.
    pub fn shape_mismatch<S: Into<String>>(msg: S) -> Self {
        ClusterError::ShapeMismatch(msg.into())
    }

    /// Create an `InvalidArgument` error with a descriptive message.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        ClusterError::InvalidArgument(msg.into())
    }
}

/// Convenience result type for clustering operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

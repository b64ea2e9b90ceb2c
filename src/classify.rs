use ndarray::{Array1, ArrayView2};

use crate::distance::{argmin_rows, DistanceEngine, DistanceMetric};
use crate::error::{ClusterError, Result};
use crate::lattice::BinLattice;

/// Assign every histogram to its nearest centroid from a fixed set.
///
/// This is the entry point for applying a previously fitted regime
/// definition to new data: the centroids arrive as a plain in-memory array
/// (loading them from persisted storage is the caller's concern), and only
/// the label vector comes back. No update step, no iteration, no
/// randomness.
///
/// # Errors
///
/// `ShapeMismatch` if the centroid or histogram width disagrees with the
/// lattice size.
///
/// # Examples
///
/// ```
/// use cloud_regimes::{classify, BinLattice, DistanceMetric};
/// use ndarray::array;
///
/// let lattice = BinLattice::new(1, 2);
/// let mat = array![[0.9, 0.1], [0.2, 0.8]];
/// let regimes = array![[1.0, 0.0], [0.0, 1.0]];
/// let labels = classify(mat.view(), regimes.view(), DistanceMetric::Euclidean, &lattice).unwrap();
/// assert_eq!(labels.to_vec(), vec![0, 1]);
/// ```
pub fn classify(
    mat: ArrayView2<'_, f64>,
    centroids: ArrayView2<'_, f64>,
    metric: DistanceMetric,
    lattice: &BinLattice,
) -> Result<Array1<usize>> {
    if centroids.nrows() == 0 {
        return Err(ClusterError::invalid_argument(
            "centroid set must contain at least one regime",
        ));
    }
    let engine = DistanceEngine::new(metric, lattice.clone());
    let distances = engine.pairwise(mat, centroids)?;
    Ok(argmin_rows(&distances))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn assigns_nearest_centroid() {
        let lattice = BinLattice::new(2, 2);
        let mat = array![
            [0.9, 0.1, 0.0, 0.0],
            [0.0, 0.0, 0.2, 0.8],
            [0.7, 0.3, 0.0, 0.0],
        ];
        let centroids = array![[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]];
        let labels =
            classify(mat.view(), centroids.view(), DistanceMetric::Euclidean, &lattice).unwrap();
        assert_eq!(labels.to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn emd_classification_matches_geometry() {
        let lattice = BinLattice::new(2, 2);
        // Point mass at (0,0) vs point mass at (1,1).
        let mat = array![[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]];
        let centroids = array![[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]];
        let labels = classify(mat.view(), centroids.view(), DistanceMetric::Emd, &lattice).unwrap();
        assert_eq!(labels.to_vec(), vec![0, 1]);
    }

    #[test]
    fn rejects_centroid_width_mismatch() {
        let lattice = BinLattice::new(2, 2);
        let mat = array![[0.9, 0.1, 0.0, 0.0]];
        let centroids = array![[1.0, 0.0]];
        let err = classify(mat.view(), centroids.view(), DistanceMetric::Euclidean, &lattice)
            .unwrap_err();
        assert!(matches!(err, ClusterError::ShapeMismatch(_)));
    }

    #[test]
    fn rejects_empty_centroid_set() {
        let lattice = BinLattice::new(1, 2);
        let mat = array![[0.9, 0.1]];
        let centroids = ndarray::Array2::<f64>::zeros((0, 2));
        let err = classify(mat.view(), centroids.view(), DistanceMetric::Euclidean, &lattice)
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidArgument(_)));
    }
}

use log::info;
use ndarray::{s, Array2, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::distance::DistanceEngine;
use crate::error::{ClusterError, Result};

/// Centroid initialization strategy.
///
/// A small closed set of named strategies dispatched by match; the engine
/// never inspects types at runtime.
#[derive(Debug, Clone)]
pub enum InitMethod {
    /// k distinct histogram rows sampled uniformly without replacement.
    Random,
    /// Greedy-probabilistic seeding: each new centroid is drawn with
    /// probability proportional to a row's distance (under the selected
    /// metric) to its nearest already-chosen centroid.
    KMeansPlusPlus,
    /// A caller-supplied (k, d) centroid array, used as-is. Restarts
    /// collapse to a single run under this mode.
    Supplied(Array2<f64>),
}

/// Produce the initial (k, d) centroid set for one run.
pub(crate) fn initial_centroids(
    mat: ArrayView2<'_, f64>,
    k: usize,
    method: &InitMethod,
    engine: &DistanceEngine,
    rng: &mut ChaCha8Rng,
) -> Result<Array2<f64>> {
    let n = mat.nrows();
    match method {
        InitMethod::Random => {
            if k > n {
                return Err(ClusterError::invalid_argument(format!(
                    "cannot draw {k} distinct initial centroids from {n} histograms"
                )));
            }
            let indices = rand::seq::index::sample(rng, n, k).into_vec();
            Ok(mat.select(Axis(0), &indices))
        }
        InitMethod::KMeansPlusPlus => {
            if k > n {
                return Err(ClusterError::invalid_argument(format!(
                    "cannot seed {k} centroids from {n} histograms"
                )));
            }
            kmeans_plus_plus(mat, k, engine, rng)
        }
        InitMethod::Supplied(centroids) => {
            let d = engine.lattice().len();
            if centroids.dim() != (k, d) {
                return Err(ClusterError::shape_mismatch(format!(
                    "supplied centroids have shape {:?} but ({k}, {d}) is required",
                    centroids.dim()
                )));
            }
            Ok(centroids.clone())
        }
    }
}

/// Greedy-probabilistic ("k-means++") seeding.
///
/// The first centroid is a uniformly random row. Each subsequent centroid is
/// drawn over all rows with probability proportional to the row's distance
/// to its nearest already-chosen centroid. The min-distance cache grows
/// incrementally: one (n, 1) distance evaluation per new centroid, folded
/// into the running minimum, never a recompute against all previous picks.
fn kmeans_plus_plus(
    mat: ArrayView2<'_, f64>,
    k: usize,
    engine: &DistanceEngine,
    rng: &mut ChaCha8Rng,
) -> Result<Array2<f64>> {
    let n = mat.nrows();
    let d = mat.ncols();

    let mut centroids = Array2::zeros((k, d));
    let mut chosen = Vec::with_capacity(k);

    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&mat.row(first));
    chosen.push(first);

    let mut min_dists = vec![f64::INFINITY; n];
    for c in 1..k {
        // Distances to the newest centroid only; prior minima are cached.
        let newest = centroids.slice(s![c - 1..c, ..]);
        let dists = engine.pairwise(mat, newest)?;
        for (cached, &fresh) in min_dists.iter_mut().zip(dists.column(0)) {
            *cached = cached.min(fresh);
        }

        let pick = match sampling_weights(&min_dists) {
            Some(weights) => {
                let sampler = WeightedIndex::new(&weights).map_err(|e| {
                    ClusterError::invalid_argument(format!("k-means++ sampling weights: {e}"))
                })?;
                sampler.sample(rng)
            }
            // Every remaining row sits on an existing centroid (duplicate
            // heavy data); any unchosen row is as good as another.
            None => {
                let mut unchosen = (0..n).filter(|i| !chosen.contains(i));
                unchosen.next().ok_or_else(|| {
                    ClusterError::invalid_argument(
                        "k-means++ exhausted distinct rows before reaching k centroids",
                    )
                })?
            }
        };

        centroids.row_mut(c).assign(&mat.row(pick));
        chosen.push(pick);
    }

    info!("k-means++ seeded {k} centroids over {n} histograms");
    Ok(centroids)
}

/// Normalized sampling probabilities from the min-distance cache.
///
/// Returns `None` when the total weight is zero, in which case weighted
/// sampling is undefined and the caller falls back to an unchosen row.
pub(crate) fn sampling_weights(min_dists: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = min_dists.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(min_dists.iter().map(|&w| w / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::lattice::BinLattice;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;

    fn engine() -> DistanceEngine {
        DistanceEngine::new(DistanceMetric::Euclidean, BinLattice::new(1, 2))
    }

    #[test]
    fn random_init_draws_distinct_rows() {
        let mat = array![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let centroids =
            initial_centroids(mat.view(), 3, &InitMethod::Random, &engine(), &mut rng).unwrap();
        assert_eq!(centroids.dim(), (3, 2));
        // Distinct indices means distinct first components in this matrix.
        let mut firsts: Vec<i64> = centroids.column(0).iter().map(|&v| v as i64).collect();
        firsts.sort_unstable();
        firsts.dedup();
        assert_eq!(firsts.len(), 3);
    }

    #[test]
    fn random_init_rejects_k_above_n() {
        let mat = array![[0.0, 0.0], [1.0, 0.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = initial_centroids(mat.view(), 5, &InitMethod::Random, &engine(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidArgument(_)));
    }

    #[test]
    fn same_seed_reproduces_random_init() {
        let mat = array![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);
        let a = initial_centroids(mat.view(), 2, &InitMethod::Random, &engine(), &mut rng1)
            .unwrap();
        let b = initial_centroids(mat.view(), 2, &InitMethod::Random, &engine(), &mut rng2)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn same_seed_reproduces_kmeans_plus_plus() {
        let mat = array![[0.0, 0.0], [1.0, 0.0], [5.0, 0.0], [9.0, 1.0]];
        let mut rng1 = ChaCha8Rng::seed_from_u64(11);
        let mut rng2 = ChaCha8Rng::seed_from_u64(11);
        let a = initial_centroids(mat.view(), 3, &InitMethod::KMeansPlusPlus, &engine(), &mut rng1)
            .unwrap();
        let b = initial_centroids(mat.view(), 3, &InitMethod::KMeansPlusPlus, &engine(), &mut rng2)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn second_centroid_weights_proportional_to_distance() {
        // 4 rows, 2 bins, first centroid = row 0. Squared Euclidean
        // distances to row 0 are 0, 1, 4, 9; the sampling weights for the
        // second centroid must be exactly those distances normalized.
        let mat = array![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let c0 = mat.slice(s![0..1, ..]);
        let dists = engine().pairwise(mat.view(), c0).unwrap();
        let min_dists: Vec<f64> = dists.column(0).to_vec();
        let weights = sampling_weights(&min_dists).unwrap();
        let expected = [0.0, 1.0 / 14.0, 4.0 / 14.0, 9.0 / 14.0];
        for (w, e) in weights.iter().zip(expected) {
            assert_abs_diff_eq!(*w, e, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn duplicate_rows_fall_back_to_uniform_pick() {
        let mat = array![[2.0, 3.0], [2.0, 3.0], [2.0, 3.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let centroids =
            initial_centroids(mat.view(), 2, &InitMethod::KMeansPlusPlus, &engine(), &mut rng)
                .unwrap();
        assert_eq!(centroids.dim(), (2, 2));
        assert_abs_diff_eq!(centroids[[1, 0]], 2.0);
        assert_abs_diff_eq!(centroids[[1, 1]], 3.0);
    }

    #[test]
    fn supplied_centroids_pass_through() {
        let mat = array![[0.0, 0.0], [1.0, 0.0]];
        let supplied = array![[0.5, 0.5], [0.9, 0.1]];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let centroids = initial_centroids(
            mat.view(),
            2,
            &InitMethod::Supplied(supplied.clone()),
            &engine(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(centroids, supplied);
    }

    #[test]
    fn supplied_centroids_with_wrong_shape_are_rejected() {
        let mat = array![[0.0, 0.0], [1.0, 0.0]];
        let supplied = array![[0.5, 0.5, 0.5]];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let err = initial_centroids(
            mat.view(),
            2,
            &InitMethod::Supplied(supplied),
            &engine(),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, ClusterError::ShapeMismatch(_)));
    }
}

use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::distance::{argmin_rows, DistanceEngine, DistanceMetric};
use crate::error::Result;

/// Outcome of a single initialization + iteration run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Final (k, d) centroid set.
    pub centroids: Array2<f64>,
    /// Nearest-centroid label per histogram, consistent with `centroids`.
    pub labels: Array1<usize>,
    /// One inertia value per completed assignment, including the final
    /// assignment the run terminated on. Non-increasing for Euclidean runs.
    pub inertia_history: Vec<f64>,
    /// False when the hard iteration stop fired before the inertia decrease
    /// dropped below tolerance. The result is still valid and usable.
    pub converged: bool,
    /// (iteration, cluster) pairs where a centroid lost all of its members
    /// and was retained unchanged. Recoverable; surfaced for diagnostics.
    pub degenerate_events: Vec<(usize, usize)>,
    /// Wall time spent seeding this run's initial centroids.
    pub init_seconds: f64,
}

impl RunResult {
    /// Inertia of the final assignment, used to rank restarts.
    pub fn final_inertia(&self) -> f64 {
        self.inertia_history.last().copied().unwrap_or(f64::INFINITY)
    }
}

/// Run the Lloyd assignment/update loop from `centroids` to convergence or
/// the hard iteration stop.
///
/// The sequence Assign -> Update -> CheckConvergence is strictly sequential;
/// only the inner distance evaluation is parallel. Convergence means the
/// inertia decrease between successive completed iterations fell below
/// `tolerance`. Reaching `max_iterations` first is recoverable: the run is
/// flagged non-converged, logged as a warning, and the last centroids and a
/// consistent label assignment are still returned.
pub(crate) fn run_lloyd(
    mat: ArrayView2<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    mut centroids: Array2<f64>,
    engine: &DistanceEngine,
    tolerance: f64,
    max_iterations: usize,
) -> Result<RunResult> {
    // Weights are normalized once; the update ratio is unchanged and the
    // inertia definition calls for normalized per-row weights.
    let norm_weights: Option<Array1<f64>> = weights.map(|w| {
        let total = w.sum();
        w.mapv(|v| v / total)
    });

    let mut inertia_history = Vec::new();
    let mut degenerate_events = Vec::new();
    let mut previous_inertia: Option<f64> = None;
    let mut converged = false;
    let mut iteration = 0;

    let labels = loop {
        // Assign: full (n, k) distance matrix, first-argmin labels.
        let distances = engine.pairwise(mat, centroids.view())?;
        let labels = argmin_rows(&distances);
        let inertia = inertia_of(engine.metric(), &distances, &labels, norm_weights.as_ref());

        if let Some(previous) = previous_inertia {
            let decrease = previous - inertia;
            info!("iteration {iteration}: inertia {inertia:.6e} (decrease {decrease:.3e})");
            if decrease < tolerance {
                converged = true;
                inertia_history.push(inertia);
                break labels;
            }
        }
        inertia_history.push(inertia);
        previous_inertia = Some(inertia);

        update_centroids(
            mat,
            &labels,
            norm_weights.as_ref(),
            &mut centroids,
            iteration,
            &mut degenerate_events,
        );

        iteration += 1;
        if iteration >= max_iterations {
            warn!(
                "hard stop of {max_iterations} iterations reached before the inertia \
                 decrease fell below {tolerance:e}; this run may not have converged"
            );
            // Realign labels with the post-update centroids so the returned
            // pair is consistent.
            let distances = engine.pairwise(mat, centroids.view())?;
            let labels = argmin_rows(&distances);
            inertia_history.push(inertia_of(
                engine.metric(),
                &distances,
                &labels,
                norm_weights.as_ref(),
            ));
            break labels;
        }
    };

    Ok(RunResult {
        centroids,
        labels,
        inertia_history,
        converged,
        degenerate_events,
        init_seconds: 0.0,
    })
}

/// Sum of squared (optionally weight-normalized) assigned distances.
fn inertia_of(
    metric: DistanceMetric,
    distances: &Array2<f64>,
    labels: &Array1<usize>,
    norm_weights: Option<&Array1<f64>>,
) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let squared = metric.squared(distances[[i, c]]);
            match norm_weights {
                Some(w) => squared * w[i] * w[i],
                None => squared,
            }
        })
        .sum()
}

/// Replace every centroid with the (weighted) mean of its members.
///
/// A centroid with no members keeps its previous value; the event is logged
/// and recorded rather than letting a zero-count mean produce NaN.
fn update_centroids(
    mat: ArrayView2<'_, f64>,
    labels: &Array1<usize>,
    weights: Option<&Array1<f64>>,
    centroids: &mut Array2<f64>,
    iteration: usize,
    degenerate_events: &mut Vec<(usize, usize)>,
) {
    let k = centroids.nrows();
    let d = centroids.ncols();
    let mut sums = Array2::<f64>::zeros((k, d));
    let mut denoms = vec![0.0; k];

    for (i, &c) in labels.iter().enumerate() {
        let w = weights.map_or(1.0, |w| w[i]);
        sums.row_mut(c).scaled_add(w, &mat.row(i));
        denoms[c] += w;
    }

    for c in 0..k {
        if denoms[c] > 0.0 {
            let mean = sums.row(c).mapv(|v| v / denoms[c]);
            centroids.row_mut(c).assign(&mean);
        } else {
            warn!("cluster {c} lost all members at iteration {iteration}; retaining its centroid");
            degenerate_events.push((iteration, c));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::BinLattice;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn engine_1x2() -> DistanceEngine {
        DistanceEngine::new(DistanceMetric::Euclidean, BinLattice::new(1, 2))
    }

    #[test]
    fn euclidean_inertia_is_non_increasing() {
        let mat = array![
            [0.0, 0.0],
            [0.4, 0.1],
            [0.2, 0.3],
            [5.0, 5.0],
            [5.3, 4.8],
            [4.9, 5.2],
        ];
        // Deliberately poor starting centroids.
        let start = array![[2.0, 2.0], [2.5, 2.5]];
        let result =
            run_lloyd(mat.view(), None, start, &engine_1x2(), 1e-9, 50).unwrap();
        assert!(result.converged);
        for pair in result.inertia_history.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1e-12,
                "inertia rose from {} to {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn labels_match_final_centroids() {
        let mat = array![[0.0, 0.0], [0.1, 0.0], [4.0, 4.0], [4.1, 4.0]];
        let start = array![[1.0, 1.0], [3.0, 3.0]];
        let engine = engine_1x2();
        let result = run_lloyd(mat.view(), None, start, &engine, 1e-9, 50).unwrap();
        let distances = engine
            .pairwise(mat.view(), result.centroids.view())
            .unwrap();
        let relabeled = crate::distance::argmin_rows(&distances);
        assert_eq!(result.labels, relabeled);
    }

    #[test]
    fn empty_cluster_retains_previous_centroid() {
        // Both rows sit near the origin; the second centroid is far away and
        // captures nothing after the first assignment.
        let mat = array![[0.0, 0.0], [0.5, 0.0]];
        let start = array![[0.25, 0.0], [100.0, 100.0]];
        let result = run_lloyd(mat.view(), None, start, &engine_1x2(), 1e-9, 10).unwrap();
        assert_abs_diff_eq!(result.centroids[[1, 0]], 100.0);
        assert_abs_diff_eq!(result.centroids[[1, 1]], 100.0);
        assert!(result.centroids.iter().all(|v| v.is_finite()));
        assert!(result
            .degenerate_events
            .iter()
            .any(|&(_, cluster)| cluster == 1));
    }

    #[test]
    fn hard_stop_flags_non_convergence() {
        let mat = array![[0.0, 0.0], [0.1, 0.0], [4.0, 4.0], [4.1, 4.0]];
        // Far-off start needs more than one iteration to settle.
        let start = array![[10.0, 10.0], [12.0, 12.0]];
        let result = run_lloyd(mat.view(), None, start, &engine_1x2(), 1e-9, 1).unwrap();
        assert!(!result.converged);
        assert!(result.centroids.iter().all(|v| v.is_finite()));
        assert_eq!(result.labels.len(), 4);
    }

    #[test]
    fn weighted_update_uses_weighted_mean() {
        let mat = array![[0.0, 0.0], [2.0, 0.0]];
        let weights = array![1.0, 3.0];
        let start = array![[1.0, 0.0]];
        let result = run_lloyd(
            mat.view(),
            Some(weights.view()),
            start,
            &engine_1x2(),
            1e-9,
            10,
        )
        .unwrap();
        // (1*0 + 3*2) / 4 = 1.5
        assert_abs_diff_eq!(result.centroids[[0, 0]], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(result.centroids[[0, 1]], 0.0, epsilon = 1e-12);
    }
}

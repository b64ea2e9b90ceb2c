use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::emd;
use crate::error::{ClusterError, Result};
use crate::lattice::BinLattice;

/// Distance metric used for assignment, initialization, and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Squared Euclidean distance between flattened histograms.
    Euclidean,
    /// Earth Mover's Distance over the bin-position lattice.
    Emd,
}

impl DistanceMetric {
    /// Squared true distance for a raw metric value.
    ///
    /// The Euclidean metric already reports the squared distance, so its
    /// value passes through; the EMD metric reports the transport cost,
    /// which gets squared. Inertia sums these contributions.
    pub(crate) fn squared(self, value: f64) -> f64 {
        match self {
            DistanceMetric::Euclidean => value,
            DistanceMetric::Emd => value * value,
        }
    }
}

/// Computes dense distance matrices between histograms and centroids.
///
/// Each (row, centroid) pair is independent and reads only shared immutable
/// inputs, so rows are evaluated in parallel and merged by concatenation.
#[derive(Debug, Clone)]
pub struct DistanceEngine {
    metric: DistanceMetric,
    lattice: BinLattice,
}

impl DistanceEngine {
    /// Create an engine for the given metric over the given lattice.
    pub fn new(metric: DistanceMetric, lattice: BinLattice) -> Self {
        Self { metric, lattice }
    }

    /// The metric this engine evaluates.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// The bin lattice this engine was built for.
    pub fn lattice(&self) -> &BinLattice {
        &self.lattice
    }

    /// Dense (n, m) distance matrix between `rows` and `centroids`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the width of `rows` or `centroids` differs from
    /// the lattice size. Checked once per call, not per pair.
    pub fn pairwise(
        &self,
        rows: ArrayView2<'_, f64>,
        centroids: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>> {
        let d = self.lattice.len();
        if rows.ncols() != d {
            return Err(ClusterError::shape_mismatch(format!(
                "histogram matrix has {} columns but the lattice has {} bins",
                rows.ncols(),
                d
            )));
        }
        if centroids.ncols() != d {
            return Err(ClusterError::shape_mismatch(format!(
                "centroid set has {} columns but the lattice has {} bins",
                centroids.ncols(),
                d
            )));
        }

        let n = rows.nrows();
        let m = centroids.nrows();
        if n == 0 || m == 0 {
            return Ok(Array2::zeros((n, m)));
        }

        let mut flat = vec![0.0; n * m];
        flat.par_chunks_mut(m).enumerate().for_each(|(i, out)| {
            let row = rows.row(i);
            for (j, slot) in out.iter_mut().enumerate() {
                *slot = self.one(row, centroids.row(j));
            }
        });

        Ok(Array2::from_shape_vec((n, m), flat).expect("row-major distance buffer"))
    }

    fn one(&self, row: ArrayView1<'_, f64>, centroid: ArrayView1<'_, f64>) -> f64 {
        match self.metric {
            DistanceMetric::Euclidean => row
                .iter()
                .zip(centroid.iter())
                .map(|(&x, &c)| (x - c) * (x - c))
                .sum(),
            DistanceMetric::Emd => emd::emd(row, centroid, &self.lattice),
        }
    }
}

/// Index of the nearest centroid per row, ties broken by lowest index.
pub(crate) fn argmin_rows(distances: &Array2<f64>) -> Array1<usize> {
    let labels: Vec<usize> = distances
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            let mut best_dist = row[0];
            for (j, &dist) in row.iter().enumerate().skip(1) {
                if dist < best_dist {
                    best = j;
                    best_dist = dist;
                }
            }
            best
        })
        .collect();
    Array1::from(labels)
}

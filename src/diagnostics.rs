//! Numeric post-fit diagnostics.
//!
//! These are the calculations behind the usual regime-evaluation plots
//! (centroid correlation matrices, relative-frequency-of-occurrence
//! summaries); rendering them is a caller concern.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{ClusterError, Result};

/// Pearson correlation matrix between centroid histograms.
///
/// Entry (i, j) is the correlation coefficient between centroids i and j;
/// the diagonal is 1. High off-diagonal values suggest k is too large and
/// two regimes describe the same cloud structure. A constant centroid has
/// zero variance and undefined correlation, reported as 0.
pub fn centroid_correlation(centroids: ArrayView2<'_, f64>) -> Array2<f64> {
    let k = centroids.nrows();
    let mut coefs = Array2::zeros((k, k));
    for i in 0..k {
        for j in 0..k {
            coefs[[i, j]] = pearson(centroids.row(i), centroids.row(j));
        }
    }
    coefs
}

fn pearson(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.sum() / n;
    let mean_b = b.sum() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        cov / denom
    }
}

/// Relative frequency of occurrence per regime, in percent.
///
/// With weights (e.g. cosine-of-latitude area weights), each observation
/// contributes its weight to the numerator of its regime and to the common
/// denominator, matching an area-weighted RFO over a geographic grid.
///
/// # Errors
///
/// `InvalidArgument` if a label is out of range `[0, k)`;
/// `ShapeMismatch` if the weight length differs from the label length.
pub fn relative_frequency(
    labels: ArrayView1<'_, usize>,
    k: usize,
    weights: Option<ArrayView1<'_, f64>>,
) -> Result<Array1<f64>> {
    if let Some(w) = weights {
        if w.len() != labels.len() {
            return Err(ClusterError::shape_mismatch(format!(
                "weight vector has length {} but there are {} labels",
                w.len(),
                labels.len()
            )));
        }
    }

    let mut numerators = Array1::<f64>::zeros(k);
    let mut denominator = 0.0;
    for (i, &label) in labels.iter().enumerate() {
        if label >= k {
            return Err(ClusterError::invalid_argument(format!(
                "label {label} at row {i} is out of range for k = {k}"
            )));
        }
        let w = weights.map_or(1.0, |w| w[i]);
        numerators[label] += w;
        denominator += w;
    }

    if denominator <= 0.0 {
        return Err(ClusterError::invalid_argument(
            "total observation weight is zero",
        ));
    }
    Ok(numerators.mapv(|v| v / denominator * 100.0))
}

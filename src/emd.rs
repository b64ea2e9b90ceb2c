//! Optimal-transport backend for the EMD metric.
//!
//! Histograms are reinterpreted as discrete mass distributions over the bin
//! lattice and compared by entropy-regularized optimal transport (Sinkhorn
//! scaling in the log domain), restricted to the positive-mass support of
//! each side. The distance engine only depends on the contract "two
//! distributions in, transport cost out", so this backend can be swapped for
//! any compliant OT routine.

use ndarray::ArrayView1;

use crate::lattice::BinLattice;

/// Regularization strength as a fraction of the interaction radius.
const EPSILON_SCALE: f64 = 0.02;
/// Hard cap on Sinkhorn scaling iterations.
const MAX_SWEEPS: usize = 500;
/// Stop once the largest change in a log scaling factor falls below this.
const SWEEP_TOL: f64 = 1e-9;

/// Earth Mover's Distance between two histograms over `lattice`.
///
/// Both inputs are normalized by their total mass before transport, and the
/// ground distance between bins is capped at the lattice interaction radius.
/// A pair of zero-mass histograms is at distance 0; a zero-mass histogram is
/// at the full radius from anything with mass (transport to nothing is
/// undefined, so the cap is the documented worst case).
pub(crate) fn emd(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>, lattice: &BinLattice) -> f64 {
    let (bins_a, mass_a) = support(a);
    let (bins_b, mass_b) = support(b);

    match (bins_a.is_empty(), bins_b.is_empty()) {
        (true, true) => return 0.0,
        (true, false) | (false, true) => return lattice.radius(),
        (false, false) => {}
    }

    // A single-bin side forces the whole transport plan.
    if bins_a.len() == 1 {
        return mass_b
            .iter()
            .zip(&bins_b)
            .map(|(&m, &j)| m * lattice.ground_distance(bins_a[0], j))
            .sum();
    }
    if bins_b.len() == 1 {
        return mass_a
            .iter()
            .zip(&bins_a)
            .map(|(&m, &i)| m * lattice.ground_distance(i, bins_b[0]))
            .sum();
    }

    let na = bins_a.len();
    let nb = bins_b.len();
    let epsilon = (lattice.radius() * EPSILON_SCALE).max(1e-6);

    // Ground cost over the joint support, scaled by -1/epsilon for the kernel.
    let mut neg_cost = vec![0.0; na * nb];
    for (i, &ba) in bins_a.iter().enumerate() {
        for (j, &bb) in bins_b.iter().enumerate() {
            neg_cost[i * nb + j] = -lattice.ground_distance(ba, bb) / epsilon;
        }
    }

    let log_a: Vec<f64> = mass_a.iter().map(|&m| m.ln()).collect();
    let log_b: Vec<f64> = mass_b.iter().map(|&m| m.ln()).collect();

    // Log-domain Sinkhorn: P = diag(e^alpha) K diag(e^beta), K = e^{-C/eps}.
    let mut alpha = log_a.clone();
    let mut beta = vec![0.0; nb];
    let mut row_terms = vec![0.0; nb];
    let mut col_terms = vec![0.0; na];

    for _ in 0..MAX_SWEEPS {
        for i in 0..na {
            for j in 0..nb {
                row_terms[j] = neg_cost[i * nb + j] + beta[j];
            }
            alpha[i] = log_a[i] - log_sum_exp(&row_terms);
        }

        let mut max_shift: f64 = 0.0;
        for j in 0..nb {
            for i in 0..na {
                col_terms[i] = neg_cost[i * nb + j] + alpha[i];
            }
            let next = log_b[j] - log_sum_exp(&col_terms);
            max_shift = max_shift.max((next - beta[j]).abs());
            beta[j] = next;
        }

        if max_shift < SWEEP_TOL {
            break;
        }
    }

    // Transport cost <P, C>.
    let mut cost = 0.0;
    for i in 0..na {
        for j in 0..nb {
            let log_p = alpha[i] + beta[j] + neg_cost[i * nb + j];
            cost += log_p.exp() * (-neg_cost[i * nb + j] * epsilon);
        }
    }
    cost
}

/// Positive-mass bins of a histogram, with masses normalized to sum to one.
fn support(hist: ArrayView1<'_, f64>) -> (Vec<usize>, Vec<f64>) {
    let total: f64 = hist.iter().filter(|v| **v > 0.0).sum();
    if total <= 0.0 {
        return (Vec::new(), Vec::new());
    }
    let mut bins = Vec::new();
    let mut mass = Vec::new();
    for (b, &v) in hist.iter().enumerate() {
        if v > 0.0 {
            bins.push(b);
            mass.push(v / total);
        }
    }
    (bins, mass)
}

fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = terms.iter().map(|&t| (t - max).exp()).sum();
    max + sum.ln()
}

use std::time::Instant;

use log::info;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::distance::{DistanceEngine, DistanceMetric};
use crate::error::{ClusterError, Result};
use crate::init::{initial_centroids, InitMethod};
use crate::lattice::BinLattice;
use crate::lloyd::{run_lloyd, RunResult};

/// Configuration for regime clustering.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of regimes to find.
    pub k: usize,
    /// Convergence tolerance on the inertia decrease between iterations.
    pub tolerance: f64,
    /// Hard stop on iterations per run, independent of the tolerance.
    pub max_iterations: usize,
    /// Number of independent restarts; the lowest-inertia run wins.
    pub n_init: usize,
    /// Centroid initialization strategy.
    pub init: InitMethod,
    /// Distance metric for assignment and initialization.
    pub metric: DistanceMetric,
    /// Base RNG seed for reproducible initialization. Each restart derives
    /// its own stream from this. Unseeded runs draw from entropy.
    pub seed: Option<u64>,
}

impl KMeansConfig {
    /// Create a config with default values: tolerance 1e-6, hard stop 45,
    /// 10 restarts, random initialization, Euclidean metric, unseeded.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            tolerance: 1e-6,
            max_iterations: 45,
            n_init: 10,
            init: InitMethod::Random,
            metric: DistanceMetric::Euclidean,
            seed: None,
        }
    }

    /// Customize the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Customize the hard iteration stop.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Customize the number of restarts.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Customize the initialization strategy.
    pub fn with_init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }

    /// Customize the distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Fix the base RNG seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Result of a full multi-restart fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Winning run's final (k, d) centroid set.
    pub centroids: Array2<f64>,
    /// Winning run's label per histogram, consistent with `centroids`.
    pub labels: Array1<usize>,
    /// Winning run's inertia history, one value per completed assignment.
    pub inertia_history: Vec<f64>,
    /// Whether the winning run converged before its hard stop.
    pub converged: bool,
    /// Winning run's degenerate-cluster events (iteration, cluster).
    pub degenerate_events: Vec<(usize, usize)>,
    /// Seconds spent seeding the winning run's initial centroids.
    pub init_seconds: f64,
    /// Final inertia of every run, in run order.
    pub run_inertias: Vec<f64>,
    /// Final centroid set of every run, in run order, for diagnostics.
    pub run_centroids: Vec<Array2<f64>>,
    /// Index of the winning run.
    pub best_run: usize,
}

impl FitResult {
    /// Final inertia of the winning run.
    pub fn inertia(&self) -> f64 {
        self.run_inertias[self.best_run]
    }
}

/// Cluster `mat` into `config.k` regimes, keeping the best of
/// `config.n_init` restarts by final inertia.
///
/// `mat` is the (n, d) histogram matrix, d = lattice size, flattened
/// tau-major. `weights` optionally area-weights each row (e.g. cosine of
/// latitude); when present the centroid update and the inertia are
/// weight-normalized. Restarts are mutually independent and run in
/// parallel; each derives its own RNG stream so seeded fits are
/// reproducible regardless of scheduling.
///
/// # Errors
///
/// * `ShapeMismatch`: matrix width differs from the lattice size, or a
///   supplied centroid array is not (k, d).
/// * `InvalidArgument`: `k` of 0 (or above n for the sampling
///   initializers), zero restarts or iterations, non-finite or negative
///   tolerance, NaN/negative histogram entries, or an unusable weight
///   vector.
///
/// Non-convergence and degenerate clusters are never errors; they surface
/// as flags on the result and `log` warnings.
pub fn fit(
    mat: ArrayView2<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    lattice: &BinLattice,
    config: &KMeansConfig,
) -> Result<FitResult> {
    validate(mat, weights, lattice, config)?;

    let engine = DistanceEngine::new(config.metric, lattice.clone());

    // A supplied centroid array makes every restart a deterministic
    // duplicate; run it once instead of silently repeating it.
    let n_init = match config.init {
        InitMethod::Supplied(_) => {
            if config.n_init > 1 {
                info!(
                    "supplied initial centroids: collapsing {} restarts to 1",
                    config.n_init
                );
            }
            1
        }
        _ => config.n_init,
    };

    // Derive per-run seeds up front so parallel scheduling cannot perturb
    // seeded reproducibility.
    let run_seeds: Vec<u64> = match config.seed {
        Some(seed) => (0..n_init as u64).map(|r| seed.wrapping_add(r)).collect(),
        None => {
            let mut entropy = ChaCha8Rng::from_entropy();
            (0..n_init).map(|_| entropy.next_u64()).collect()
        }
    };

    let runs: Vec<RunResult> = run_seeds
        .into_par_iter()
        .map(|run_seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(run_seed);
            let seeding = Instant::now();
            let centroids =
                initial_centroids(mat.view(), config.k, &config.init, &engine, &mut rng)?;
            let init_seconds = seeding.elapsed().as_secs_f64();
            info!("seeded initial centroids in {init_seconds:.3}s");
            let mut run = run_lloyd(
                mat.view(),
                weights.as_ref().map(|w| w.view()),
                centroids,
                &engine,
                config.tolerance,
                config.max_iterations,
            )?;
            run.init_seconds = init_seconds;
            Ok(run)
        })
        .collect::<Result<_>>()?;

    let mut best_run = 0;
    for (i, run) in runs.iter().enumerate() {
        if run.final_inertia() < runs[best_run].final_inertia() {
            best_run = i;
        }
    }

    let run_inertias: Vec<f64> = runs.iter().map(RunResult::final_inertia).collect();
    let run_centroids: Vec<Array2<f64>> = runs.iter().map(|r| r.centroids.clone()).collect();
    info!(
        "kept run {} of {} with inertia {:.6e}",
        best_run + 1,
        runs.len(),
        run_inertias[best_run]
    );

    let best = runs.into_iter().nth(best_run).expect("best_run is in range");
    Ok(FitResult {
        centroids: best.centroids,
        labels: best.labels,
        inertia_history: best.inertia_history,
        converged: best.converged,
        degenerate_events: best.degenerate_events,
        init_seconds: best.init_seconds,
        run_inertias,
        run_centroids,
        best_run,
    })
}

fn validate(
    mat: ArrayView2<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    lattice: &BinLattice,
    config: &KMeansConfig,
) -> Result<()> {
    let (n, d) = mat.dim();
    if d != lattice.len() {
        return Err(ClusterError::shape_mismatch(format!(
            "histogram matrix has {d} columns but the lattice has {} bins",
            lattice.len()
        )));
    }
    if n == 0 {
        return Err(ClusterError::invalid_argument("histogram matrix has no rows"));
    }
    if config.k == 0 {
        return Err(ClusterError::invalid_argument("k must be at least 1"));
    }
    // Sampling initializers need k distinct rows to draw from. A supplied
    // centroid set is bound by its (k, d) shape only; surplus centroids
    // just go memberless and are retained as degenerate clusters.
    if config.k > n && !matches!(config.init, InitMethod::Supplied(_)) {
        return Err(ClusterError::invalid_argument(format!(
            "k = {} exceeds the number of histograms n = {n}",
            config.k
        )));
    }
    if config.n_init == 0 {
        return Err(ClusterError::invalid_argument("n_init must be at least 1"));
    }
    if config.max_iterations == 0 {
        return Err(ClusterError::invalid_argument(
            "max_iterations must be at least 1",
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance < 0.0 {
        return Err(ClusterError::invalid_argument(format!(
            "tolerance must be finite and non-negative, got {}",
            config.tolerance
        )));
    }
    if mat.iter().any(|v| v.is_nan()) {
        return Err(ClusterError::invalid_argument(
            "histogram matrix contains NaN; filter invalid observations before clustering",
        ));
    }
    if mat.iter().any(|&v| v < 0.0) {
        return Err(ClusterError::invalid_argument(
            "histogram matrix contains negative values; convert fill values to NaN \
             and filter them before clustering",
        ));
    }
    if let Some(w) = weights {
        if w.len() != n {
            return Err(ClusterError::shape_mismatch(format!(
                "weight vector has length {} but the matrix has {n} rows",
                w.len()
            )));
        }
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ClusterError::invalid_argument(
                "weights must be finite and non-negative",
            ));
        }
        if w.sum() <= 0.0 {
            return Err(ClusterError::invalid_argument("weights sum to zero"));
        }
    }
    Ok(())
}

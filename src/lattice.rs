use ndarray::Array2;

/// The fixed 2-D bin-position lattice underlying a flattened histogram.
///
/// A joint optical-depth / cloud-top-height histogram with `n_tau` by
/// `n_height` bins is flattened tau-major: bin `b` holds the mass at
/// tau index `b / n_height` and height index `b % n_height`. The lattice
/// records those integer coordinates for every flattened bin so the EMD
/// metric can measure ground distance between bins. The Euclidean metric
/// never consults the positions, only the lattice size.
#[derive(Debug, Clone)]
pub struct BinLattice {
    n_tau: usize,
    n_height: usize,
    /// (2, d) array: row 0 = tau index, row 1 = height index per bin.
    positions: Array2<f64>,
    radius: f64,
}

impl BinLattice {
    /// Build the lattice for an `n_tau` x `n_height` histogram.
    ///
    /// The maximum-interaction radius defaults to the lattice diagonal
    /// `sqrt(n_tau^2 + n_height^2)`, which leaves every bin pair within
    /// interaction range. It is a tuning knob, not a universal constant;
    /// see [`BinLattice::with_radius`].
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    pub fn new(n_tau: usize, n_height: usize) -> Self {
        assert!(n_tau > 0 && n_height > 0, "lattice dimensions must be nonzero");
        let d = n_tau * n_height;
        let mut positions = Array2::zeros((2, d));
        for t in 0..n_tau {
            for h in 0..n_height {
                let b = t * n_height + h;
                positions[[0, b]] = t as f64;
                positions[[1, b]] = h as f64;
            }
        }
        let radius = ((n_tau * n_tau + n_height * n_height) as f64).sqrt();
        Self { n_tau, n_height, positions, radius }
    }

    /// Override the maximum-interaction radius used by the EMD metric.
    /// Ground distances are capped at this value.
    pub fn with_radius(mut self, radius: f64) -> Self {
        assert!(radius > 0.0, "interaction radius must be positive");
        self.radius = radius;
        self
    }

    /// Number of flattened bins, `n_tau * n_height`.
    pub fn len(&self) -> usize {
        self.n_tau * self.n_height
    }

    /// Whether the lattice is empty (never true for a constructed lattice).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of optical-depth bins.
    pub fn n_tau(&self) -> usize {
        self.n_tau
    }

    /// Number of height/pressure bins.
    pub fn n_height(&self) -> usize {
        self.n_height
    }

    /// Maximum-interaction radius for the EMD ground metric.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Euclidean ground distance between two flattened bins, capped at the
    /// interaction radius.
    pub(crate) fn ground_distance(&self, a: usize, b: usize) -> f64 {
        let dt = self.positions[[0, a]] - self.positions[[0, b]];
        let dh = self.positions[[1, a]] - self.positions[[1, b]];
        (dt * dt + dh * dh).sqrt().min(self.radius)
    }
}

//! Mutable chain state: assignments, cluster table, fold changes, hyperparameters.

use faer::Mat;
use rand::RngExt;
use rand::rngs::StdRng;

use crate::utils::matrix_is_finite;

use super::priors::{Hyperparameters, sample_prior};
use super::types::{ClusterParams, NbError, check_positive};

/// Dense boolean matrix, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorMatrix {
    nrows: usize,
    ncols: usize,
    values: Vec<bool>,
}

impl IndicatorMatrix {
    /// All-`false` matrix of the given shape.
    #[must_use]
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            values: vec![false; nrows * ncols],
        }
    }

    #[must_use]
    pub fn from_fn(nrows: usize, ncols: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let values = (0..nrows)
            .flat_map(|row| (0..ncols).map(move |col| (row, col)))
            .map(|(row, col)| f(row, col))
            .collect();
        Self {
            nrows,
            ncols,
            values,
        }
    }

    #[must_use]
    pub const fn nrows(&self) -> usize {
        self.nrows
    }

    #[must_use]
    pub const fn ncols(&self) -> usize {
        self.ncols
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.values[row * self.ncols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        self.values[row * self.ncols + col] = value;
    }

    /// Number of `true` entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.values.iter().filter(|value| **value).count()
    }
}

/// State of one chain.
///
/// Cluster rows and hyperparameters are written by the sampler; assignments,
/// indicators, and fold changes belong to the external clustering driver and
/// are only replaced through the validated setters.
#[derive(Debug, Clone)]
pub struct McmcState {
    d: Vec<usize>,
    pars: Mat<f64>,
    iact: Vec<bool>,
    delta: Mat<f64>,
    z: IndicatorMatrix,
    hpars: Hyperparameters,
}

impl McmcState {
    /// Build a state from explicit components.
    ///
    /// Shapes: `d` has one entry per gene, `pars` is `n_clusters × 2`, `delta`
    /// and `z` are `n_genes × n_groups`.
    ///
    /// # Errors
    ///
    /// Returns `NbError` if shapes disagree or any parameter is out of range.
    pub fn new(
        d: Vec<usize>,
        pars: Mat<f64>,
        delta: Mat<f64>,
        z: IndicatorMatrix,
        hpars: Hyperparameters,
    ) -> Result<Self, NbError> {
        validate_pars(&pars)?;
        validate_assignments(&d, pars.nrows())?;
        validate_delta(&delta, d.len())?;
        validate_indicators(&z, &delta)?;
        let hpars = hpars.validate()?;

        let iact = active_mask(&d, pars.nrows());
        Ok(Self {
            d,
            pars,
            iact,
            delta,
            z,
            hpars,
        })
    }

    /// Initialize a chain by prior sampling.
    ///
    /// Cluster rows are drawn from the prior, genes are assigned uniformly at
    /// random, every fold change starts at `1` and every indicator unset.
    ///
    /// # Errors
    ///
    /// Returns `NbError` if `n_clusters` is zero or the hyperparameters are invalid.
    pub fn from_prior(
        n_clusters: usize,
        n_genes: usize,
        n_groups: usize,
        hpars: Hyperparameters,
        rng: &mut StdRng,
    ) -> Result<Self, NbError> {
        if n_clusters == 0 {
            return Err(NbError::ClusterOutOfRange {
                cluster: 0,
                n_clusters,
            });
        }
        let pars = sample_prior(n_clusters, &hpars, rng)?;
        let d = (0..n_genes)
            .map(|_| rng.random_range(0..n_clusters))
            .collect();
        let delta = Mat::from_fn(n_genes, n_groups, |_, _| 1.0);
        let z = IndicatorMatrix::new(n_genes, n_groups);
        Self::new(d, pars, delta, z, hpars)
    }

    #[must_use]
    pub fn assignments(&self) -> &[usize] {
        &self.d
    }

    #[must_use]
    pub const fn pars(&self) -> &Mat<f64> {
        &self.pars
    }

    #[must_use]
    pub fn active(&self) -> &[bool] {
        &self.iact
    }

    #[must_use]
    pub const fn delta(&self) -> &Mat<f64> {
        &self.delta
    }

    #[must_use]
    pub const fn indicators(&self) -> &IndicatorMatrix {
        &self.z
    }

    #[must_use]
    pub const fn hyperparameters(&self) -> &Hyperparameters {
        &self.hpars
    }

    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.pars.nrows()
    }

    #[must_use]
    pub fn n_genes(&self) -> usize {
        self.d.len()
    }

    #[must_use]
    pub fn n_active(&self) -> usize {
        self.iact.iter().filter(|active| **active).count()
    }

    /// Indices of clusters owning at least one gene, ascending.
    #[must_use]
    pub fn active_clusters(&self) -> Vec<usize> {
        self.iact
            .iter()
            .enumerate()
            .filter_map(|(cluster, active)| active.then_some(cluster))
            .collect()
    }

    /// Genes currently assigned to `cluster`, ascending.
    #[must_use]
    pub fn cluster_members(&self, cluster: usize) -> Vec<usize> {
        self.d
            .iter()
            .enumerate()
            .filter_map(|(gene, assigned)| (*assigned == cluster).then_some(gene))
            .collect()
    }

    /// # Errors
    ///
    /// Returns `NbError::ClusterOutOfRange` for an unknown cluster index.
    pub fn cluster_params(&self, cluster: usize) -> Result<ClusterParams, NbError> {
        if cluster >= self.n_clusters() {
            return Err(NbError::ClusterOutOfRange {
                cluster,
                n_clusters: self.n_clusters(),
            });
        }
        Ok(ClusterParams::new(
            self.pars[(cluster, 0)],
            self.pars[(cluster, 1)],
        ))
    }

    /// Commit new parameters for one cluster row.
    ///
    /// # Errors
    ///
    /// Returns `NbError` for an unknown cluster or invalid parameters.
    pub fn set_cluster_params(
        &mut self,
        cluster: usize,
        params: ClusterParams,
    ) -> Result<(), NbError> {
        self.cluster_params(cluster)?;
        let params = params.validate()?;
        self.pars[(cluster, 0)] = params.phi;
        self.pars[(cluster, 1)] = params.mu;
        Ok(())
    }

    /// Replace the hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns `NbError::InvalidParameter` if any entry is invalid.
    pub fn set_hyperparameters(&mut self, hpars: Hyperparameters) -> Result<(), NbError> {
        self.hpars = hpars.validate()?;
        Ok(())
    }

    /// Replace the gene-to-cluster assignment and recompute the active mask.
    ///
    /// # Errors
    ///
    /// Returns `NbError` if the length changes or an index exceeds the cluster table.
    pub fn set_assignments(&mut self, d: Vec<usize>) -> Result<(), NbError> {
        if d.len() != self.d.len() {
            return Err(NbError::DimensionMismatch {
                what: "assignment vector",
                expected: self.d.len(),
                found: d.len(),
            });
        }
        validate_assignments(&d, self.n_clusters())?;
        self.iact = active_mask(&d, self.n_clusters());
        self.d = d;
        Ok(())
    }

    /// Replace the fold-change matrix.
    ///
    /// # Errors
    ///
    /// Returns `NbError` if the shape changes or an entry is not positive.
    pub fn set_delta(&mut self, delta: Mat<f64>) -> Result<(), NbError> {
        if delta.ncols() != self.delta.ncols() {
            return Err(NbError::DimensionMismatch {
                what: "fold-change columns",
                expected: self.delta.ncols(),
                found: delta.ncols(),
            });
        }
        validate_delta(&delta, self.n_genes())?;
        self.delta = delta;
        Ok(())
    }

    /// Replace the differential-expression indicators.
    ///
    /// # Errors
    ///
    /// Returns `NbError::DimensionMismatch` if the shape differs from `delta`.
    pub fn set_indicators(&mut self, z: IndicatorMatrix) -> Result<(), NbError> {
        validate_indicators(&z, &self.delta)?;
        self.z = z;
        Ok(())
    }

    /// Append fresh prior draws to the cluster table and return the first new index.
    ///
    /// # Errors
    ///
    /// Returns `NbError` if the hyperparameters are invalid.
    pub fn grow_clusters(&mut self, additional: usize, rng: &mut StdRng) -> Result<usize, NbError> {
        let first = self.n_clusters();
        let fresh = sample_prior(additional, &self.hpars, rng)?;
        let pars = Mat::from_fn(first + additional, 2, |row, col| {
            if row < first {
                self.pars[(row, col)]
            } else {
                fresh[(row - first, col)]
            }
        });
        self.pars = pars;
        self.iact.resize(first + additional, false);
        Ok(first)
    }

    /// Redraw every inactive cluster row from the current prior.
    ///
    /// Returns the number of rows redrawn.
    ///
    /// # Errors
    ///
    /// Returns `NbError` if the hyperparameters are invalid.
    pub fn reseed_inactive(&mut self, rng: &mut StdRng) -> Result<usize, NbError> {
        let inactive = self
            .iact
            .iter()
            .enumerate()
            .filter_map(|(cluster, active)| (!active).then_some(cluster))
            .collect::<Vec<_>>();
        let fresh = sample_prior(inactive.len(), &self.hpars, rng)?;
        for (row, cluster) in inactive.iter().copied().enumerate() {
            self.pars[(cluster, 0)] = fresh[(row, 0)];
            self.pars[(cluster, 1)] = fresh[(row, 1)];
        }
        Ok(inactive.len())
    }
}

fn active_mask(d: &[usize], n_clusters: usize) -> Vec<bool> {
    let mut iact = vec![false; n_clusters];
    for &cluster in d {
        iact[cluster] = true;
    }
    iact
}

fn validate_pars(pars: &Mat<f64>) -> Result<(), NbError> {
    if pars.ncols() != 2 {
        return Err(NbError::DimensionMismatch {
            what: "parameter table columns",
            expected: 2,
            found: pars.ncols(),
        });
    }
    for row in 0..pars.nrows() {
        ClusterParams::new(pars[(row, 0)], pars[(row, 1)]).validate()?;
    }
    Ok(())
}

fn validate_assignments(d: &[usize], n_clusters: usize) -> Result<(), NbError> {
    if let Some(&cluster) = d.iter().find(|cluster| **cluster >= n_clusters) {
        return Err(NbError::ClusterOutOfRange {
            cluster,
            n_clusters,
        });
    }
    Ok(())
}

fn validate_delta(delta: &Mat<f64>, n_genes: usize) -> Result<(), NbError> {
    if delta.nrows() != n_genes {
        return Err(NbError::DimensionMismatch {
            what: "fold-change rows",
            expected: n_genes,
            found: delta.nrows(),
        });
    }
    if !matrix_is_finite(delta) {
        return Err(NbError::NumericInstability {
            context: "fold-change matrix",
        });
    }
    for gene in 0..delta.nrows() {
        for group in 0..delta.ncols() {
            check_positive("delta", delta[(gene, group)])?;
        }
    }
    Ok(())
}

fn validate_indicators(z: &IndicatorMatrix, delta: &Mat<f64>) -> Result<(), NbError> {
    if z.nrows() != delta.nrows() || z.ncols() != delta.ncols() {
        return Err(NbError::DimensionMismatch {
            what: "indicator matrix entries",
            expected: delta.nrows() * delta.ncols(),
            found: z.nrows() * z.ncols(),
        });
    }
    Ok(())
}

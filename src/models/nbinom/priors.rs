//! Hierarchical log-normal priors and their samplers.
//!
//! `ln phi ~ N(m1, v1)` and `ln mu ~ N(m2, v2)` per cluster; `ln delta` follows
//! `N(m3, v3)` where the indicator `z` is set and `N(m_else, v_else)` elsewhere.

use faer::Mat;
use rand::rngs::StdRng;

use super::random::sample_log_normal;
use super::state::IndicatorMatrix;
use super::types::{ClusterParams, NbError, check_finite, check_positive};

const LN_TAU: f64 = 1.837_877_066_409_345_5;

/// Mean and variance of a normal prior on the log scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogNormalHyper {
    pub mean: f64,
    pub var: f64,
}

impl LogNormalHyper {
    #[must_use]
    pub const fn new(mean: f64, var: f64) -> Self {
        Self { mean, var }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.mean.is_finite() && self.var.is_finite() && self.var > 0.0
    }
}

/// Hyperparameters shared by every prior in the model.
///
/// Each prior reads only its own fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperparameters {
    /// `(m1, v1)`: prior on `ln phi`.
    pub phi: LogNormalHyper,
    /// `(m2, v2)`: prior on `ln mu`.
    pub mu: LogNormalHyper,
    /// `(m3, v3)`: prior on `ln delta` where `z` is set.
    pub delta_de: LogNormalHyper,
    /// `(m_else, v_else)`: prior on `ln delta` where `z` is unset.
    pub delta_null: LogNormalHyper,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            phi: LogNormalHyper::new(-1.0, 1.0),
            mu: LogNormalHyper::new(0.0, 4.0),
            delta_de: LogNormalHyper::new(0.0, 1.0),
            delta_null: LogNormalHyper::new(0.0, 0.01),
        }
    }
}

impl Hyperparameters {
    /// Number of entries in the flat layout.
    pub const LEN: usize = 8;

    /// Flat layout `[m1, v1, m2, v2, m3, v3, m_else, v_else]`.
    #[must_use]
    pub const fn to_vec(self) -> [f64; Self::LEN] {
        [
            self.phi.mean,
            self.phi.var,
            self.mu.mean,
            self.mu.var,
            self.delta_de.mean,
            self.delta_de.var,
            self.delta_null.mean,
            self.delta_null.var,
        ]
    }

    /// Build from the flat layout; entries past the eighth are ignored.
    ///
    /// # Errors
    ///
    /// Returns `NbError` if fewer than eight values are given or any entry is invalid.
    pub fn from_slice(values: &[f64]) -> Result<Self, NbError> {
        if values.len() < Self::LEN {
            return Err(NbError::DimensionMismatch {
                what: "hyperparameter vector",
                expected: Self::LEN,
                found: values.len(),
            });
        }
        let hpars = Self {
            phi: LogNormalHyper::new(values[0], values[1]),
            mu: LogNormalHyper::new(values[2], values[3]),
            delta_de: LogNormalHyper::new(values[4], values[5]),
            delta_null: LogNormalHyper::new(values[6], values[7]),
        };
        hpars.validate()
    }

    /// # Errors
    ///
    /// Returns `NbError::InvalidParameter` for a non-finite mean or non-positive variance.
    pub fn validate(self) -> Result<Self, NbError> {
        for (mean_name, var_name, hyper) in [
            ("m1", "v1", self.phi),
            ("m2", "v2", self.mu),
            ("m3", "v3", self.delta_de),
            ("m_else", "v_else", self.delta_null),
        ] {
            check_finite(mean_name, hyper.mean)?;
            check_positive(var_name, hyper.var)?;
        }
        Ok(self)
    }

    /// Prior of `ln delta` for an entry with indicator `z`.
    #[must_use]
    pub const fn delta_prior(self, z: bool) -> LogNormalHyper {
        if z { self.delta_de } else { self.delta_null }
    }
}

/// Log-density of a log-normal variable: `ln x ~ N(mean, var)`.
///
/// Returns `-inf` outside the support and `NaN` for a non-positive variance.
#[must_use]
pub fn log_normal_ln_density(value: f64, mean: f64, var: f64) -> f64 {
    if var.partial_cmp(&0.0) != Some(std::cmp::Ordering::Greater) {
        return f64::NAN;
    }
    if value <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let log_value = value.ln();
    let centered = log_value - mean;
    -0.5 * (LN_TAU + var.ln()) - log_value - centered * centered / (2.0 * var)
}

/// Joint log-prior of one cluster's `(phi, mu)`.
///
/// # Errors
///
/// Returns `NbError::InvalidParameter` for non-positive parameters or invalid hyperparameters.
pub fn log_prior(params: ClusterParams, hpars: &Hyperparameters) -> Result<f64, NbError> {
    params.validate()?;
    check_positive("v1", hpars.phi.var)?;
    check_positive("v2", hpars.mu.var)?;

    Ok(
        log_normal_ln_density(params.phi, hpars.phi.mean, hpars.phi.var)
            + log_normal_ln_density(params.mu, hpars.mu.mean, hpars.mu.var),
    )
}

/// Log-prior of every cluster row of a `k × 2` parameter table, length `k`.
///
/// # Errors
///
/// Returns `NbError` if the table is not two columns wide or any row is invalid.
pub fn log_prior_rows(pars: &Mat<f64>, hpars: &Hyperparameters) -> Result<Vec<f64>, NbError> {
    if pars.ncols() != 2 {
        return Err(NbError::DimensionMismatch {
            what: "parameter table columns",
            expected: 2,
            found: pars.ncols(),
        });
    }
    (0..pars.nrows())
        .map(|row| log_prior(ClusterParams::new(pars[(row, 0)], pars[(row, 1)]), hpars))
        .collect()
}

/// Log-prior of a `n_genes × n_groups` fold-change matrix given its indicators.
///
/// # Errors
///
/// Returns `NbError` on shape mismatch, non-positive `delta`, or invalid hyperparameters.
pub fn log_delta_prior(
    delta: &Mat<f64>,
    z: &IndicatorMatrix,
    hpars: &Hyperparameters,
) -> Result<f64, NbError> {
    if delta.nrows() != z.nrows() || delta.ncols() != z.ncols() {
        return Err(NbError::DimensionMismatch {
            what: "indicator matrix entries",
            expected: delta.nrows() * delta.ncols(),
            found: z.nrows() * z.ncols(),
        });
    }
    check_positive("v3", hpars.delta_de.var)?;
    check_positive("v_else", hpars.delta_null.var)?;

    let mut total = 0.0;
    for gene in 0..delta.nrows() {
        for group in 0..delta.ncols() {
            let value = check_positive("delta", delta[(gene, group)])?;
            let prior = hpars.delta_prior(z.get(gene, group));
            total += log_normal_ln_density(value, prior.mean, prior.var);
        }
    }
    Ok(total)
}

/// Draw `n` cluster rows from the prior; shape `n × 2` with columns `(phi, mu)`.
///
/// # Errors
///
/// Returns `NbError::InvalidParameter` if the `phi`/`mu` hyperparameters are invalid.
pub fn sample_prior(
    n: usize,
    hpars: &Hyperparameters,
    rng: &mut StdRng,
) -> Result<Mat<f64>, NbError> {
    check_finite("m1", hpars.phi.mean)?;
    check_positive("v1", hpars.phi.var)?;
    check_finite("m2", hpars.mu.mean)?;
    check_positive("v2", hpars.mu.var)?;

    let mut pars = Mat::<f64>::zeros(n, 2);
    for row in 0..n {
        pars[(row, 0)] = sample_log_normal(rng, hpars.phi.mean, hpars.phi.var);
        pars[(row, 1)] = sample_log_normal(rng, hpars.mu.mean, hpars.mu.var);
    }
    Ok(pars)
}

/// Draw a fold-change matrix shaped like `z` from the matching sub-population priors.
///
/// # Errors
///
/// Returns `NbError::InvalidParameter` if the `delta` hyperparameters are invalid.
pub fn sample_delta_prior(
    z: &IndicatorMatrix,
    hpars: &Hyperparameters,
    rng: &mut StdRng,
) -> Result<Mat<f64>, NbError> {
    hpars.validate()?;
    let mut delta = Mat::<f64>::zeros(z.nrows(), z.ncols());
    for gene in 0..z.nrows() {
        for group in 0..z.ncols() {
            let prior = hpars.delta_prior(z.get(gene, group));
            delta[(gene, group)] = sample_log_normal(rng, prior.mean, prior.var);
        }
    }
    Ok(delta)
}

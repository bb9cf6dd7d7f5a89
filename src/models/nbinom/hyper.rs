//! Conjugate Normal/Inverse-Gamma refresh of the hyperparameters.
//!
//! Under the joint Jeffreys prior `p(m, v) ∝ v^(-3/2)`, the posterior of
//! `(m, v)` given log-scale values `x_1..x_n` is sampled by drawing the
//! precision from `Gamma(n/2, scale 2/S)` with `S = Σx² − (Σx)²/n`, then
//! `m ~ N(Σx/n, v/n)`. The shape `n/2` keeps the draw proper for `n == 1`,
//! which the independence prior `1/v` (shape `(n − 1)/2`) would not.

use rand::rngs::StdRng;

use crate::utils::usize_to_f64;

use super::priors::{Hyperparameters, LogNormalHyper};
use super::random::{sample_gamma, sample_standard_normal};
use super::state::McmcState;
use super::types::{NbError, ProposalTuning};

/// Sufficient statistics of a set of log-scale values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogMoments {
    pub sum: f64,
    pub sum_sq: f64,
    pub count: usize,
}

impl LogMoments {
    /// Accumulate `ln value` for every value.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        values.into_iter().fold(Self::default(), |acc, value| {
            let log_value = value.ln();
            Self {
                sum: acc.sum + log_value,
                sum_sq: log_value.mul_add(log_value, acc.sum_sq),
                count: acc.count + 1,
            }
        })
    }
}

/// Draw `(mean, var)` of a normal from its posterior under the joint
/// Jeffreys prior `v^(-3/2)`.
///
/// The scatter is floored at `min_scatter`, so a single value still yields a
/// proper posterior with strictly positive variance. Returns `None` when
/// `count == 0`.
///
/// # Errors
///
/// Returns `NbError::NumericInstability` if the draw is not finite or the variance not positive.
pub fn sample_normal_mean_var_jeffreys(
    moments: LogMoments,
    min_scatter: f64,
    rng: &mut StdRng,
) -> Result<Option<LogNormalHyper>, NbError> {
    if moments.count == 0 {
        return Ok(None);
    }
    let n = usize_to_f64(moments.count);
    let sample_mean = moments.sum / n;
    let scatter = moments
        .sum
        .mul_add(-sample_mean, moments.sum_sq)
        .max(min_scatter);
    if !scatter.is_finite() {
        return Err(NbError::NumericInstability {
            context: "hyperparameter scatter",
        });
    }

    let precision = sample_gamma(rng, 0.5 * n, 2.0 / scatter);
    let var = precision.recip();
    if !(var.is_finite() && var > 0.0) {
        return Err(NbError::NumericInstability {
            context: "hyperparameter variance",
        });
    }
    let mean = (var / n)
        .sqrt()
        .mul_add(sample_standard_normal(rng), sample_mean);
    if !mean.is_finite() {
        return Err(NbError::NumericInstability {
            context: "hyperparameter mean",
        });
    }
    Ok(Some(LogNormalHyper::new(mean, var)))
}

/// Refresh all hyperparameters from the active clusters and the fold changes.
///
/// `(m1, v1)` and `(m2, v2)` use `ln phi` and `ln mu` of active clusters;
/// `(m3, v3)` and `(m_else, v_else)` use `ln delta` split by the indicator.
/// Any block whose supporting population is empty keeps its previous value.
///
/// # Errors
///
/// Returns `NbError` if the tuning is invalid or a posterior draw is not finite.
pub fn sample_hyperparameters(
    state: &McmcState,
    tuning: ProposalTuning,
    rng: &mut StdRng,
) -> Result<Hyperparameters, NbError> {
    if !tuning.is_valid() {
        return Err(NbError::InvalidProposalTuning);
    }

    let previous = *state.hyperparameters();
    let active = state.active_clusters();
    let pars = state.pars();
    let phi_moments = LogMoments::from_values(active.iter().map(|&cluster| pars[(cluster, 0)]));
    let mu_moments = LogMoments::from_values(active.iter().map(|&cluster| pars[(cluster, 1)]));

    let delta = state.delta();
    let z = state.indicators();
    let entries = (0..delta.nrows())
        .flat_map(|gene| (0..delta.ncols()).map(move |group| (gene, group)))
        .collect::<Vec<_>>();
    let de_moments = LogMoments::from_values(
        entries
            .iter()
            .filter(|(gene, group)| z.get(*gene, *group))
            .map(|&(gene, group)| delta[(gene, group)]),
    );
    let null_moments = LogMoments::from_values(
        entries
            .iter()
            .filter(|(gene, group)| !z.get(*gene, *group))
            .map(|&(gene, group)| delta[(gene, group)]),
    );

    let min_scatter = tuning.min_scatter;
    let hpars = Hyperparameters {
        phi: sample_normal_mean_var_jeffreys(phi_moments, min_scatter, rng)?
            .unwrap_or(previous.phi),
        mu: sample_normal_mean_var_jeffreys(mu_moments, min_scatter, rng)?
            .unwrap_or(previous.mu),
        delta_de: sample_normal_mean_var_jeffreys(de_moments, min_scatter, rng)?
            .unwrap_or(previous.delta_de),
        delta_null: sample_normal_mean_var_jeffreys(null_moments, min_scatter, rng)?
            .unwrap_or(previous.delta_null),
    };

    log::debug!(
        "hyperparameters refreshed from {} active clusters, {} DE / {} null fold changes: {:?}",
        phi_moments.count,
        de_moments.count,
        null_moments.count,
        hpars.to_vec()
    );
    Ok(hpars)
}

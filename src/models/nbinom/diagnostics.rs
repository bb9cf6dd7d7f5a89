//! MCMC convergence diagnostics over retained traces.

use crate::utils::{sample_variance, usize_to_f64};

use super::posterior::{NbPosteriorDraw, NbPosteriorSamples};
use super::priors::Hyperparameters;
use super::types::{NbConvergenceSummary, NbError};

/// Lag-`k` autocorrelation of a scalar trace, normalized by the lag-0
/// autocovariance. Zero for an out-of-range lag or a constant trace.
#[must_use]
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if lag >= series.len() {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / usize_to_f64(series.len());
    let variance = autocovariance(series, mean, 0);
    if variance <= 0.0 {
        return 0.0;
    }
    autocovariance(series, mean, lag) / variance
}

/// Effective sample size by Geyer's initial positive sequence.
///
/// Autocorrelations are summed in adjacent pairs `rho(2k) + rho(2k + 1)`,
/// capped to be non-increasing, until the first non-positive pair. The
/// result never exceeds the trace length; a constant trace counts every draw.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    let n_f64 = usize_to_f64(n);
    if n < 2 {
        return n_f64;
    }
    let mean = series.iter().sum::<f64>() / n_f64;
    let variance = autocovariance(series, mean, 0);
    if variance <= 0.0 {
        return n_f64;
    }

    let rho = |lag: usize| autocovariance(series, mean, lag) / variance;
    let mut pair_sum = 0.0;
    let mut previous = f64::INFINITY;
    for k in 0..n / 2 {
        let pair = rho(2 * k) + rho(2 * k + 1);
        if pair <= 0.0 {
            break;
        }
        // Monotone sequence: a pair never exceeds the one before it.
        previous = pair.min(previous);
        pair_sum += previous;
    }
    let tau = 2.0f64.mul_add(pair_sum, -1.0);
    n_f64 / tau.max(1.0)
}

/// Biased (`1/n`) autocovariance at `lag`; zero past the end of the trace.
fn autocovariance(series: &[f64], mean: f64, lag: usize) -> f64 {
    if lag >= series.len() {
        return 0.0;
    }
    let total = series
        .iter()
        .zip(&series[lag..])
        .map(|(left, right)| (left - mean) * (right - mean))
        .sum::<f64>();
    total / usize_to_f64(series.len())
}

/// Summarize split-R-hat convergence diagnostics across chains.
///
/// Requires at least two chains and truncates all of them to the same even
/// draw count. Split-R-hat is computed for each of the eight hyperparameters
/// and for the log-likelihood trace.
///
/// # Errors
///
/// Returns `NbError` if there are fewer than two chains or fewer than four usable draws per chain.
pub fn summarize_multi_chain_convergence(
    chains: &[NbPosteriorSamples],
) -> Result<NbConvergenceSummary, NbError> {
    if chains.len() < 2 {
        return Err(NbError::InvalidChainCount {
            min: 2,
            found: chains.len(),
        });
    }

    let min_draws = chains
        .iter()
        .map(NbPosteriorSamples::len)
        .min()
        .unwrap_or(0);
    let draws_per_chain_used = min_draws - (min_draws % 2);
    if draws_per_chain_used < 4 {
        return Err(NbError::InsufficientChainDraws {
            minimum: 4,
            found: draws_per_chain_used,
        });
    }

    let hyper_split_rhat = (0..Hyperparameters::LEN)
        .map(|index| {
            split_rhat_from_chains(chains, draws_per_chain_used, |draw| {
                draw.hpars.to_vec()[index]
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let log_likelihood_split_rhat =
        split_rhat_from_chains(chains, draws_per_chain_used, |draw| draw.log_likelihood).ok();

    let max_split_rhat = hyper_split_rhat
        .iter()
        .copied()
        .chain(log_likelihood_split_rhat)
        .max_by(f64::total_cmp);

    Ok(NbConvergenceSummary {
        chain_count: chains.len(),
        draws_per_chain_used,
        hyper_split_rhat,
        log_likelihood_split_rhat,
        max_split_rhat,
    })
}

fn split_rhat_from_chains<F>(
    chains: &[NbPosteriorSamples],
    draws_per_chain_used: usize,
    extractor: F,
) -> Result<f64, NbError>
where
    F: Fn(&NbPosteriorDraw) -> f64,
{
    if chains.len() < 2 || draws_per_chain_used < 4 || !draws_per_chain_used.is_multiple_of(2) {
        return Err(NbError::InsufficientChainDraws {
            minimum: 4,
            found: draws_per_chain_used,
        });
    }

    let half = draws_per_chain_used / 2;
    let split_chains = chains
        .iter()
        .flat_map(|chain| {
            let first_half = chain
                .draws
                .iter()
                .take(half)
                .map(&extractor)
                .collect::<Vec<_>>();
            let second_half = chain
                .draws
                .iter()
                .skip(half)
                .take(half)
                .map(&extractor)
                .collect::<Vec<_>>();
            [first_half, second_half]
        })
        .collect::<Vec<_>>();

    split_rhat_scalar(&split_chains)
}

fn split_rhat_scalar(chains: &[Vec<f64>]) -> Result<f64, NbError> {
    let n = chains.first().map_or(0, Vec::len);
    if n < 2 || chains.iter().any(|chain| chain.len() != n) {
        return Err(NbError::InsufficientChainDraws {
            minimum: 2,
            found: n,
        });
    }

    let chain_means = chains
        .iter()
        .map(|chain| chain.iter().sum::<f64>() / usize_to_f64(n))
        .collect::<Vec<_>>();
    let chain_vars = chains
        .iter()
        .zip(chain_means.iter())
        .map(|(chain, mean)| sample_variance(chain, *mean))
        .collect::<Vec<_>>();

    let m = chains.len();
    let mean_of_means = chain_means.iter().sum::<f64>() / usize_to_f64(m);
    let between = usize_to_f64(n)
        * chain_means
            .iter()
            .map(|mean| {
                let centered = *mean - mean_of_means;
                centered * centered
            })
            .sum::<f64>()
        / usize_to_f64(m - 1);
    let within = chain_vars.iter().sum::<f64>() / usize_to_f64(m);

    // Constant traces (e.g. a hyperparameter that was never refreshed).
    if !(within.is_finite() && within > 0.0 && between.is_finite()) {
        return Ok(1.0);
    }

    let n_f64 = usize_to_f64(n);
    let var_plus = ((n_f64 - 1.0) / n_f64).mul_add(within, between / n_f64);
    if !var_plus.is_finite() || var_plus <= 0.0 {
        return Ok(1.0);
    }

    Ok((var_plus / within).sqrt().max(1.0))
}

//! Posterior storage and summaries for the clustering chain.

use crate::utils::{percentile, usize_to_f64};

use super::priors::Hyperparameters;
use super::types::ClusterParams;

/// A single retained state of the chain.
#[derive(Debug, Clone)]
pub struct NbPosteriorDraw {
    pub hpars: Hyperparameters,
    /// Parameters of the active clusters, in increasing cluster index.
    pub active_params: Vec<ClusterParams>,
    pub n_active: usize,
    /// Total log-likelihood of the dataset under the current assignment.
    pub log_likelihood: f64,
}

/// Posterior draw collection.
#[derive(Debug, Clone, Default)]
pub struct NbPosteriorSamples {
    pub draws: Vec<NbPosteriorDraw>,
}

impl NbPosteriorSamples {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.draws.len()
    }

    /// Trace of hyperparameter `index`, ordered as `Hyperparameters::to_vec`.
    #[must_use]
    pub fn hyper_trace(&self, index: usize) -> Vec<f64> {
        self.draws
            .iter()
            .filter_map(|draw| draw.hpars.to_vec().get(index).copied())
            .collect()
    }

    #[must_use]
    pub fn log_likelihood_trace(&self) -> Vec<f64> {
        self.draws.iter().map(|draw| draw.log_likelihood).collect()
    }
}

/// Scalar posterior summary statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
}

/// Posterior summary over the retained draws.
#[derive(Debug, Clone, Default)]
pub struct NbPosteriorSummary {
    /// One entry per hyperparameter, ordered as `Hyperparameters::to_vec`.
    pub hyperparameters: Vec<ParameterSummary>,
    pub n_active: Option<ParameterSummary>,
    pub log_likelihood: Option<ParameterSummary>,
    pub draw_count: usize,
}

/// Compute posterior summaries for the hyperparameters, active-cluster count, and log-likelihood.
#[must_use]
pub fn summarize_posterior(samples: &NbPosteriorSamples) -> NbPosteriorSummary {
    let draw_count = samples.len();
    if draw_count == 0 {
        return NbPosteriorSummary {
            draw_count,
            ..NbPosteriorSummary::default()
        };
    }

    let hyperparameters = (0..Hyperparameters::LEN)
        .map(|index| summarize_scalar(&samples.hyper_trace(index)))
        .collect();
    let n_active_values: Vec<f64> = samples
        .draws
        .iter()
        .map(|draw| usize_to_f64(draw.n_active))
        .collect();

    NbPosteriorSummary {
        hyperparameters,
        n_active: Some(summarize_scalar(&n_active_values)),
        log_likelihood: Some(summarize_scalar(&samples.log_likelihood_trace())),
        draw_count,
    }
}

/// Pool the draws of several chains in chain order.
#[must_use]
pub fn pool_samples(chains: &[NbPosteriorSamples]) -> NbPosteriorSamples {
    NbPosteriorSamples {
        draws: chains
            .iter()
            .flat_map(|chain| chain.draws.iter().cloned())
            .collect(),
    }
}

#[must_use]
fn summarize_scalar(values: &[f64]) -> ParameterSummary {
    if values.is_empty() {
        return ParameterSummary::default();
    }

    let n = usize_to_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    ParameterSummary {
        mean,
        std_dev: variance.sqrt(),
        q025: percentile(&sorted, 0.025),
        q50: percentile(&sorted, 0.5),
        q975: percentile(&sorted, 0.975),
    }
}

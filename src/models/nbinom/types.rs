//! Core public types for the negative-binomial clustering model.

use thiserror::Error;

use crate::inference::{InferenceError, McmcConfig, ProposalStats};
use crate::input::InputError;

use super::posterior::NbPosteriorSummary;

/// Errors returned by likelihood evaluation, prior evaluation, and sampling.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NbError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error(transparent)]
    InvalidSchedule(#[from] InferenceError),
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("{what} has length {found}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("cluster {cluster} is out of range for {n_clusters} clusters")]
    ClusterOutOfRange { cluster: usize, n_clusters: usize },
    #[error("non-finite value encountered in {context}")]
    NumericInstability { context: &'static str },
    #[error("invalid proposal tuning configuration")]
    InvalidProposalTuning,
    #[error("multi-chain workflows require at least {min} chains; found {found}")]
    InvalidChainCount { min: usize, found: usize },
    #[error("multi-chain seed stride must be positive")]
    InvalidSeedStride,
    #[error("each chain must retain at least {minimum} draws; minimum found {found}")]
    InsufficientChainDraws { minimum: usize, found: usize },
    #[error("chain {chain} panicked")]
    ChainPanicked { chain: usize },
}

/// Negative-binomial parameters of one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Dispersion, strictly positive.
    pub phi: f64,
    /// Mean expression level, strictly positive.
    pub mu: f64,
}

impl ClusterParams {
    #[must_use]
    pub const fn new(phi: f64, mu: f64) -> Self {
        Self { phi, mu }
    }

    /// # Errors
    ///
    /// Returns `NbError::InvalidParameter` if either coordinate is not finite and positive.
    pub fn validate(self) -> Result<Self, NbError> {
        check_positive("phi", self.phi)?;
        check_positive("mu", self.mu)?;
        Ok(self)
    }
}

/// Result of one Metropolis step for a single cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterUpdate {
    pub cluster: usize,
    /// Accepted parameters: the proposal, or the unchanged current value.
    pub params: ClusterParams,
    pub accepted: bool,
    /// Log-likelihood plus log-prior at `params`.
    pub log_posterior: f64,
}

/// Step sizes and numerical floors for the sampler.
#[derive(Debug, Clone, Copy)]
pub struct ProposalTuning {
    /// Standard deviation of the multiplicative log-normal random walk.
    pub log_step_scale: f64,
    /// Lower bound on the sum of squares used by the Jeffreys posterior.
    ///
    /// Bounds refreshed variances away from zero, so the prior built from a
    /// lone active cluster stays wider than `log_step_scale`.
    pub min_scatter: f64,
}

impl Default for ProposalTuning {
    fn default() -> Self {
        Self {
            log_step_scale: 0.01,
            min_scatter: 0.01,
        }
    }
}

impl ProposalTuning {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.log_step_scale > 0.0
            && self.log_step_scale.is_finite()
            && self.min_scatter > 0.0
            && self.min_scatter.is_finite()
    }
}

/// Full sampler configuration for a fixed-partition chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NbSamplerConfig {
    pub schedule: McmcConfig,
    pub tuning: ProposalTuning,
}

impl NbSamplerConfig {
    /// # Errors
    ///
    /// Returns `NbError` if any configuration block is invalid.
    pub fn validate(self) -> Result<(), NbError> {
        self.schedule.validate()?;
        if !self.tuning.is_valid() {
            return Err(NbError::InvalidProposalTuning);
        }
        Ok(())
    }
}

/// Configuration for running multiple independent chains.
#[derive(Debug, Clone, Copy)]
pub struct MultiChainOptions {
    /// Number of independent chains to run.
    pub chains: usize,
    /// Seed increment between adjacent chains.
    ///
    /// Chain `i` uses `base_seed + i * seed_stride` with wrapping arithmetic.
    pub seed_stride: u64,
}

impl Default for MultiChainOptions {
    fn default() -> Self {
        Self {
            chains: 4,
            seed_stride: 10_000,
        }
    }
}

impl MultiChainOptions {
    /// # Errors
    ///
    /// Returns `NbError` if multi-chain options are invalid.
    pub const fn validate(self) -> Result<(), NbError> {
        if self.chains < 2 {
            return Err(NbError::InvalidChainCount {
                min: 2,
                found: self.chains,
            });
        }
        if self.seed_stride == 0 {
            return Err(NbError::InvalidSeedStride);
        }
        Ok(())
    }

    /// Seed of chain `index` given the base seed.
    #[must_use]
    pub const fn chain_seed(self, base_seed: u64, index: usize) -> u64 {
        base_seed.wrapping_add((index as u64).wrapping_mul(self.seed_stride))
    }
}

/// Sampler diagnostics for one chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NbSamplerDiagnostics {
    pub sweeps_completed: usize,
    pub retained_draws: usize,
    pub hyper_refreshes: usize,
    pub cluster_proposals: ProposalStats,
}

/// Output report of one chain.
#[derive(Debug, Clone, Default)]
pub struct NbReport {
    pub diagnostics: NbSamplerDiagnostics,
    pub posterior_summary: Option<NbPosteriorSummary>,
}

/// Multi-chain split-R-hat diagnostics over hyperparameter traces.
#[derive(Debug, Clone, Default)]
pub struct NbConvergenceSummary {
    pub chain_count: usize,
    /// Draws per chain used after truncation to equal even length.
    pub draws_per_chain_used: usize,
    /// Split-R-hat per hyperparameter, ordered as `Hyperparameters::to_vec`.
    pub hyper_split_rhat: Vec<f64>,
    /// Split-R-hat of the chain log-likelihood trace.
    pub log_likelihood_split_rhat: Option<f64>,
    pub max_split_rhat: Option<f64>,
}

/// Output report for multi-chain sampling.
#[derive(Debug, Clone, Default)]
pub struct NbMultiChainReport {
    pub chain_reports: Vec<NbReport>,
    pub pooled_posterior_summary: Option<NbPosteriorSummary>,
    pub convergence: NbConvergenceSummary,
}

pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<f64, NbError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(NbError::InvalidParameter { name, value })
    }
}

pub(crate) fn check_finite(name: &'static str, value: f64) -> Result<f64, NbError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NbError::InvalidParameter { name, value })
    }
}

pub(crate) fn ensure_finite(value: f64, context: &'static str) -> Result<f64, NbError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NbError::NumericInstability { context })
    }
}

//! Hierarchical negative-binomial clustering of gene counts.
//!
//! Genes are assigned to clusters that share a dispersion `phi` and mean
//! `mu`; per-group fold changes `delta` scale the mean. Cluster parameters are
//! updated by Metropolis random walks and the log-normal hyperparameters by
//! conjugate draws under Jeffreys' prior. Reassigning genes to clusters and
//! switching differential-expression indicators is left to an external
//! driver that edits `McmcState` between sweeps.

pub mod diagnostics;
pub mod hyper;
pub mod likelihood;
pub mod posterior;
pub mod priors;
mod random;
pub mod sampler;
pub mod state;
pub mod types;

pub use diagnostics::{autocorrelation, effective_sample_size, summarize_multi_chain_convergence};
pub use hyper::{LogMoments, sample_hyperparameters, sample_normal_mean_var_jeffreys};
pub use likelihood::{
    cluster_loglik, loglik_by_assignment, loglik_by_assignment_per_group, loglik_by_group,
    nbinom_log_pmf,
};
pub use posterior::{
    NbPosteriorDraw, NbPosteriorSamples, NbPosteriorSummary, ParameterSummary, pool_samples,
    summarize_posterior,
};
pub use priors::{
    Hyperparameters, LogNormalHyper, log_delta_prior, log_normal_ln_density, log_prior,
    log_prior_rows, sample_delta_prior, sample_prior,
};
pub use sampler::{metropolis_update, run_sweep, sample_chain, sample_chains};
pub use state::{IndicatorMatrix, McmcState};
pub use types::{
    ClusterParams, ClusterUpdate, MultiChainOptions, NbConvergenceSummary, NbError,
    NbMultiChainReport, NbReport, NbSamplerConfig, NbSamplerDiagnostics, ProposalTuning,
};

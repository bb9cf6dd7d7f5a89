#![forbid(unsafe_code)]

//! # `nbclust`
//!
//! Bayesian clustering of RNA-seq count data under a hierarchical
//! negative-binomial model. Genes share `(phi, mu)` within a cluster,
//! per-group fold changes capture differential expression, and log-normal
//! priors tie the clusters together.
//!
//! The crate provides the numerical core of the sampler: likelihoods, priors,
//! Metropolis updates of cluster parameters, and conjugate hyperparameter
//! refreshes. A fixed-partition chain driver, posterior summaries, and
//! multi-chain diagnostics are built on top of that core.
//!
//! The library emits diagnostics through the [`log`] facade and installs no
//! logger.

pub mod inference;
pub mod input;
pub mod models;
pub mod preprocess;
pub mod utils;

pub use inference::{InferenceError, McmcConfig, ProposalStats};
pub use input::{CountDataset, InputError};
pub use preprocess::{
    CountDiagnostics, DEFAULT_LOW_COUNT_QUANTILE, count_diagnostics, gene_totals,
    remove_low_counts,
};

pub use models::nbinom::{
    ClusterParams, ClusterUpdate, Hyperparameters, IndicatorMatrix, LogMoments, LogNormalHyper,
    McmcState, MultiChainOptions, NbConvergenceSummary, NbError, NbMultiChainReport,
    NbPosteriorDraw, NbPosteriorSamples, NbPosteriorSummary, NbReport, NbSamplerConfig,
    NbSamplerDiagnostics, ParameterSummary, ProposalTuning, autocorrelation, cluster_loglik,
    effective_sample_size, log_delta_prior, log_normal_ln_density, log_prior, log_prior_rows,
    loglik_by_assignment, loglik_by_assignment_per_group, loglik_by_group, metropolis_update,
    nbinom_log_pmf, pool_samples, run_sweep, sample_chain, sample_chains, sample_delta_prior,
    sample_hyperparameters, sample_normal_mean_var_jeffreys, sample_prior,
    summarize_multi_chain_convergence, summarize_posterior,
};

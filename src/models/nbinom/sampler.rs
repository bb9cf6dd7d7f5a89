//! Metropolis updates of cluster parameters and the fixed-partition chain driver.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::inference::ProposalStats;
use crate::input::CountDataset;

use super::diagnostics::summarize_multi_chain_convergence;
use super::hyper::sample_hyperparameters;
use super::likelihood::{cluster_loglik, loglik_by_assignment};
use super::posterior::{
    NbPosteriorDraw, NbPosteriorSamples, pool_samples, summarize_posterior,
};
use super::priors::{Hyperparameters, log_prior};
use super::random::{sample_standard_normal, sample_uniform};
use super::state::McmcState;
use super::types::{
    ClusterParams, ClusterUpdate, MultiChainOptions, NbError, NbMultiChainReport, NbReport,
    NbSamplerConfig, NbSamplerDiagnostics, ProposalTuning, ensure_finite,
};

/// Propose and accept or reject new `(phi, mu)` for one cluster.
///
/// The proposal is a multiplicative log-normal random walk on both
/// coordinates. The state is not modified; commit an accepted update with
/// `McmcState::set_cluster_params`. A cluster without member genes is decided
/// by the prior ratio alone.
///
/// # Errors
///
/// Returns `NbError::ClusterOutOfRange` for an unknown cluster,
/// `NbError::InvalidProposalTuning` for an invalid step size, and
/// `NbError::NumericInstability` if either log-posterior is not finite.
pub fn metropolis_update(
    cluster: usize,
    dataset: &CountDataset,
    state: &McmcState,
    tuning: ProposalTuning,
    rng: &mut StdRng,
) -> Result<ClusterUpdate, NbError> {
    if !tuning.is_valid() {
        return Err(NbError::InvalidProposalTuning);
    }
    let current = state.cluster_params(cluster)?;
    let members = state.cluster_members(cluster);
    let hpars = state.hyperparameters();
    let delta = state.delta();

    let step = tuning.log_step_scale;
    let proposal = ClusterParams::new(
        current.phi * (step * sample_standard_normal(rng)).exp(),
        current.mu * (step * sample_standard_normal(rng)).exp(),
    );
    if proposal.validate().is_err() {
        log::warn!("cluster {cluster}: proposal {proposal:?} left the positive reals");
        return Err(NbError::NumericInstability {
            context: "cluster proposal",
        });
    }

    let current_log_posterior = log_posterior(dataset, &members, current, delta, hpars)
        .inspect_err(|err| log::warn!("cluster {cluster}: current state rejected: {err}"))?;
    let proposal_log_posterior = log_posterior(dataset, &members, proposal, delta, hpars)
        .inspect_err(|err| log::warn!("cluster {cluster}: proposal rejected: {err}"))?;

    let accepted = should_accept(proposal_log_posterior - current_log_posterior, rng);
    Ok(if accepted {
        ClusterUpdate {
            cluster,
            params: proposal,
            accepted,
            log_posterior: proposal_log_posterior,
        }
    } else {
        ClusterUpdate {
            cluster,
            params: current,
            accepted,
            log_posterior: current_log_posterior,
        }
    })
}

/// One sweep with the partition held fixed.
///
/// Every active cluster is updated and committed in increasing index order.
/// On refresh sweeps the hyperparameters are redrawn afterwards and, if
/// configured, inactive cluster rows are redrawn from the refreshed prior.
/// Returns whether the hyperparameters were refreshed.
///
/// # Errors
///
/// Returns `NbError` if any update fails.
pub fn run_sweep(
    dataset: &CountDataset,
    state: &mut McmcState,
    config: NbSamplerConfig,
    sweep: usize,
    stats: &mut ProposalStats,
    rng: &mut StdRng,
) -> Result<bool, NbError> {
    for cluster in state.active_clusters() {
        let update = metropolis_update(cluster, dataset, state, config.tuning, rng)?;
        stats.record(update.accepted);
        if update.accepted {
            state.set_cluster_params(cluster, update.params)?;
        }
    }

    if !config.schedule.is_refresh_sweep(sweep) {
        return Ok(false);
    }
    let hpars = sample_hyperparameters(state, config.tuning, rng)?;
    state.set_hyperparameters(hpars)?;
    if config.schedule.reseed_inactive {
        let reseeded = state.reseed_inactive(rng)?;
        if reseeded > 0 {
            log::debug!("sweep {sweep}: redrew {reseeded} inactive cluster rows");
        }
    }
    Ok(true)
}

/// Run one chain of `config.schedule.sweeps` sweeps on a caller-owned state.
///
/// The state is advanced in place. Every `thin`-th sweep after burn-in is
/// retained as a posterior draw.
///
/// # Errors
///
/// Returns `NbError` if the configuration is invalid, the state does not match
/// the dataset, or any sweep fails.
pub fn sample_chain(
    dataset: &CountDataset,
    state: &mut McmcState,
    config: NbSamplerConfig,
) -> Result<(NbReport, NbPosteriorSamples), NbError> {
    config.validate()?;
    check_state_matches(dataset, state)?;

    let schedule = config.schedule;
    let mut rng = StdRng::seed_from_u64(schedule.seed);
    let mut stats = ProposalStats::default();
    let mut hyper_refreshes = 0;
    let mut draws = Vec::with_capacity(schedule.retained_draws());

    log::info!(
        "starting chain: seed {}, {} sweeps, {} active of {} clusters, {} genes",
        schedule.seed,
        schedule.sweeps,
        state.n_active(),
        state.n_clusters(),
        dataset.n_genes()
    );

    for sweep in 0..schedule.sweeps {
        if run_sweep(dataset, state, config, sweep, &mut stats, &mut rng)? {
            hyper_refreshes += 1;
        }
        if schedule.is_retained(sweep) {
            draws.push(snapshot(dataset, state)?);
        }
    }

    let samples = NbPosteriorSamples { draws };
    log::info!(
        "finished chain: seed {}, {} retained draws, acceptance rate {:.3}",
        schedule.seed,
        samples.len(),
        stats.acceptance_rate()
    );

    let posterior_summary = if samples.is_empty() {
        None
    } else {
        Some(summarize_posterior(&samples))
    };
    let report = NbReport {
        diagnostics: NbSamplerDiagnostics {
            sweeps_completed: schedule.sweeps,
            retained_draws: samples.len(),
            hyper_refreshes,
            cluster_proposals: stats,
        },
        posterior_summary,
    };
    Ok((report, samples))
}

/// Run independent chains from a common initial state.
///
/// Chain `i` uses seed `options.chain_seed(config.schedule.seed, i)` and runs
/// on its own scoped thread with its own generator, so results do not depend
/// on scheduling.
///
/// # Errors
///
/// Returns `NbError` if the options are invalid, any chain fails, or the
/// chains retain too few draws for split-R-hat.
pub fn sample_chains(
    dataset: &CountDataset,
    initial_state: &McmcState,
    config: NbSamplerConfig,
    options: MultiChainOptions,
) -> Result<(NbMultiChainReport, Vec<NbPosteriorSamples>), NbError> {
    config.validate()?;
    options.validate()?;
    check_state_matches(dataset, initial_state)?;

    let results = std::thread::scope(|scope| {
        let handles = (0..options.chains)
            .map(|chain_index| {
                let mut chain_config = config;
                chain_config.schedule.seed = options.chain_seed(config.schedule.seed, chain_index);
                let mut state = initial_state.clone();
                scope.spawn(move || sample_chain(dataset, &mut state, chain_config))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .enumerate()
            .map(|(chain, handle)| {
                handle
                    .join()
                    .map_err(|_| NbError::ChainPanicked { chain })?
            })
            .collect::<Result<Vec<_>, NbError>>()
    })?;

    let (chain_reports, chain_posteriors): (Vec<_>, Vec<_>) = results.into_iter().unzip();
    let pooled = pool_samples(&chain_posteriors);
    let pooled_posterior_summary = if pooled.is_empty() {
        None
    } else {
        Some(summarize_posterior(&pooled))
    };
    let convergence = summarize_multi_chain_convergence(&chain_posteriors)?;
    if let Some(max_rhat) = convergence.max_split_rhat {
        log::info!(
            "{} chains finished, max split-R-hat {max_rhat:.3}",
            convergence.chain_count
        );
    }

    Ok((
        NbMultiChainReport {
            chain_reports,
            pooled_posterior_summary,
            convergence,
        },
        chain_posteriors,
    ))
}

fn log_posterior(
    dataset: &CountDataset,
    members: &[usize],
    params: ClusterParams,
    delta: &faer::Mat<f64>,
    hpars: &Hyperparameters,
) -> Result<f64, NbError> {
    let value = cluster_loglik(dataset, members, params, delta)? + log_prior(params, hpars)?;
    ensure_finite(value, "cluster log-posterior")
}

/// Accept uphill moves outright; draw the uniform only for downhill moves.
fn should_accept(log_acceptance: f64, rng: &mut StdRng) -> bool {
    log_acceptance > 0.0 || sample_uniform(rng) < log_acceptance.exp()
}

fn snapshot(dataset: &CountDataset, state: &McmcState) -> Result<NbPosteriorDraw, NbError> {
    let active_params = state
        .active_clusters()
        .into_iter()
        .map(|cluster| state.cluster_params(cluster))
        .collect::<Result<Vec<_>, _>>()?;
    let log_likelihood = loglik_by_assignment(dataset, state)?.iter().sum::<f64>();
    Ok(NbPosteriorDraw {
        hpars: *state.hyperparameters(),
        n_active: active_params.len(),
        active_params,
        log_likelihood,
    })
}

fn check_state_matches(dataset: &CountDataset, state: &McmcState) -> Result<(), NbError> {
    if state.n_genes() != dataset.n_genes() {
        return Err(NbError::DimensionMismatch {
            what: "state genes",
            expected: dataset.n_genes(),
            found: state.n_genes(),
        });
    }
    if state.delta().ncols() != dataset.n_groups() {
        return Err(NbError::DimensionMismatch {
            what: "fold-change columns",
            expected: dataset.n_groups(),
            found: state.delta().ncols(),
        });
    }
    Ok(())
}

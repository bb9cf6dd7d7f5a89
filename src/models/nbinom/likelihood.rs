//! Negative-binomial log-likelihood over grouped count data.
//!
//! With `alpha = 1 / phi` and `p = alpha / (alpha + s * mu)`, where `s` is the
//! sample's library size times the gene's fold change for the sample's group,
//!
//! ```text
//! ln f(c) = lnΓ(c + alpha) - lnΓ(alpha) - lnΓ(c + 1) + alpha ln p + c ln(1 - p)
//! ```
//!
//! evaluated through `x = s * mu * phi` as
//! `alpha ln p = -alpha ln(1 + x)` and `c ln(1 - p) = c (ln x - ln(1 + x))`.

use faer::Mat;
use statrs::function::gamma::ln_gamma;

use crate::input::CountDataset;

use super::state::McmcState;
use super::types::{ClusterParams, NbError, check_positive, ensure_finite};

/// Log-probability of a single count.
///
/// `scale` is the product of library size and fold change. A zero scale puts
/// all mass on `count == 0`.
#[must_use]
pub fn nbinom_log_pmf(count: f64, phi: f64, mu: f64, scale: f64) -> f64 {
    let alpha = phi.recip();
    let x = scale * mu * phi;
    let log_1p_x = x.ln_1p();

    let count_term = if count > 0.0 {
        count * (x.ln() - log_1p_x)
    } else {
        0.0
    };

    ln_gamma(count + alpha) - ln_gamma(alpha) - ln_gamma(count + 1.0) - alpha * log_1p_x
        + count_term
}

/// Per-gene, per-candidate log-likelihood.
///
/// Shapes: `candidates` is `k × 2` with columns `(phi, mu)`; `delta` is
/// `n_genes × n_groups`. Returns `n_genes × k`, where entry `(g, j)` sums over
/// every sample of gene `g` using the sample's group fold change
/// `delta[(g, group)]`.
///
/// # Errors
///
/// Returns `NbError` on shape mismatch, invalid parameters, or non-finite results.
pub fn loglik_by_group(
    dataset: &CountDataset,
    candidates: &Mat<f64>,
    delta: &Mat<f64>,
) -> Result<Mat<f64>, NbError> {
    if candidates.ncols() != 2 {
        return Err(NbError::DimensionMismatch {
            what: "candidate parameter columns",
            expected: 2,
            found: candidates.ncols(),
        });
    }
    validate_delta(dataset, delta)?;
    let params = (0..candidates.nrows())
        .map(|row| ClusterParams::new(candidates[(row, 0)], candidates[(row, 1)]).validate())
        .collect::<Result<Vec<_>, _>>()?;

    let mut loglik = Mat::<f64>::zeros(dataset.n_genes(), params.len());
    for gene in 0..dataset.n_genes() {
        for (col, candidate) in params.iter().copied().enumerate() {
            loglik[(gene, col)] = ensure_finite(
                gene_log_likelihood(dataset, gene, candidate, delta),
                "grouped log-likelihood",
            )?;
        }
    }
    Ok(loglik)
}

/// Per-gene, per-group log-likelihood under each gene's current cluster.
///
/// Returns `n_genes × n_groups`.
///
/// # Errors
///
/// Returns `NbError` on shape mismatch between dataset and state or non-finite results.
pub fn loglik_by_assignment_per_group(
    dataset: &CountDataset,
    state: &McmcState,
) -> Result<Mat<f64>, NbError> {
    if state.n_genes() != dataset.n_genes() {
        return Err(NbError::DimensionMismatch {
            what: "assignment vector",
            expected: dataset.n_genes(),
            found: state.n_genes(),
        });
    }
    validate_delta(dataset, state.delta())?;

    let mut loglik = Mat::<f64>::zeros(dataset.n_genes(), dataset.n_groups());
    for (gene, cluster) in state.assignments().iter().copied().enumerate() {
        let params = state.cluster_params(cluster)?;
        for (group, samples) in dataset.group_samples().enumerate() {
            loglik[(gene, group)] = ensure_finite(
                group_log_likelihood(
                    dataset,
                    samples,
                    gene,
                    params,
                    state.delta()[(gene, group)],
                ),
                "assigned log-likelihood",
            )?;
        }
    }
    Ok(loglik)
}

/// Per-gene log-likelihood under each gene's current cluster, length `n_genes`.
///
/// # Errors
///
/// Returns `NbError` on shape mismatch between dataset and state or non-finite results.
pub fn loglik_by_assignment(
    dataset: &CountDataset,
    state: &McmcState,
) -> Result<Vec<f64>, NbError> {
    let per_group = loglik_by_assignment_per_group(dataset, state)?;
    Ok((0..per_group.nrows())
        .map(|gene| {
            (0..per_group.ncols())
                .map(|group| per_group[(gene, group)])
                .sum()
        })
        .collect())
}

/// Summed log-likelihood of `members` under one parameter pair.
///
/// An empty member list contributes exactly `0`.
///
/// # Errors
///
/// Returns `NbError` on invalid parameters, shape mismatch, or non-finite results.
pub fn cluster_loglik(
    dataset: &CountDataset,
    members: &[usize],
    params: ClusterParams,
    delta: &Mat<f64>,
) -> Result<f64, NbError> {
    if members.is_empty() {
        return Ok(0.0);
    }
    let params = params.validate()?;
    validate_delta(dataset, delta)?;
    if let Some(&gene) = members.iter().find(|gene| **gene >= dataset.n_genes()) {
        return Err(NbError::DimensionMismatch {
            what: "cluster member index",
            expected: dataset.n_genes(),
            found: gene,
        });
    }

    let total = members
        .iter()
        .map(|&gene| gene_log_likelihood(dataset, gene, params, delta))
        .sum::<f64>();
    ensure_finite(total, "cluster log-likelihood")
}

fn gene_log_likelihood(
    dataset: &CountDataset,
    gene: usize,
    params: ClusterParams,
    delta: &Mat<f64>,
) -> f64 {
    dataset
        .group_samples()
        .enumerate()
        .map(|(group, samples)| {
            group_log_likelihood(dataset, samples, gene, params, delta[(gene, group)])
        })
        .sum()
}

fn group_log_likelihood(
    dataset: &CountDataset,
    samples: &[usize],
    gene: usize,
    params: ClusterParams,
    fold_change: f64,
) -> f64 {
    let counts = dataset.counts();
    let library_sizes = dataset.library_sizes();
    samples
        .iter()
        .map(|&sample| {
            nbinom_log_pmf(
                counts[(sample, gene)],
                params.phi,
                params.mu,
                library_sizes[sample] * fold_change,
            )
        })
        .sum()
}

fn validate_delta(dataset: &CountDataset, delta: &Mat<f64>) -> Result<(), NbError> {
    if delta.nrows() != dataset.n_genes() {
        return Err(NbError::DimensionMismatch {
            what: "fold-change rows",
            expected: dataset.n_genes(),
            found: delta.nrows(),
        });
    }
    if delta.ncols() != dataset.n_groups() {
        return Err(NbError::DimensionMismatch {
            what: "fold-change columns",
            expected: dataset.n_groups(),
            found: delta.ncols(),
        });
    }
    for gene in 0..delta.nrows() {
        for group in 0..delta.ncols() {
            check_positive("delta", delta[(gene, group)])?;
        }
    }
    Ok(())
}

use crate::input::{CountDataset, InputError};
use crate::utils::{column_sums, percentile, usize_to_f64};

/// Default quantile of gene totals at or below which genes are dropped.
pub const DEFAULT_LOW_COUNT_QUANTILE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountDiagnostics {
    pub n_samples: usize,
    pub n_genes: usize,
    pub total: f64,
    pub max_count: f64,
    pub n_zero: usize,
    pub zero_share: f64,
    /// Genes with no reads in any sample.
    pub n_silent_genes: usize,
}

#[must_use]
pub fn count_diagnostics(dataset: &CountDataset) -> CountDiagnostics {
    let counts = dataset.counts();
    let mut total = 0.0;
    let mut max_count = 0.0_f64;
    let mut n_zero = 0usize;

    for sample in 0..counts.nrows() {
        for gene in 0..counts.ncols() {
            let value = counts[(sample, gene)];
            total += value;
            max_count = max_count.max(value);
            if value == 0.0 {
                n_zero += 1;
            }
        }
    }

    let n_entries = counts.nrows() * counts.ncols();
    let zero_share = if n_entries > 0 {
        usize_to_f64(n_zero) / usize_to_f64(n_entries)
    } else {
        0.0
    };
    let n_silent_genes = gene_totals(dataset)
        .iter()
        .filter(|gene_total| **gene_total == 0.0)
        .count();

    CountDiagnostics {
        n_samples: dataset.n_samples(),
        n_genes: dataset.n_genes(),
        total,
        max_count,
        n_zero,
        zero_share,
        n_silent_genes,
    }
}

/// Total reads per gene across all samples.
#[must_use]
pub fn gene_totals(dataset: &CountDataset) -> Vec<f64> {
    column_sums(dataset.counts())
}

/// Drop genes whose total count is at or below the `quantile` of gene totals.
///
/// Returns the filtered dataset together with the original indices of the
/// kept genes. Library sizes of the filtered dataset still reflect the full
/// matrix.
///
/// # Errors
///
/// Returns `InputError::InvalidQuantile` for a quantile outside `[0, 1]` and
/// `InputError::NoGenesRetained` if every gene falls at or below the threshold.
pub fn remove_low_counts(
    dataset: &CountDataset,
    quantile: f64,
) -> Result<(CountDataset, Vec<usize>), InputError> {
    if !(0.0..=1.0).contains(&quantile) {
        return Err(InputError::InvalidQuantile { value: quantile });
    }

    let totals = gene_totals(dataset);
    let mut sorted = totals.clone();
    sorted.sort_by(f64::total_cmp);
    let threshold = percentile(&sorted, quantile);

    let kept = totals
        .iter()
        .enumerate()
        .filter_map(|(gene, total)| (*total > threshold).then_some(gene))
        .collect::<Vec<_>>();
    if kept.is_empty() {
        return Err(InputError::NoGenesRetained);
    }

    log::info!(
        "kept {} of {} genes with total count above {threshold}",
        kept.len(),
        totals.len()
    );
    Ok((dataset.select_genes(&kept)?, kept))
}

//! # Count inputs
//!
//! Defines an immutable, validated view over a sample-by-gene count matrix:
//! library sizes, exposures, and the grouping of samples into experimental
//! conditions.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use faer::Mat;
//! use nbclust::CountDataset;
//!
//! let counts = Mat::from_fn(4, 3, |i, j| if j == 0 { 0.0 } else { (i + j) as f64 });
//! let groups = BTreeMap::from([
//!     ("control".to_string(), vec![0, 1]),
//!     ("treated".to_string(), vec![2, 3]),
//! ]);
//! let dataset = CountDataset::new(counts, Some(groups)).unwrap();
//!
//! assert_eq!(dataset.n_samples(), 4);
//! assert_eq!(dataset.n_groups(), 2);
//! ```
//!
//! ```
//! use faer::Mat;
//! use nbclust::CountDataset;
//!
//! let counts = Mat::from_fn(2, 2, |i, _| if i == 0 { -1.0 } else { 3.0 });
//! assert!(CountDataset::new(counts, None).is_err());
//! ```

use std::collections::BTreeMap;

use faer::Mat;
use thiserror::Error;

use crate::utils::{matrix_is_finite, row_sums};

/// Errors returned when validating count inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("count matrix must have at least one sample and one gene")]
    EmptyCounts,
    #[error("count matrix contains non-finite values")]
    NonFiniteCounts,
    #[error("count matrix contains negative values")]
    NegativeCount,
    #[error("count at sample {sample}, gene {gene} is not an integer ({value})")]
    NonIntegerCount {
        sample: usize,
        gene: usize,
        value: f64,
    },
    #[error("exposures length ({len}) must match number of samples ({samples})")]
    ExposureLengthMismatch { len: usize, samples: usize },
    #[error("exposures must be finite and strictly positive")]
    NonPositiveExposure,
    #[error("group '{group}' is empty")]
    EmptyGroup { group: String },
    #[error("group '{group}' references sample {sample} but only {samples} samples exist")]
    SampleOutOfRange {
        group: String,
        sample: usize,
        samples: usize,
    },
    #[error("sample {sample} is assigned to more than one group")]
    DuplicateSample { sample: usize },
    #[error("sample {sample} is not assigned to any group")]
    UngroupedSample { sample: usize },
    #[error("quantile must lie in [0, 1]; found {value}")]
    InvalidQuantile { value: f64 },
    #[error("no genes remain after filtering")]
    NoGenesRetained,
    #[error("sample {sample} has no reads")]
    EmptyLibrary { sample: usize },
    #[error("gene {gene} is out of range for {genes} genes")]
    GeneOutOfRange { gene: usize, genes: usize },
}

/// Immutable sample-by-gene count data with per-sample normalization.
///
/// `counts` has shape `n_samples × n_genes`. Groups are iterated in name
/// order; that order fixes the column layout of every per-group matrix used
/// by the model.
#[derive(Debug, Clone)]
pub struct CountDataset {
    counts: Mat<f64>,
    library_sizes: Vec<f64>,
    exposures: Vec<f64>,
    groups: BTreeMap<String, Vec<usize>>,
}

impl CountDataset {
    /// Build a dataset from a raw count matrix.
    ///
    /// Without an explicit grouping every sample forms its own group, named by
    /// its index. Exposures default to `library_sizes / max(library_sizes)`.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if counts or grouping are malformed, or if a
    /// sample has no reads at all.
    pub fn new(
        counts: Mat<f64>,
        groups: Option<BTreeMap<String, Vec<usize>>>,
    ) -> Result<Self, InputError> {
        validate_counts(&counts)?;

        let n_samples = counts.nrows();
        let groups = groups.unwrap_or_else(|| {
            (0..n_samples)
                .map(|sample| (sample.to_string(), vec![sample]))
                .collect()
        });
        validate_groups(&groups, n_samples)?;

        let library_sizes = row_sums(&counts);
        if let Some(sample) = library_sizes.iter().position(|size| *size <= 0.0) {
            return Err(InputError::EmptyLibrary { sample });
        }
        let max_size = library_sizes.iter().copied().fold(0.0_f64, f64::max);
        let exposures = library_sizes.iter().map(|size| size / max_size).collect();

        Ok(Self {
            counts,
            library_sizes,
            exposures,
            groups,
        })
    }

    /// Replace the default exposures with caller-provided values.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the length mismatches or any exposure is not positive.
    pub fn with_exposures(mut self, exposures: Vec<f64>) -> Result<Self, InputError> {
        if exposures.len() != self.n_samples() {
            return Err(InputError::ExposureLengthMismatch {
                len: exposures.len(),
                samples: self.n_samples(),
            });
        }
        if exposures.iter().any(|value| !(value.is_finite() && *value > 0.0)) {
            return Err(InputError::NonPositiveExposure);
        }
        self.exposures = exposures;
        Ok(self)
    }

    #[must_use]
    pub const fn counts(&self) -> &Mat<f64> {
        &self.counts
    }

    #[must_use]
    pub fn library_sizes(&self) -> &[f64] {
        &self.library_sizes
    }

    #[must_use]
    pub fn exposures(&self) -> &[f64] {
        &self.exposures
    }

    #[must_use]
    pub const fn groups(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.groups
    }

    /// Sample indices of each group, in group-name order.
    pub fn group_samples(&self) -> impl Iterator<Item = &[usize]> {
        self.groups.values().map(Vec::as_slice)
    }

    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.counts.nrows()
    }

    #[must_use]
    pub fn n_genes(&self) -> usize {
        self.counts.ncols()
    }

    #[must_use]
    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Counts divided by the per-sample exposure, shape `n_samples × n_genes`.
    #[must_use]
    pub fn normalized_counts(&self) -> Mat<f64> {
        Mat::from_fn(self.n_samples(), self.n_genes(), |sample, gene| {
            self.counts[(sample, gene)] / self.exposures[sample]
        })
    }

    /// Restrict the dataset to a subset of genes, keeping sample metadata.
    ///
    /// Library sizes and exposures are carried over unchanged so that the
    /// normalization still reflects the full sequencing depth.
    ///
    /// # Errors
    ///
    /// Returns `InputError::EmptyCounts` for an empty selection and
    /// `InputError::GeneOutOfRange` for an unknown gene index.
    pub fn select_genes(&self, genes: &[usize]) -> Result<Self, InputError> {
        if genes.is_empty() {
            return Err(InputError::EmptyCounts);
        }
        if let Some(&gene) = genes.iter().find(|gene| **gene >= self.n_genes()) {
            return Err(InputError::GeneOutOfRange {
                gene,
                genes: self.n_genes(),
            });
        }
        Ok(Self {
            counts: Mat::from_fn(self.n_samples(), genes.len(), |sample, col| {
                self.counts[(sample, genes[col])]
            }),
            library_sizes: self.library_sizes.clone(),
            exposures: self.exposures.clone(),
            groups: self.groups.clone(),
        })
    }
}

fn validate_counts(counts: &Mat<f64>) -> Result<(), InputError> {
    if counts.nrows() == 0 || counts.ncols() == 0 {
        return Err(InputError::EmptyCounts);
    }
    if !matrix_is_finite(counts) {
        return Err(InputError::NonFiniteCounts);
    }
    for sample in 0..counts.nrows() {
        for gene in 0..counts.ncols() {
            let value = counts[(sample, gene)];
            if value < 0.0 {
                return Err(InputError::NegativeCount);
            }
            if value.fract() != 0.0 {
                return Err(InputError::NonIntegerCount {
                    sample,
                    gene,
                    value,
                });
            }
        }
    }
    Ok(())
}

fn validate_groups(
    groups: &BTreeMap<String, Vec<usize>>,
    n_samples: usize,
) -> Result<(), InputError> {
    let mut seen = vec![false; n_samples];
    for (group, samples) in groups {
        if samples.is_empty() {
            return Err(InputError::EmptyGroup {
                group: group.clone(),
            });
        }
        for &sample in samples {
            if sample >= n_samples {
                return Err(InputError::SampleOutOfRange {
                    group: group.clone(),
                    sample,
                    samples: n_samples,
                });
            }
            if std::mem::replace(&mut seen[sample], true) {
                return Err(InputError::DuplicateSample { sample });
            }
        }
    }
    if let Some(sample) = seen.iter().position(|assigned| !assigned) {
        return Err(InputError::UngroupedSample { sample });
    }
    Ok(())
}

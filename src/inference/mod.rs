//! Chain schedule and Metropolis acceptance bookkeeping.

use thiserror::Error;

use crate::utils::usize_to_f64;

/// Errors for MCMC schedule configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("sweeps must be positive")]
    InvalidSweeps,
    #[error("burn-in ({burn_in}) must be smaller than sweeps ({sweeps})")]
    InvalidBurnIn { burn_in: usize, sweeps: usize },
    #[error("thinning interval must be positive")]
    InvalidThinning,
    #[error("hyperparameter refresh interval must be positive")]
    InvalidRefreshInterval,
}

/// Sweep schedule for one chain.
#[derive(Debug, Clone, Copy)]
pub struct McmcConfig {
    /// Total number of sweeps over the active clusters.
    pub sweeps: usize,
    /// Sweeps discarded before retention.
    pub burn_in: usize,
    /// Keep every `thin`-th sweep after burn-in.
    pub thin: usize,
    /// Seed of the chain's single random generator.
    pub seed: u64,
    /// Refresh hyperparameters every `hyper_refresh_interval` sweeps.
    pub hyper_refresh_interval: usize,
    /// Redraw parameters of inactive clusters from the prior after each refresh.
    pub reseed_inactive: bool,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            sweeps: 2_000,
            burn_in: 500,
            thin: 5,
            seed: 42,
            hyper_refresh_interval: 1,
            reseed_inactive: true,
        }
    }
}

impl McmcConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub const fn validate(self) -> Result<(), InferenceError> {
        if self.sweeps == 0 {
            return Err(InferenceError::InvalidSweeps);
        }
        if self.burn_in >= self.sweeps {
            return Err(InferenceError::InvalidBurnIn {
                burn_in: self.burn_in,
                sweeps: self.sweeps,
            });
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        if self.hyper_refresh_interval == 0 {
            return Err(InferenceError::InvalidRefreshInterval);
        }
        Ok(())
    }

    /// Number of retained draws implied by this configuration.
    #[must_use]
    pub const fn retained_draws(self) -> usize {
        (self.sweeps - self.burn_in).div_ceil(self.thin)
    }

    /// Whether the zero-based `sweep` ends with a hyperparameter refresh.
    #[must_use]
    pub const fn is_refresh_sweep(self, sweep: usize) -> bool {
        (sweep + 1).is_multiple_of(self.hyper_refresh_interval)
    }

    /// Whether the zero-based `sweep` is kept in the posterior trace.
    #[must_use]
    pub const fn is_retained(self, sweep: usize) -> bool {
        sweep >= self.burn_in && (sweep - self.burn_in).is_multiple_of(self.thin)
    }
}

/// Proposal counters for a single Metropolis block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl ProposalStats {
    /// Record one proposal and whether it was accepted.
    pub const fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Fold another block's counters into this one.
    pub const fn merge(&mut self, other: Self) {
        self.proposed += other.proposed;
        self.accepted += other.accepted;
    }

    /// Acceptance rate in `[0, 1]`, or `0` if no proposals were made.
    #[must_use]
    pub fn acceptance_rate(self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            usize_to_f64(self.accepted) / usize_to_f64(self.proposed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_rejects_zero_sweeps() {
        let config = McmcConfig {
            sweeps: 0,
            ..McmcConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidSweeps));
    }

    #[test]
    fn config_validation_rejects_zero_refresh_interval() {
        let config = McmcConfig {
            hyper_refresh_interval: 0,
            ..McmcConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(InferenceError::InvalidRefreshInterval)
        );
    }

    #[test]
    fn retained_draws_match_retention_rule() {
        let config = McmcConfig {
            sweeps: 23,
            burn_in: 3,
            thin: 4,
            ..McmcConfig::default()
        };
        let retained = (0..config.sweeps)
            .filter(|sweep| config.is_retained(*sweep))
            .count();
        assert_eq!(retained, config.retained_draws());
        assert_eq!(retained, 5);
    }

    #[test]
    fn refresh_sweeps_follow_interval() {
        let config = McmcConfig {
            hyper_refresh_interval: 3,
            ..McmcConfig::default()
        };
        assert!(!config.is_refresh_sweep(0));
        assert!(config.is_refresh_sweep(2));
        assert!(config.is_refresh_sweep(5));
    }

    #[test]
    fn proposal_stats_tracks_acceptance() {
        let mut stats = ProposalStats::default();
        stats.record(true);
        stats.record(false);
        let mut total = ProposalStats::default();
        total.merge(stats);
        total.merge(stats);
        assert_eq!(total.proposed, 4);
        assert!((total.acceptance_rate() - 0.5).abs() < 1.0e-12);
    }
}

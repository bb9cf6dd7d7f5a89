use std::collections::BTreeMap;

use faer::Mat;
use nbclust::{
    CountDataset, Hyperparameters, IndicatorMatrix, McmcConfig, McmcState, MultiChainOptions,
    NbSamplerConfig, ProposalStats, count_diagnostics, effective_sample_size, remove_low_counts,
    run_sweep, sample_chain, sample_chains,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const LOW_BASE: [f64; 4] = [2.0, 18.0, 6.0, 14.0];
const HIGH_BASE: [f64; 4] = [20.0, 80.0, 35.0, 65.0];

/// Eight low-expression and eight high-expression genes whose counts cycle
/// through the base patterns, so that every sample has the same library size.
fn balanced_counts() -> Mat<f64> {
    Mat::from_fn(4, 16, |sample, gene| {
        let base = if gene < 8 { LOW_BASE } else { HIGH_BASE };
        base[(sample + gene) % 4]
    })
}

fn true_mu(base: [f64; 4]) -> f64 {
    let library_size = 2.0 * LOW_BASE.iter().sum::<f64>() + 2.0 * HIGH_BASE.iter().sum::<f64>();
    base.iter().sum::<f64>() / 4.0 / library_size
}

fn partitioned_state(dataset: &CountDataset, mu_scale: f64) -> McmcState {
    let d = (0..16).map(|gene| usize::from(gene >= 8)).collect::<Vec<_>>();
    let pars = Mat::from_fn(2, 2, |row, col| match (row, col) {
        (_, 0) => 0.3,
        (0, _) => true_mu(LOW_BASE) * mu_scale,
        _ => true_mu(HIGH_BASE) * mu_scale,
    });
    McmcState::new(
        d,
        pars,
        Mat::from_fn(16, dataset.n_groups(), |_, _| 1.0),
        IndicatorMatrix::new(16, dataset.n_groups()),
        Hyperparameters::default(),
    )
    .expect("valid state")
}

#[test]
fn fixed_partition_chain_recovers_cluster_means() {
    let dataset = CountDataset::new(balanced_counts(), None).expect("valid dataset");
    assert!(
        dataset
            .library_sizes()
            .iter()
            .all(|size| (size - 480.0).abs() < 1e-12)
    );

    let mut state = partitioned_state(&dataset, 1.25);
    let config = NbSamplerConfig {
        schedule: McmcConfig {
            sweeps: 800,
            burn_in: 300,
            thin: 5,
            seed: 2024,
            ..McmcConfig::default()
        },
        ..NbSamplerConfig::default()
    };

    let (report, samples) = sample_chain(&dataset, &mut state, config).expect("chain");
    assert_eq!(samples.len(), 100);
    assert!(report.diagnostics.cluster_proposals.acceptance_rate() > 0.5);

    let n = f64::from(u32::try_from(samples.len()).unwrap_or(u32::MAX));
    let mean_mu = |cluster: usize| {
        samples
            .draws
            .iter()
            .map(|draw| draw.active_params[cluster].mu)
            .sum::<f64>()
            / n
    };
    let low = mean_mu(0);
    let high = mean_mu(1);
    assert!(
        (low / true_mu(LOW_BASE) - 1.0).abs() < 0.2,
        "low cluster mean {low} vs {}",
        true_mu(LOW_BASE)
    );
    assert!(
        (high / true_mu(HIGH_BASE) - 1.0).abs() < 0.2,
        "high cluster mean {high} vs {}",
        true_mu(HIGH_BASE)
    );
    assert!(
        samples
            .draws
            .iter()
            .all(|draw| draw.active_params[0].mu < draw.active_params[1].mu)
    );

    let trace = samples.log_likelihood_trace();
    let ess = effective_sample_size(&trace);
    assert!(ess > 0.0 && ess <= n);
}

#[test]
fn preprocessing_feeds_a_grouped_chain() {
    let mut counts = balanced_counts();
    for sample in 0..4 {
        counts[(sample, 3)] = 0.0;
    }
    let groups = BTreeMap::from([
        ("control".to_string(), vec![0, 2]),
        ("treated".to_string(), vec![1, 3]),
    ]);
    let dataset = CountDataset::new(counts, Some(groups)).expect("valid dataset");
    let diagnostics = count_diagnostics(&dataset);
    assert_eq!(diagnostics.n_silent_genes, 1);

    let (filtered, kept) = remove_low_counts(&dataset, 0.05).expect("filter");
    assert_eq!(filtered.n_genes(), 15);
    assert!(!kept.contains(&3));
    assert_eq!(filtered.group_names(), vec!["control", "treated"]);

    let mut rng = StdRng::seed_from_u64(7);
    let mut state = McmcState::from_prior(
        6,
        filtered.n_genes(),
        filtered.n_groups(),
        Hyperparameters::default(),
        &mut rng,
    )
    .expect("prior state");
    let config = NbSamplerConfig {
        schedule: McmcConfig {
            sweeps: 60,
            burn_in: 20,
            thin: 2,
            seed: 3,
            ..McmcConfig::default()
        },
        ..NbSamplerConfig::default()
    };
    let (report, samples) = sample_chain(&filtered, &mut state, config).expect("chain");
    assert_eq!(samples.len(), 20);
    assert_eq!(report.diagnostics.hyper_refreshes, 60);
    let summary = report.posterior_summary.expect("summary");
    assert_eq!(summary.hyperparameters.len(), Hyperparameters::LEN);
    assert!(summary.hyperparameters.iter().all(|h| h.mean.is_finite()));
}

#[test]
fn external_driver_can_edit_state_between_sweeps() {
    let dataset = CountDataset::new(balanced_counts(), None).expect("valid dataset");
    let mut rng = StdRng::seed_from_u64(31);
    let mut state = McmcState::from_prior(
        4,
        dataset.n_genes(),
        dataset.n_groups(),
        Hyperparameters::default(),
        &mut rng,
    )
    .expect("prior state");
    let config = NbSamplerConfig::default();
    let mut stats = ProposalStats::default();

    let active_before = state.n_active();
    run_sweep(&dataset, &mut state, config, 0, &mut stats, &mut rng).expect("sweep");
    assert_eq!(stats.proposed, active_before);

    // Collapse every gene into one cluster and open two empty slots.
    state.set_assignments(vec![0; 16]).expect("assignments");
    let first_new = state.grow_clusters(2, &mut rng).expect("grow");
    assert_eq!(first_new, 4);
    assert_eq!(state.n_clusters(), 6);
    assert_eq!(state.active_clusters(), vec![0]);

    let mut z = IndicatorMatrix::new(16, dataset.n_groups());
    z.set(15, 3, true);
    state.set_indicators(z).expect("indicators");
    let mut delta = state.delta().clone();
    delta[(15, 3)] = 2.5;
    state.set_delta(delta).expect("delta");

    let mut stats = ProposalStats::default();
    run_sweep(&dataset, &mut state, config, 1, &mut stats, &mut rng).expect("sweep");
    assert_eq!(stats.proposed, 1);
    assert!(state.hyperparameters().delta_de.var > 0.0);
}

#[test]
fn multi_chain_workflow_reports_convergence() {
    let dataset = CountDataset::new(balanced_counts(), None).expect("valid dataset");
    let state = partitioned_state(&dataset, 1.0);
    let config = NbSamplerConfig {
        schedule: McmcConfig {
            sweeps: 200,
            burn_in: 100,
            thin: 5,
            seed: 11,
            ..McmcConfig::default()
        },
        ..NbSamplerConfig::default()
    };

    let (report, chains) =
        sample_chains(&dataset, &state, config, MultiChainOptions::default()).expect("chains");
    assert_eq!(chains.len(), 4);
    assert!(chains.iter().all(|chain| chain.len() == 20));
    assert_eq!(report.convergence.draws_per_chain_used, 20);
    assert!(
        report
            .convergence
            .hyper_split_rhat
            .iter()
            .all(|rhat| rhat.is_finite() && *rhat >= 1.0)
    );
    assert_eq!(
        report
            .pooled_posterior_summary
            .expect("pooled summary")
            .draw_count,
        80
    );
}

use approx::assert_relative_eq;
use faer::Mat;
use nbclust::{
    ClusterParams, CountDataset, Hyperparameters, IndicatorMatrix, LogNormalHyper, McmcConfig,
    McmcState, NbError, NbSamplerConfig, ProposalTuning, log_delta_prior, log_prior,
    loglik_by_assignment, loglik_by_assignment_per_group, loglik_by_group, metropolis_update,
    sample_chain, sample_hyperparameters, sample_prior,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

fn varied_dataset() -> CountDataset {
    let counts = Mat::from_fn(5, 7, |sample, gene| {
        usize_to_f64((3 * sample + 5 * gene + sample * gene) % 23)
    });
    CountDataset::new(counts, None).expect("valid dataset")
}

fn varied_state(dataset: &CountDataset) -> McmcState {
    let pars = Mat::from_fn(3, 2, |row, col| {
        if col == 0 {
            0.1 + 0.4 * usize_to_f64(row)
        } else {
            0.01 + 0.02 * usize_to_f64(row)
        }
    });
    let n_groups = dataset.n_groups();
    McmcState::new(
        vec![0, 2, 1, 0, 2, 2, 0],
        pars,
        Mat::from_fn(7, n_groups, |gene, group| {
            0.5 + 0.25 * usize_to_f64((gene + group) % 4)
        }),
        IndicatorMatrix::from_fn(7, n_groups, |gene, group| (gene + group) % 3 == 0),
        Hyperparameters::default(),
    )
    .expect("valid state")
}

#[test]
fn two_sample_scenario_matches_closed_form() {
    let counts = Mat::from_fn(2, 1, |sample, _| if sample == 0 { 10.0 } else { 20.0 });
    let dataset = CountDataset::new(counts, None).expect("valid dataset");
    assert_eq!(dataset.library_sizes(), &[10.0, 20.0]);

    let candidates = Mat::from_fn(1, 2, |_, _| 1.0);
    let delta = Mat::from_fn(1, 2, |_, _| 1.0);
    let loglik = loglik_by_group(&dataset, &candidates, &delta).expect("loglik");

    // With phi = mu = delta = 1 the kernel reduces to a geometric law.
    let expected = -(11.0_f64).ln() + 10.0 * (10.0_f64 / 11.0).ln() - (21.0_f64).ln()
        + 20.0 * (20.0_f64 / 21.0).ln();
    assert_relative_eq!(loglik[(0, 0)], expected, max_relative = 1.0e-10);
}

#[test]
fn assignment_likelihood_equals_grouped_likelihood_at_assigned_cluster() {
    let dataset = varied_dataset();
    let state = varied_state(&dataset);

    let by_group = loglik_by_group(&dataset, state.pars(), state.delta()).expect("by group");
    let by_assignment = loglik_by_assignment(&dataset, &state).expect("by assignment");
    let per_group = loglik_by_assignment_per_group(&dataset, &state).expect("per group");

    assert_eq!(by_group.nrows(), 7);
    assert_eq!(by_group.ncols(), 3);
    assert_eq!(per_group.ncols(), dataset.n_groups());
    for (gene, &cluster) in state.assignments().iter().enumerate() {
        assert_relative_eq!(
            by_assignment[gene],
            by_group[(gene, cluster)],
            max_relative = 1.0e-12
        );
        let row_total = (0..per_group.ncols())
            .map(|group| per_group[(gene, group)])
            .sum::<f64>();
        assert_relative_eq!(by_assignment[gene], row_total, max_relative = 1.0e-12);
    }
}

#[test]
fn prior_draws_are_strictly_positive_even_for_extreme_hyperparameters() {
    let extreme = Hyperparameters {
        phi: LogNormalHyper::new(900.0, 1.0e4),
        mu: LogNormalHyper::new(-900.0, 1.0e4),
        ..Hyperparameters::default()
    };
    let mut rng = StdRng::seed_from_u64(13);
    for hpars in [Hyperparameters::default(), extreme] {
        let pars = sample_prior(500, &hpars, &mut rng).expect("prior draws");
        for row in 0..pars.nrows() {
            for col in 0..2 {
                let value = pars[(row, col)];
                assert!(value.is_finite() && value > 0.0, "draw {value}");
            }
        }
    }
}

#[test]
fn priors_read_only_their_own_hyperparameters() {
    let params = ClusterParams::new(0.4, 2.0);
    let base = Hyperparameters::default();
    let shifted_delta = Hyperparameters {
        delta_de: LogNormalHyper::new(3.0, 0.5),
        delta_null: LogNormalHyper::new(-2.0, 7.0),
        ..base
    };
    assert_relative_eq!(
        log_prior(params, &base).expect("prior"),
        log_prior(params, &shifted_delta).expect("prior")
    );

    let delta = Mat::from_fn(2, 2, |_, _| 1.5);
    let z = IndicatorMatrix::from_fn(2, 2, |gene, _| gene == 0);
    let shifted_cluster = Hyperparameters {
        phi: LogNormalHyper::new(5.0, 0.1),
        mu: LogNormalHyper::new(5.0, 0.1),
        ..base
    };
    assert_relative_eq!(
        log_delta_prior(&delta, &z, &base).expect("delta prior"),
        log_delta_prior(&delta, &z, &shifted_cluster).expect("delta prior")
    );
}

#[test]
fn single_active_cluster_refresh_keeps_variances_positive() {
    let dataset = varied_dataset();
    let state = McmcState::new(
        vec![1; 7],
        Mat::from_fn(3, 2, |_, _| 0.5),
        Mat::from_fn(7, dataset.n_groups(), |_, _| 1.0),
        IndicatorMatrix::new(7, dataset.n_groups()),
        Hyperparameters::default(),
    )
    .expect("valid state");

    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..100 {
        let hpars =
            sample_hyperparameters(&state, ProposalTuning::default(), &mut rng).expect("refresh");
        assert!(hpars.phi.var > 0.0 && hpars.phi.var.is_finite());
        assert!(hpars.mu.var > 0.0 && hpars.mu.var.is_finite());
        assert_eq!(hpars.delta_de, state.hyperparameters().delta_de);
    }
}

#[test]
fn chains_are_bit_identical_for_equal_seeds() {
    let dataset = varied_dataset();
    let config = NbSamplerConfig {
        schedule: McmcConfig {
            sweeps: 50,
            burn_in: 10,
            thin: 4,
            seed: 77,
            ..McmcConfig::default()
        },
        ..NbSamplerConfig::default()
    };

    let run = || {
        let mut state = varied_state(&dataset);
        let (_, samples) = sample_chain(&dataset, &mut state, config).expect("chain");
        samples
            .draws
            .iter()
            .map(|draw| {
                let mut flat = draw.hpars.to_vec().to_vec();
                flat.push(draw.log_likelihood);
                flat.extend(draw.active_params.iter().flat_map(|p| [p.phi, p.mu]));
                flat.into_iter().map(f64::to_bits).collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn metropolis_errors_are_typed() {
    let dataset = varied_dataset();
    let state = varied_state(&dataset);
    let mut rng = StdRng::seed_from_u64(2);

    assert!(matches!(
        metropolis_update(9, &dataset, &state, ProposalTuning::default(), &mut rng),
        Err(NbError::ClusterOutOfRange {
            cluster: 9,
            n_clusters: 3
        })
    ));

    let other = CountDataset::new(Mat::from_fn(5, 2, |_, _| 1.0), None).expect("valid dataset");
    assert!(matches!(
        metropolis_update(0, &other, &state, ProposalTuning::default(), &mut rng),
        Err(NbError::DimensionMismatch { .. })
    ));
}

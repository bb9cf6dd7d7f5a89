//! Random variates drawn from the chain's single generator.

use rand::RngExt;
use rand::rngs::StdRng;

/// Box-Muller standard normal draw.
pub(crate) fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Uniform draw on `[0, 1)`.
pub(crate) fn sample_uniform(rng: &mut StdRng) -> f64 {
    rng.random::<f64>()
}

/// Marsaglia-Tsang gamma draw with the given shape and scale.
///
/// Returns `NaN` for non-positive shape or scale.
pub(crate) fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if !(shape > 0.0 && scale > 0.0) {
        return f64::NAN;
    }

    if shape < 1.0 {
        let u = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let shape_minus_third = shape - (1.0 / 3.0);
    let coeff = (1.0 / (9.0 * shape_minus_third)).sqrt();
    loop {
        let standard_normal = sample_standard_normal(rng);
        let one_plus_coeff_noise = coeff.mul_add(standard_normal, 1.0);
        if one_plus_coeff_noise <= 0.0 {
            continue;
        }
        let cubic_term = one_plus_coeff_noise * one_plus_coeff_noise * one_plus_coeff_noise;
        let uniform = rng.random::<f64>();
        if uniform
            < (0.0331 * standard_normal * standard_normal * standard_normal)
                .mul_add(-standard_normal, 1.0)
        {
            return scale * shape_minus_third * cubic_term;
        }
        if uniform.ln()
            < (0.5 * standard_normal).mul_add(
                standard_normal,
                shape_minus_third * (1.0 - cubic_term + cubic_term.ln()),
            )
        {
            return scale * shape_minus_third * cubic_term;
        }
    }
}

/// `exp(mean + sd * N(0, 1))` kept inside the positive finite range.
pub(crate) fn sample_log_normal(rng: &mut StdRng, mean: f64, var: f64) -> f64 {
    var.sqrt()
        .mul_add(sample_standard_normal(rng), mean)
        .exp()
        .clamp(f64::MIN_POSITIVE, f64::MAX)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::utils::usize_to_f64;

    #[test]
    fn gamma_draws_match_shape_scale_mean() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        for (shape, scale) in [(0.5, 2.0), (3.0, 0.5)] {
            let mean = (0..n)
                .map(|_| sample_gamma(&mut rng, shape, scale))
                .sum::<f64>()
                / usize_to_f64(n);
            assert!((mean - shape * scale).abs() < 0.05 * shape * scale + 0.02);
        }
    }

    #[test]
    fn gamma_rejects_invalid_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_gamma(&mut rng, 0.0, 1.0).is_nan());
    }

    #[test]
    fn standard_normal_has_unit_variance() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 20_000;
        let draws = (0..n)
            .map(|_| sample_standard_normal(&mut rng))
            .collect::<Vec<_>>();
        let mean = draws.iter().sum::<f64>() / usize_to_f64(n);
        let var = draws.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / usize_to_f64(n);
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }

    #[test]
    fn log_normal_stays_positive_under_extreme_hyperparameters() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let low = sample_log_normal(&mut rng, -1.0e6, 1.0);
            let high = sample_log_normal(&mut rng, 1.0e6, 1.0);
            assert!(low > 0.0 && low.is_finite());
            assert!(high > 0.0 && high.is_finite());
        }
    }
}

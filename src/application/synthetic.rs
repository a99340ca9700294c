//! Bootstrap data generators.
//!
//! Used whenever no real labeled dataset is supplied: the classifier gets a
//! seeded corpus with a noisy-but-learnable label rule, the forecaster a
//! seeded synthetic volatility surface. Neither claims anything about real
//! market profitability; they exist so a cold start still produces a
//! servable artifact.

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal, Poisson};
use std::f64::consts::PI;

use crate::domain::signal::{LabeledSignal, SignalFeatures};
use crate::domain::surface::SurfaceRow;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CORPUS_SIZE: usize = 10_000;
pub const DEFAULT_SURFACE_DAYS: usize = 100;
pub const DEFAULT_STRIKES_PER_DAY: usize = 20;

/// Draws a labeled classifier corpus from fixed parametric distributions.
/// The same seed and sample count always produce an identical corpus.
pub fn signal_corpus(num_samples: usize, seed: u64) -> Vec<LabeledSignal> {
    let mut rng = StdRng::seed_from_u64(seed);

    let edge = Normal::new(12.0, 8.0).expect("valid distribution");
    let delta = Normal::new(0.5, 0.3).expect("valid distribution");
    let gamma = Normal::new(0.005, 0.003).expect("valid distribution");
    let vega = Normal::new(50.0, 30.0).expect("valid distribution");
    let theta = Normal::new(-10.0, 5.0).expect("valid distribution");
    let volume = Poisson::new(1000.0).expect("valid distribution");
    let open_interest = Poisson::new(5000.0).expect("valid distribution");

    let mut corpus = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        let features = SignalFeatures {
            edge_percent: edge.sample(&mut rng),
            delta: delta.sample(&mut rng),
            gamma: gamma.sample(&mut rng),
            vega: vega.sample(&mut rng),
            theta: theta.sample(&mut rng),
            volume: volume.sample(&mut rng),
            open_interest: open_interest.sample(&mut rng),
            days_to_expiry: rng.random_range(7..90) as f64,
        };
        let score = profit_score(&features, rng.random::<f64>());
        corpus.push(LabeledSignal {
            features,
            is_profitable: score > 0.5,
        });
    }
    corpus
}

/// Weighted composite behind the bootstrap labels. Each term is capped at
/// 1.0 before weighting; the trailing noise keeps the decision boundary
/// fuzzy enough that a model has to generalize rather than memorize.
fn profit_score(f: &SignalFeatures, noise: f64) -> f64 {
    0.3 * (f.edge_percent / 20.0).min(1.0)
        + 0.2 * (1.0 - (f.delta - 0.5).abs())
        + 0.2 * (f.volume / 2000.0).min(1.0)
        + 0.1 * (f.open_interest / 10_000.0).min(1.0)
        + 0.1 * (f.days_to_expiry / 60.0).min(1.0)
        + 0.1 * noise
}

/// Generates a synthetic volatility surface: a linear trend with 30-day
/// seasonality, occasional spike days, a put/call smile around a slowly
/// appreciating reference price, and log-normal per-strike volume.
pub fn vol_surface(num_days: usize, strikes_per_day: usize, seed: u64) -> Vec<SurfaceRow> {
    let mut rng = StdRng::seed_from_u64(seed);

    let noise = Normal::new(0.0, 0.1).expect("valid distribution");
    let volume = LogNormal::new(6.0, 1.0).expect("valid distribution");
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid calendar date");

    let mut rows = Vec::with_capacity(num_days * strikes_per_day);
    for i in 0..num_days {
        let date = start
            .checked_add_days(Days::new(i as u64))
            .expect("date in range");

        let mut base_vol = 0.3 + 0.001 * i as f64 + 0.05 * (2.0 * PI * i as f64 / 30.0).sin();
        if rng.random::<f64>() < 0.1 {
            base_vol *= 1.0 + rng.random_range(0.2..0.5);
        }

        let price = 100.0 * (1.0 + 0.001 * i as f64);
        let lo = price * 0.7;
        let step = if strikes_per_day > 1 {
            price * 0.6 / (strikes_per_day - 1) as f64
        } else {
            0.0
        };

        for k in 0..strikes_per_day {
            let strike = lo + step * k as f64;
            let moneyness = strike / price;
            // Puts carry the heavier skew.
            let smile = if moneyness < 1.0 {
                1.0 + 0.1 * (1.0 - moneyness)
            } else {
                1.0 + 0.05 * (moneyness - 1.0)
            };
            let implied_vol = base_vol * smile * (1.0 + noise.sample(&mut rng));

            rows.push(SurfaceRow {
                date,
                strike,
                implied_vol,
                volume: volume.sample(&mut rng),
                moneyness: Some(moneyness),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_is_reproducible_for_fixed_seed() {
        let a = signal_corpus(500, DEFAULT_SEED);
        let b = signal_corpus(500, DEFAULT_SEED);
        assert_eq!(a, b);
    }

    #[test]
    fn test_corpus_differs_across_seeds() {
        let a = signal_corpus(100, 1);
        let b = signal_corpus(100, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_corpus_has_both_classes() {
        let corpus = signal_corpus(DEFAULT_CORPUS_SIZE, DEFAULT_SEED);
        assert_eq!(corpus.len(), DEFAULT_CORPUS_SIZE);
        let profitable = corpus.iter().filter(|s| s.is_profitable).count();
        assert!(profitable > 0 && profitable < corpus.len());
    }

    #[test]
    fn test_profit_score_caps_each_term() {
        let features = SignalFeatures {
            edge_percent: 1e6,
            delta: 0.5,
            gamma: 0.005,
            vega: 50.0,
            theta: -10.0,
            volume: 1e9,
            open_interest: 1e9,
            days_to_expiry: 1e6,
        };
        // Every capped term saturates; only the noise term still moves.
        assert!(profit_score(&features, 0.0) <= 0.9 + 1e-12);
        assert!(profit_score(&features, 1.0) <= 1.0 + 1e-12);
    }

    #[test]
    fn test_surface_shape_and_dates() {
        let rows = vol_surface(30, 5, DEFAULT_SEED);
        assert_eq!(rows.len(), 30 * 5);

        let distinct: std::collections::BTreeSet<_> = rows.iter().map(|r| r.date).collect();
        assert_eq!(distinct.len(), 30);

        // Strikes span +-30% of the reference price.
        let first_day: Vec<_> = rows.iter().take(5).collect();
        assert!((first_day[0].strike - 70.0).abs() < 1e-9);
        assert!((first_day[4].strike - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_surface_is_reproducible_for_fixed_seed() {
        let a = vol_surface(10, 3, 7);
        let b = vol_surface(10, 3, 7);
        assert_eq!(a, b);
    }
}

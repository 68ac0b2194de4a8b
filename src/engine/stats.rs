//! Per-competitor ex-Gaussian models.
//!
//! Every historical solve is weighted by `exp(-ln 2 / half_life * days_since)`.
//! The model is fitted by moments on the weighted, trimmed DNF-free solves:
//! with skew `g` clamped to `[0, 0.99]`, `tau = sd * (g/2)^(1/3)`,
//! `mu = mean - tau` and `sigma = sd * sqrt(1 - (g/2)^(2/3))`.

use std::f64::consts::LN_2;

use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};

use crate::aggregate::DatedResults;
use crate::solve::DNF;
use crate::time::DateWindow;

/// Solves above `mean + TRIM_SIGMAS * sd` are treated as outliers.
const TRIM_SIGMAS: f64 = 2.0;

const MAX_SKEW: f64 = 0.99;

/// A solve and its recency weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedSample {
    /// Solve value.
    pub value: i32,
    /// Recency weight in `(0, 1]`.
    pub weight: f64,
}

/// Applies exponential recency weights relative to the end of `window`.
#[must_use]
pub fn weight_history(history: &[DatedResults], window: &DateWindow, half_life_days: f64) -> Vec<WeightedSample> {
    let decay = LN_2 / half_life_days;
    history
        .iter()
        .flat_map(|competition| {
            #[allow(clippy::cast_precision_loss)]
            let days = window.days_before_end(competition.date) as f64;
            let weight = (-decay * days).exp();
            competition
                .solves
                .iter()
                .map(move |&value| WeightedSample { value, weight })
        })
        .collect()
}

struct Moments {
    mean: f64,
    stdev: f64,
}

fn weighted_moments(samples: &[WeightedSample]) -> Option<Moments> {
    let total: f64 = samples.iter().map(|s| s.weight).sum();
    if total <= 0.0 {
        return None;
    }
    let mean = samples.iter().map(|s| f64::from(s.value) * s.weight).sum::<f64>() / total;
    let variance = samples
        .iter()
        .map(|s| s.weight * (f64::from(s.value) - mean).powi(2))
        .sum::<f64>()
        / total;
    Some(Moments {
        mean,
        stdev: variance.max(0.0).sqrt(),
    })
}

fn weighted_skew(samples: &[WeightedSample], moments: &Moments) -> f64 {
    if moments.stdev <= 0.0 {
        return 0.0;
    }
    let total: f64 = samples.iter().map(|s| s.weight).sum();
    samples
        .iter()
        .map(|s| s.weight * ((f64::from(s.value) - moments.mean) / moments.stdev).powi(3))
        .sum::<f64>()
        / total
}

/// Fitted result model of one competitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorModel {
    /// Gaussian mean (centiseconds).
    pub mu: f64,
    /// Gaussian standard deviation.
    pub sigma: f64,
    /// Mean of the exponential tail.
    pub tau: f64,
    /// Weighted share of DNF/DNS results.
    pub dnf_rate: f64,
    /// Weighted mean of the untrimmed valid solves.
    pub mean: f64,
    /// Weighted standard deviation of the untrimmed valid solves.
    pub stdev: f64,
    /// Number of valid solves.
    pub sample_size: u32,
}

impl CompetitorModel {
    /// Fits a model; `None` if there is no valid solve.
    #[must_use]
    pub fn fit(samples: &[WeightedSample]) -> Option<Self> {
        let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
        if total_weight <= 0.0 {
            return None;
        }
        let dnf_weight: f64 = samples.iter().filter(|s| s.value < 0).map(|s| s.weight).sum();
        let dnf_rate = dnf_weight / total_weight;

        let valid: Vec<WeightedSample> = samples.iter().copied().filter(|s| s.value > 0).collect();
        let overall = weighted_moments(&valid)?;

        let threshold = overall.mean + TRIM_SIGMAS * overall.stdev;
        let trimmed: Vec<WeightedSample> = valid
            .iter()
            .copied()
            .filter(|s| f64::from(s.value) <= threshold)
            .collect();
        let trimmed_moments = weighted_moments(&trimmed)?;

        let skew = weighted_skew(&trimmed, &trimmed_moments).clamp(0.0, MAX_SKEW);
        let ratio = skew / 2.0;
        let sd = trimmed_moments.stdev;
        let tau = sd * ratio.cbrt();
        let sigma = sd * (1.0 - ratio.powf(2.0 / 3.0)).max(0.0).sqrt();

        Some(Self {
            mu: trimmed_moments.mean - tau,
            sigma,
            tau,
            dnf_rate,
            mean: overall.mean,
            stdev: overall.stdev,
            sample_size: u32::try_from(valid.len()).unwrap_or(u32::MAX),
        })
    }

    /// Histogram bucket range (tenths of a second) covering `mean ± 4 sd`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn histogram_bounds(&self) -> (i32, i32) {
        let low = ((self.mean - 4.0 * self.stdev) / 10.0).floor().max(0.0);
        let high = ((self.mean + 4.0 * self.stdev) / 10.0).ceil();
        (low as i32, high as i32)
    }

    /// Builds a sampler drawing single results from this model.
    #[must_use]
    pub fn sampler(&self) -> ModelSampler {
        ModelSampler {
            normal: Normal::new(self.mu, self.sigma).ok(),
            tail: if self.tau > 0.0 { Exp::new(1.0 / self.tau).ok() } else { None },
            dnf_rate: self.dnf_rate,
        }
    }
}

/// Draws singles from a fitted [`CompetitorModel`].
#[derive(Debug, Clone, Copy)]
pub struct ModelSampler {
    normal: Option<Normal<f64>>,
    tail: Option<Exp<f64>>,
    dnf_rate: f64,
}

impl ModelSampler {
    /// One simulated single: a positive time or [`DNF`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, include_dnf: bool) -> i32 {
        let Some(normal) = self.normal else {
            return DNF;
        };
        if include_dnf && rng.gen::<f64>() < self.dnf_rate {
            return DNF;
        }
        let tail = self.tail.map_or(0.0, |exp| exp.sample(rng));
        (normal.sample(rng) + tail).round().clamp(1.0, f64::from(i32::MAX)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn flat(values: &[i32]) -> Vec<WeightedSample> {
        values.iter().map(|&value| WeightedSample { value, weight: 1.0 }).collect()
    }

    #[test]
    fn weights_halve_every_half_life() {
        let window = DateWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap(),
        )
        .unwrap();
        let history = vec![
            DatedResults {
                competition_id: "Old".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
                solves: vec![1000],
            },
            DatedResults {
                competition_id: "New".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                solves: vec![900, 950],
            },
        ];
        let weighted = weight_history(&history, &window, 180.0);
        assert_eq!(weighted.len(), 3);
        assert!((weighted[0].weight - 0.5).abs() < 1e-9);
        assert!((weighted[1].weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fit_reports_dnf_rate_and_untrimmed_moments() {
        let model = CompetitorModel::fit(&flat(&[1000, 1000, -1, 1000])).unwrap();
        assert!((model.dnf_rate - 0.25).abs() < 1e-12);
        assert!((model.mean - 1000.0).abs() < 1e-9);
        assert!(model.stdev.abs() < 1e-9);
        assert!(model.tau.abs() < 1e-9);
        assert_eq!(model.sample_size, 3);
    }

    #[test]
    fn fit_without_valid_solves_is_none() {
        assert!(CompetitorModel::fit(&flat(&[-1, -2])).is_none());
        assert!(CompetitorModel::fit(&[]).is_none());
    }

    #[test]
    fn right_skewed_history_gets_a_tail() {
        let model = CompetitorModel::fit(&flat(&[900, 910, 905, 920, 950, 1000, 915, 930, 1100, 940])).unwrap();
        assert!(model.tau > 0.0);
        assert!(model.sigma > 0.0);
        assert!(model.mu < model.mean);
    }

    #[test]
    fn sampler_respects_dnf_switch() {
        let model = CompetitorModel::fit(&flat(&[800, 850, 900, -1, -1, -1, -1, -1])).unwrap();
        let sampler = model.sampler();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let with_dnf = (0..2000).filter(|_| sampler.sample(&mut rng, true) == DNF).count();
        assert!(with_dnf > 1000, "dnf draws: {with_dnf}");
        assert!((0..2000).all(|_| sampler.sample(&mut rng, false) > 0));
    }
}

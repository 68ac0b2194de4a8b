//! Ex-Gaussian curves and histogram display transforms.
//!
//! Curves are sampled every 0.1 on `[floor(min), floor(max)]`; the grid is
//! walked as integers and divided back so the points carry no accumulated
//! float error. Percentages are returned in `[0, 100]`. A domain is limited
//! to [`MAX_CURVE_POINTS`] points.

use std::collections::BTreeMap;
use std::f64::consts::SQRT_2;

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::error::ValidationError;

/// Largest number of points a single curve may have.
pub const MAX_CURVE_POINTS: i64 = 1_000_000;

// Bounds past this no longer floor to an exact integer in f64.
const MAX_DOMAIN_BOUND: f64 = 1e15;

/// Which curve to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    /// Probability density, scaled and capped at 100.
    Density,
    /// Cumulative distribution in percent.
    Cumulative,
}

/// One sampled point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Domain value (seconds).
    pub x: f64,
    /// Percentage.
    pub y: f64,
}

/// Samples the ex-Gaussian `(mu, sigma, tau)` over `[domain_min, domain_max]`.
///
/// # Errors
///
/// Returns `ValidationError::InvalidDistribution` if `sigma` or `tau` is not a
/// positive finite number, the bounds are not finite with `min <= max`, or
/// the domain would need more than [`MAX_CURVE_POINTS`] points.
///
/// # Examples
///
/// ```
/// use cube_odds::distribution::{curve, CurveKind};
///
/// let points = curve(10.0, 1.0, 1.0, 8.0, 9.0, CurveKind::Density).unwrap();
/// assert_eq!(points.len(), 11);
/// assert!((points[10].x - 9.0).abs() < 1e-12);
/// ```
pub fn curve(
    mu: f64,
    sigma: f64,
    tau: f64,
    domain_min: f64,
    domain_max: f64,
    kind: CurveKind,
) -> Result<Vec<CurvePoint>, ValidationError> {
    validate(mu, sigma, tau, domain_min, domain_max)?;

    let lambda = match kind {
        CurveKind::Density => (5.0 / tau).min(5.0),
        CurveKind::Cumulative => (1.0 / tau).min(10.0),
    };

    Ok(grid(domain_min, domain_max)?
        .map(|x| {
            let y = match kind {
                CurveKind::Density => density(x, mu, sigma, lambda),
                CurveKind::Cumulative => cumulative(x, mu, sigma, lambda),
            };
            CurvePoint { x, y }
        })
        .collect())
}

fn validate(mu: f64, sigma: f64, tau: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    let invalid = |reason: String| Err(ValidationError::InvalidDistribution { reason });
    if !mu.is_finite() {
        return invalid(format!("mu must be finite, got {mu}"));
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        return invalid(format!("sigma must be positive, got {sigma}"));
    }
    if !(tau.is_finite() && tau > 0.0) {
        return invalid(format!("tau must be positive, got {tau}"));
    }
    if !(min.is_finite() && max.is_finite()) || min > max {
        return invalid(format!("invalid domain [{min}, {max}]"));
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn grid(min: f64, max: f64) -> Result<impl Iterator<Item = f64>, ValidationError> {
    let tenths = |bound: f64| {
        let floored = bound.floor();
        if floored.abs() < MAX_DOMAIN_BOUND {
            (floored as i64).checked_mul(10)
        } else {
            None
        }
    };
    let (Some(start), Some(end)) = (tenths(min), tenths(max)) else {
        return Err(ValidationError::InvalidDistribution {
            reason: format!("domain [{min}, {max}] is out of range"),
        });
    };
    if end - start >= MAX_CURVE_POINTS {
        return Err(ValidationError::InvalidDistribution {
            reason: format!("domain [{min}, {max}] exceeds {MAX_CURVE_POINTS} points"),
        });
    }
    Ok((start..=end).map(|i| i as f64 / 10.0))
}

fn density(x: f64, mu: f64, sigma: f64, lambda: f64) -> f64 {
    let half = lambda / 2.0;
    let value = half
        * (half * (2.0 * mu + lambda * sigma * sigma - 2.0 * x)).exp()
        * erfc((mu + lambda * sigma * sigma - x) / (SQRT_2 * sigma));
    if value.is_finite() {
        value.clamp(0.0, 1.0) * 100.0
    } else {
        0.0
    }
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

fn cumulative(x: f64, mu: f64, sigma: f64, lambda: f64) -> f64 {
    let base = normal_cdf((x - mu) / sigma);
    let correction = (-lambda * (x - mu) + lambda * lambda * sigma * sigma / 2.0).exp()
        * normal_cdf((x - mu - lambda * sigma * sigma) / sigma);
    let value = if correction.is_finite() { base - correction } else { base };
    (value * 100.0).clamp(0.0, 100.0)
}

/// Turns an engine histogram (bucket = tenths of a second) into percentages.
///
/// Points are ordered by bucket; an empty histogram yields no points.
#[must_use]
pub fn histogram_series(histogram: &BTreeMap<i32, u64>) -> Vec<CurvePoint> {
    let total: u64 = histogram.values().sum();
    if total == 0 {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let total = total as f64;
    histogram
        .iter()
        .map(|(&bucket, &count)| {
            #[allow(clippy::cast_precision_loss)]
            let share = count as f64 / total;
            CurvePoint {
                x: f64::from(bucket) / 10.0,
                y: share * 100.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_uses_floored_bounds() {
        let xs: Vec<f64> = grid(7.9, 9.99).unwrap().collect();
        assert_eq!(xs.len(), 21);
        assert!((xs[0] - 7.0).abs() < 1e-12);
        assert!((xs[20] - 9.0).abs() < 1e-12);
        assert!((xs[3] - 7.3).abs() < 1e-12);
    }

    #[test]
    fn density_is_bounded() {
        let points = curve(9.0, 0.6, 1.2, 5.0, 20.0, CurveKind::Density).unwrap();
        assert!(points.iter().all(|p| (0.0..=100.0).contains(&p.y)));
        let peak = points.iter().fold(0.0_f64, |m, p| m.max(p.y));
        assert!(peak > 0.0);
    }

    #[test]
    fn density_far_tail_is_zero_not_nan() {
        let points = curve(10.0, 0.05, 0.01, 0.0, 100.0, CurveKind::Density).unwrap();
        assert!(points.iter().all(|p| p.y.is_finite()));
        assert!(points.last().unwrap().y.abs() < 1e-9);
    }

    #[test]
    fn cumulative_is_monotone_and_saturates() {
        let points = curve(10.0, 1.0, 2.0, 0.0, 40.0, CurveKind::Cumulative).unwrap();
        for pair in points.windows(2) {
            assert!(pair[1].y + 1e-9 >= pair[0].y, "{:?} then {:?}", pair[0], pair[1]);
        }
        assert!(points[0].y < 1e-6);
        assert!(points.last().unwrap().y > 99.9);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(curve(10.0, 0.0, 1.0, 0.0, 1.0, CurveKind::Density).is_err());
        assert!(curve(10.0, 1.0, -1.0, 0.0, 1.0, CurveKind::Density).is_err());
        assert!(curve(10.0, 1.0, 1.0, 5.0, 1.0, CurveKind::Cumulative).is_err());
        assert!(curve(f64::NAN, 1.0, 1.0, 0.0, 1.0, CurveKind::Cumulative).is_err());
        assert!(curve(10.0, 1.0, 1.0, 0.0, f64::INFINITY, CurveKind::Density).is_err());
    }

    #[test]
    fn oversized_domains_are_rejected() {
        let err = curve(10.0, 1.0, 1.0, 0.0, 1e300, CurveKind::Density).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDistribution { .. }));
        assert!(curve(10.0, 1.0, 1.0, -1e300, 0.0, CurveKind::Cumulative).is_err());
        assert!(curve(10.0, 1.0, 1.0, 0.0, 1e9, CurveKind::Density).is_err());

        let widest = curve(10.0, 1.0, 1.0, 0.0, 99_999.9, CurveKind::Cumulative).unwrap();
        assert_eq!(widest.len(), 999_991);
        assert!(curve(10.0, 1.0, 1.0, 0.0, 100_000.0, CurveKind::Cumulative).is_err());
    }

    #[test]
    fn histogram_series_is_percentage_of_total() {
        let mut histogram = BTreeMap::new();
        histogram.insert(95, 1);
        histogram.insert(90, 3);
        let series = histogram_series(&histogram);
        assert_eq!(series.len(), 2);
        assert!((series[0].x - 9.0).abs() < 1e-12);
        assert!((series[0].y - 75.0).abs() < 1e-12);
        assert!((series[1].y - 25.0).abs() < 1e-12);
        assert!(histogram_series(&BTreeMap::new()).is_empty());
    }
}

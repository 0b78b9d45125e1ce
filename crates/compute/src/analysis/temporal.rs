use std::collections::BTreeMap;

use foundation::time::Week;
use serde::Serialize;

/// Least-squares line `y = slope * x + intercept`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
}

impl Trend {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub struct TemporalAnalysis;

impl TemporalAnalysis {
    /// Fit a line through `points`. Needs two distinct x values.
    pub fn linear_fit(points: &[(f64, f64)]) -> Option<Trend> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
        for &(x, y) in points {
            sx += x;
            sy += y;
            sxy += x * y;
            sxx += x * x;
        }
        let denominator = n * sxx - sx * sx;
        if denominator == 0.0 {
            return None;
        }
        let slope = (n * sxy - sx * sy) / denominator;
        Some(Trend {
            slope,
            intercept: (sy - slope * sx) / n,
        })
    }

    /// Trend over the weeks whose average is strictly positive.
    pub fn weekly_trend(per_week: &BTreeMap<Week, Option<f64>>) -> Option<Trend> {
        let points: Vec<(f64, f64)> = per_week
            .iter()
            .filter_map(|(w, v)| v.filter(|v| *v > 0.0).map(|v| (f64::from(*w), v)))
            .collect();
        Self::linear_fit(&points)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::TemporalAnalysis;

    #[test]
    fn fits_an_exact_line() {
        let t = TemporalAnalysis::linear_fit(&[(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)]).unwrap();
        assert!((t.slope - 2.0).abs() < 1e-9);
        assert!((t.intercept - 1.0).abs() < 1e-9);
        assert!((t.at(10.0) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_inputs_have_no_trend() {
        assert!(TemporalAnalysis::linear_fit(&[(1.0, 1.0)]).is_none());
        assert!(TemporalAnalysis::linear_fit(&[(2.0, 1.0), (2.0, 3.0)]).is_none());
    }

    #[test]
    fn weekly_trend_ignores_empty_and_zero_weeks() {
        let per_week = BTreeMap::from([
            (15, Some(0.1)),
            (16, None),
            (17, Some(0.0)),
            (18, Some(0.4)),
        ]);
        let t = TemporalAnalysis::weekly_trend(&per_week).unwrap();
        assert!((t.slope - 0.1).abs() < 1e-9);

        let flat = BTreeMap::from([(15, Some(0.0)), (16, None)]);
        assert!(TemporalAnalysis::weekly_trend(&flat).is_none());
    }
}

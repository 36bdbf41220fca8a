//! Angle → percentage estimation from calibration points.
//!
//! The interpolation table is keyed by angle (the measured input), not by
//! percent, so non-monotonic calibrations still produce a well-defined
//! piecewise-linear curve. Readings beyond the calibrated extremes are
//! extrapolated along the nearest edge segment; only the output is clamped.

use std::sync::Arc;

use crate::calibration::{CalibrationPoint, CalibrationStore, MIN_POINTS};
use crate::segment::SegmentId;

/// Percentage returned whenever estimation is undefined.
pub const FALLBACK_PERCENT: f64 = 0.0;

/// Two calibration angles closer than this are treated as coincident.
const DEGENERATE_SPAN: f64 = 1e-9;

/// Converts live joint angles into closure percentages.
#[derive(Debug, Clone)]
pub struct PercentEstimator {
    store: Arc<CalibrationStore>,
}

impl PercentEstimator {
    pub fn new(store: Arc<CalibrationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<CalibrationStore> {
        &self.store
    }

    /// Estimated percentage in [0, 100] for `angle` on `segment`.
    ///
    /// Returns [`FALLBACK_PERCENT`] when the segment has fewer than two
    /// points or the table is numerically degenerate.
    pub fn estimate(&self, segment: SegmentId, angle: f64) -> f64 {
        let points = self.store.points(segment);
        if points.len() < MIN_POINTS {
            return FALLBACK_PERCENT;
        }

        match interpolate(&angle_table(&points), angle) {
            Some(percent) => percent.clamp(0.0, 100.0),
            None => FALLBACK_PERCENT,
        }
    }
}

/// (angle, percent) pairs sorted by angle.
fn angle_table(points: &[CalibrationPoint]) -> Vec<(f64, f64)> {
    let mut table: Vec<(f64, f64)> = points.iter().map(|p| (p.angle, p.percent)).collect();
    table.sort_by(|a, b| a.0.total_cmp(&b.0));
    table
}

/// Piecewise-linear interpolation over `table` (sorted by x) with linear
/// extrapolation from the edge segments.
///
/// Returns `None` if the table has fewer than two entries, the bracketing
/// segment has zero width, or the result is not finite.
pub fn interpolate(table: &[(f64, f64)], x: f64) -> Option<f64> {
    if table.len() < 2 || !x.is_finite() {
        return None;
    }

    let last = table.len() - 1;
    // First index whose x is >= the query, bounded to a valid segment start.
    let upper = table.partition_point(|&(tx, _)| tx < x).clamp(1, last);
    let (x0, y0) = table[upper - 1];
    let (x1, y1) = table[upper];

    let span = x1 - x0;
    if !span.is_finite() || span.abs() < DEGENERATE_SPAN {
        return None;
    }

    let y = y0 + (x - x0) * (y1 - y0) / span;
    y.is_finite().then_some(y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentSet;
    use approx::assert_relative_eq;

    fn estimator_with(points: &[(f64, f64)]) -> PercentEstimator {
        let store = Arc::new(CalibrationStore::new(Arc::new(SegmentSet::hand())));
        for &(percent, angle) in points {
            store.set_point(SegmentId(0), percent, angle).unwrap();
        }
        PercentEstimator::new(store)
    }

    #[test]
    fn test_uncalibrated_returns_zero() {
        let empty = estimator_with(&[]);
        let single = estimator_with(&[(50.0, 120.0)]);
        for angle in [-30.0, 0.0, 90.0, 120.0, 400.0] {
            assert_eq!(empty.estimate(SegmentId(0), angle), 0.0);
            assert_eq!(single.estimate(SegmentId(0), angle), 0.0);
        }
    }

    #[test]
    fn test_exact_at_nodes() {
        let est = estimator_with(&[(0.0, 170.0), (100.0, 60.0)]);
        assert_relative_eq!(est.estimate(SegmentId(0), 170.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(est.estimate(SegmentId(0), 60.0), 100.0, epsilon = 1e-9);
        assert_relative_eq!(est.estimate(SegmentId(0), 115.0), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_exact_at_inner_nodes() {
        let est = estimator_with(&[(0.0, 170.0), (30.0, 150.0), (100.0, 60.0)]);
        assert_relative_eq!(est.estimate(SegmentId(0), 150.0), 30.0, epsilon = 1e-9);
        assert_relative_eq!(est.estimate(SegmentId(0), 160.0), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_extrapolates_then_clamps_output() {
        // 1.1 degrees per percent
        let est = estimator_with(&[(10.0, 159.0), (90.0, 71.0)]);
        // 11 degrees past the open end is 10 percent further, i.e. exactly 0
        assert_relative_eq!(est.estimate(SegmentId(0), 170.0), 0.0, epsilon = 1e-9);
        // Slightly past the closed end still moves, towards 95 percent
        assert_relative_eq!(est.estimate(SegmentId(0), 65.5), 95.0, epsilon = 1e-9);
        // Far outside saturates at the output bounds
        assert_eq!(est.estimate(SegmentId(0), 300.0), 0.0);
        assert_eq!(est.estimate(SegmentId(0), -50.0), 100.0);
    }

    #[test]
    fn test_non_monotonic_table_sorted_by_angle() {
        // Percent 50 measured at a larger angle than percent 0
        let est = estimator_with(&[(0.0, 150.0), (50.0, 160.0), (100.0, 60.0)]);
        assert_relative_eq!(est.estimate(SegmentId(0), 155.0), 25.0, epsilon = 1e-9);
        assert_relative_eq!(est.estimate(SegmentId(0), 105.0), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_table_returns_zero() {
        let est = estimator_with(&[(0.0, 120.0), (100.0, 120.0)]);
        assert_eq!(est.estimate(SegmentId(0), 120.0), 0.0);
        assert_eq!(est.estimate(SegmentId(0), 90.0), 0.0);
    }

    #[test]
    fn test_non_finite_angle_returns_zero() {
        let est = estimator_with(&[(0.0, 170.0), (100.0, 60.0)]);
        assert_eq!(est.estimate(SegmentId(0), f64::NAN), 0.0);
    }

    #[test]
    fn test_interpolate_direct() {
        let table = [(0.0, 0.0), (10.0, 100.0)];
        assert_eq!(interpolate(&table, 5.0), Some(50.0));
        assert_eq!(interpolate(&table, 20.0), Some(200.0));
        assert_eq!(interpolate(&table, -10.0), Some(-100.0));
        assert_eq!(interpolate(&table[..1], 5.0), None);
    }
}

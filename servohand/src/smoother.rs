//! Exponential low-pass filter applied per segment to estimator output.

use std::sync::Mutex;

use crate::segment::SegmentId;
use crate::sync;

/// Default weight of the previous output.
pub const DEFAULT_SMOOTHING: f64 = 0.5;

/// `smoothed = α · previous + (1 - α) · raw`, one state per segment.
///
/// The first sample of a segment passes through unchanged. α is fixed at
/// construction; α = 0 disables smoothing and α = 1 freezes the output at
/// the first sample.
#[derive(Debug)]
pub struct OutputSmoother {
    alpha: f64,
    previous: Mutex<Vec<Option<f64>>>,
}

impl OutputSmoother {
    /// Create a smoother for `segments` segments. `alpha` is clamped to [0, 1];
    /// a non-finite value falls back to [`DEFAULT_SMOOTHING`].
    pub fn new(segments: usize, alpha: f64) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            DEFAULT_SMOOTHING
        };
        Self {
            alpha,
            previous: Mutex::new(vec![None; segments]),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Filter one raw sample and record it as the segment's new state.
    ///
    /// Segments outside the configured range pass through unfiltered.
    pub fn smooth(&self, segment: SegmentId, raw: f64) -> f64 {
        let mut previous = sync::lock(&self.previous);
        let Some(slot) = previous.get_mut(segment.index()) else {
            return raw;
        };

        let prior = slot.unwrap_or(raw);
        let smoothed = self.alpha * prior + (1.0 - self.alpha) * raw;
        *slot = Some(smoothed);
        smoothed
    }

    /// Last smoothed value of a segment, if any sample has been seen.
    pub fn current(&self, segment: SegmentId) -> Option<f64> {
        sync::lock(&self.previous)
            .get(segment.index())
            .copied()
            .flatten()
    }

    /// Consistent copy of every segment's state.
    pub fn snapshot(&self) -> Vec<Option<f64>> {
        sync::lock(&self.previous).clone()
    }

    /// Forget all history; the next sample of each segment passes through.
    pub fn reset(&self) {
        sync::lock(&self.previous).iter_mut().for_each(|v| *v = None);
    }
}

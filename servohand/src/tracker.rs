//! Landmark-to-percentage pipeline.
//!
//! [`HandTracker`] is the context object tying the per-frame stages together:
//! joint angle → calibrated percentage → smoothing → [`PercentBoard`].
//! It also remembers the most recent joint angles so an operator can capture
//! calibration points against what the camera currently sees.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};

use crate::board::PercentBoard;
use crate::calibration::{CalibrationError, CalibrationStore};
use crate::estimator::PercentEstimator;
use crate::geometry::{joint_angle, Point2};
use crate::segment::{SegmentId, SegmentSet};
use crate::smoother::OutputSmoother;
use crate::sync;

#[derive(Debug, Error, PartialEq)]
pub enum CaptureError {
    #[error("no hand has been observed yet")]
    NoObservation,

    #[error("segment {0} was not visible in the last frame")]
    SegmentNotVisible(SegmentId),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Per-segment results of one landmark frame. `None` where the frame did not
/// contain the segment's landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub angles: Vec<Option<f64>>,
    pub percents: Vec<Option<f64>>,
}

#[derive(Debug)]
pub struct HandTracker {
    segments: Arc<SegmentSet>,
    estimator: PercentEstimator,
    smoother: OutputSmoother,
    board: Arc<PercentBoard>,
    latest_angles: Mutex<Option<Vec<Option<f64>>>>,
}

impl HandTracker {
    pub fn new(store: Arc<CalibrationStore>, smoothing: f64, board: Arc<PercentBoard>) -> Self {
        let segments = Arc::clone(store.segments());
        let smoother = OutputSmoother::new(segments.len(), smoothing);
        Self {
            segments,
            estimator: PercentEstimator::new(store),
            smoother,
            board,
            latest_angles: Mutex::new(None),
        }
    }

    pub fn segments(&self) -> &Arc<SegmentSet> {
        &self.segments
    }

    pub fn store(&self) -> &Arc<CalibrationStore> {
        self.estimator.store()
    }

    pub fn smoother(&self) -> &OutputSmoother {
        &self.smoother
    }

    pub fn board(&self) -> &Arc<PercentBoard> {
        &self.board
    }

    /// Process one landmark frame. Absent or empty frames are ignored and
    /// leave all state untouched.
    pub fn observe(&self, landmarks: Option<&[Point2]>) -> Option<Observation> {
        let Some(points) = landmarks.filter(|points| !points.is_empty()) else {
            debug!("No hand in frame");
            return None;
        };

        let angles: Vec<Option<f64>> = self
            .segments
            .iter()
            .map(|(_, segment)| {
                let triple = segment.landmarks;
                if triple.max_index() >= points.len() {
                    return None;
                }
                Some(joint_angle(
                    points[triple.proximal],
                    points[triple.joint],
                    points[triple.distal],
                ))
            })
            .collect();

        let percents: Vec<Option<f64>> = angles
            .iter()
            .enumerate()
            .map(|(index, angle)| {
                let segment = SegmentId(index);
                let raw = self.estimator.estimate(segment, (*angle)?);
                let smoothed = self.smoother.smooth(segment, raw);
                self.board.publish(segment, smoothed);
                Some(smoothed)
            })
            .collect();

        *sync::lock(&self.latest_angles) = Some(angles.clone());
        Some(Observation { angles, percents })
    }

    /// Joint angles from the most recent frame that contained a hand.
    pub fn latest_angles(&self) -> Option<Vec<Option<f64>>> {
        sync::lock(&self.latest_angles).clone()
    }

    /// Record the current angle of one segment (or of every visible segment
    /// when `segment` is `None`) as a calibration point at `percent`.
    ///
    /// Returns how many points were written.
    pub fn capture(&self, percent: f64, segment: Option<SegmentId>) -> Result<usize, CaptureError> {
        let angles = self.latest_angles().ok_or(CaptureError::NoObservation)?;
        let store = self.estimator.store();

        let written = match segment {
            Some(segment) => {
                let angle = angles
                    .get(segment.index())
                    .copied()
                    .flatten()
                    .ok_or(CaptureError::SegmentNotVisible(segment))?;
                store.set_point(segment, percent, angle)?;
                1
            }
            None => {
                let mut written = 0;
                for (index, angle) in angles.iter().enumerate() {
                    if let Some(angle) = angle {
                        store.set_point(SegmentId(index), percent, *angle)?;
                        written += 1;
                    }
                }
                written
            }
        };

        info!("Captured {written} calibration point(s) at {percent}%");
        Ok(written)
    }
}

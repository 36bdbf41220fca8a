//! Per-segment angle calibration.
//!
//! The operator holds the hand at a declared percentage (0 = open, 100 =
//! closed) and the current joint angle is recorded against it. Each segment
//! keeps a sparse percent → angle table; two or more entries make the segment
//! ready for [`PercentEstimator`](crate::estimator::PercentEstimator).
//!
//! On disk the store is a JSON object keyed by segment name:
//!
//! ```json
//! { "thumb": { "0": 162.4, "100": 71.9 }, "index": { "0": 171.0, "50": 120.5, "100": 38.2 } }
//! ```

pub mod fit;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::error::{read_optional_json, write_json, PersistenceError};
use crate::segment::{SegmentId, SegmentSet};
use crate::sync;

/// Minimum number of points before a segment can be estimated.
pub const MIN_POINTS: usize = 2;

/// Angle measured at a declared percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    /// Declared closure percentage (0 = open, 100 = closed)
    pub percent: f64,
    /// Joint angle in degrees measured at that percentage
    pub angle: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("calibration percent must be finite, got {0}")]
    NonFinitePercent(f64),

    #[error("segment {0} is not part of this calibration store")]
    UnknownSegment(SegmentId),
}

type PointTable = Vec<Vec<CalibrationPoint>>;

/// Thread-safe calibration tables for every segment of a [`SegmentSet`].
///
/// Writes take the lock for a single entry, so concurrent estimation never
/// observes a half-written point.
#[derive(Debug)]
pub struct CalibrationStore {
    segments: Arc<SegmentSet>,
    points: RwLock<PointTable>,
}

impl CalibrationStore {
    /// Empty store for the given segments.
    pub fn new(segments: Arc<SegmentSet>) -> Self {
        let points = vec![Vec::new(); segments.len()];
        Self {
            segments,
            points: RwLock::new(points),
        }
    }

    pub fn segments(&self) -> &Arc<SegmentSet> {
        &self.segments
    }

    /// Insert a point, replacing any existing angle at the same percent.
    pub fn set_point(
        &self,
        segment: SegmentId,
        percent: f64,
        angle: f64,
    ) -> Result<(), CalibrationError> {
        if !percent.is_finite() {
            return Err(CalibrationError::NonFinitePercent(percent));
        }

        // -0.0 and 0.0 are one key.
        let percent = percent + 0.0;

        let mut points = sync::write(&self.points);
        let table = points
            .get_mut(segment.index())
            .ok_or(CalibrationError::UnknownSegment(segment))?;
        insert_sorted(table, CalibrationPoint { percent, angle });
        Ok(())
    }

    pub fn point_count(&self, segment: SegmentId) -> usize {
        sync::read(&self.points)
            .get(segment.index())
            .map_or(0, Vec::len)
    }

    /// Whether the segment has enough points to estimate.
    pub fn is_ready(&self, segment: SegmentId) -> bool {
        self.point_count(segment) >= MIN_POINTS
    }

    /// Calibrated percentages of a segment in ascending order.
    pub fn percents(&self, segment: SegmentId) -> Vec<f64> {
        self.points(segment).iter().map(|p| p.percent).collect()
    }

    /// Snapshot of a segment's points in ascending percent order.
    pub fn points(&self, segment: SegmentId) -> Vec<CalibrationPoint> {
        sync::read(&self.points)
            .get(segment.index())
            .cloned()
            .unwrap_or_default()
    }

    /// Drop every point of one segment.
    pub fn clear_segment(&self, segment: SegmentId) {
        if let Some(table) = sync::write(&self.points).get_mut(segment.index()) {
            table.clear();
        }
    }

    /// Total number of stored points over all segments.
    pub fn total_points(&self) -> usize {
        sync::read(&self.points).iter().map(Vec::len).sum()
    }

    /// Write the whole store as JSON.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let document = self.to_document();
        write_json(path, &document)?;
        info!(
            "Saved calibration ({} points) to {}",
            self.total_points(),
            path.display()
        );
        Ok(())
    }

    /// Load a store from JSON.
    ///
    /// A missing file yields an empty store. Entries for segment names not in
    /// `segments` are skipped with a warning.
    pub fn load(path: &Path, segments: Arc<SegmentSet>) -> Result<Self, PersistenceError> {
        let store = Self::new(segments);

        let Some(document) = read_optional_json::<CalibrationDocument>(path)? else {
            warn!(
                "Calibration file {} not found, starting uncalibrated",
                path.display()
            );
            return Ok(store);
        };

        let mut table: PointTable = vec![Vec::new(); store.segments.len()];
        for (name, entries) in document {
            let Some(id) = store.segments.lookup(&name) else {
                warn!("Ignoring calibration for unknown segment '{name}'");
                continue;
            };
            for (key, angle) in entries {
                let percent = parse_percent_key(&key).ok_or_else(|| {
                    PersistenceError::InvalidPercentKey {
                        path: path.to_path_buf(),
                        segment: name.clone(),
                        key: key.clone(),
                    }
                })?;
                insert_sorted(&mut table[id.index()], CalibrationPoint { percent, angle });
            }
        }

        *sync::write(&store.points) = table;
        info!(
            "Loaded calibration ({} points) from {}",
            store.total_points(),
            path.display()
        );
        Ok(store)
    }

    fn to_document(&self) -> CalibrationDocument {
        let points = sync::read(&self.points);
        self.segments
            .iter()
            .filter(|(id, _)| !points[id.index()].is_empty())
            .map(|(id, segment)| {
                let entries = points[id.index()]
                    .iter()
                    .map(|p| (format_percent_key(p.percent), p.angle))
                    .collect();
                (segment.name.clone(), entries)
            })
            .collect()
    }
}

type CalibrationDocument = BTreeMap<String, BTreeMap<String, f64>>;

fn insert_sorted(table: &mut Vec<CalibrationPoint>, point: CalibrationPoint) {
    match table.binary_search_by(|p| p.percent.total_cmp(&point.percent)) {
        Ok(existing) => table[existing].angle = point.angle,
        Err(position) => table.insert(position, point),
    }
}

/// Shortest decimal representation that parses back to the same value
/// (`100.0` → `"100"`, `12.5` → `"12.5"`).
fn format_percent_key(percent: f64) -> String {
    format!("{percent}")
}

fn parse_percent_key(key: &str) -> Option<f64> {
    key.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

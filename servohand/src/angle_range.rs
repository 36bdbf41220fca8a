//! Per-segment device angle range.
//!
//! Each segment maps 0 % to its `open` device angle and 100 % to its
//! `closed` device angle. Persisted as `{ "thumb": [180, 60], ... }`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::{read_optional_json, write_json, PersistenceError};
use crate::segment::{SegmentId, SegmentSet};
use crate::sync;

/// Device angle at 0 % when no range is configured.
pub const DEFAULT_OPEN_ANGLE: i32 = 180;
/// Device angle at 100 % when no range is configured.
pub const DEFAULT_CLOSED_ANGLE: i32 = 60;

/// Device angles (in device units) for fully open and fully closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngleRange {
    pub open: i32,
    pub closed: i32,
}

impl AngleRange {
    pub const fn new(open: i32, closed: i32) -> Self {
        Self { open, closed }
    }

    /// Device angle for a percentage: `open - (open - closed) * percent / 100`.
    ///
    /// Works for either orientation (`open > closed` or `open < closed`).
    pub fn angle_for(&self, percent: f64) -> f64 {
        let open = f64::from(self.open);
        let closed = f64::from(self.closed);
        open - (open - closed) * (percent / 100.0)
    }

    /// [`angle_for`](Self::angle_for) rounded to the device's integer unit.
    pub fn device_angle(&self, percent: f64) -> i32 {
        self.angle_for(percent).round() as i32
    }
}

impl Default for AngleRange {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_ANGLE, DEFAULT_CLOSED_ANGLE)
    }
}

type AngleRangeDocument = BTreeMap<String, (i32, i32)>;

/// Angle ranges for every segment of a [`SegmentSet`], shared between the
/// operator surface (edits) and the scheduler (reads on every tick).
#[derive(Debug)]
pub struct AngleRangeMap {
    segments: Arc<SegmentSet>,
    ranges: RwLock<Vec<AngleRange>>,
}

impl AngleRangeMap {
    /// Every segment at [`AngleRange::default`].
    pub fn with_defaults(segments: Arc<SegmentSet>) -> Self {
        let ranges = vec![AngleRange::default(); segments.len()];
        Self {
            segments,
            ranges: RwLock::new(ranges),
        }
    }

    pub fn get(&self, segment: SegmentId) -> AngleRange {
        sync::read(&self.ranges)
            .get(segment.index())
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&self, segment: SegmentId, range: AngleRange) {
        if let Some(slot) = sync::write(&self.ranges).get_mut(segment.index()) {
            *slot = range;
        }
    }

    /// Copy of all ranges in segment order.
    pub fn snapshot(&self) -> Vec<AngleRange> {
        sync::read(&self.ranges).clone()
    }

    /// Restore every segment to the default range.
    pub fn reset(&self) {
        sync::write(&self.ranges)
            .iter_mut()
            .for_each(|r| *r = AngleRange::default());
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let ranges = self.snapshot();
        let document: AngleRangeDocument = self
            .segments
            .iter()
            .map(|(id, segment)| {
                let range = ranges[id.index()];
                (segment.name.clone(), (range.open, range.closed))
            })
            .collect();
        write_json(path, &document)?;
        info!("Saved angle ranges to {}", path.display());
        Ok(())
    }

    /// Load ranges from JSON. A missing file or a segment absent from the
    /// file keeps the default range.
    pub fn load(path: &Path, segments: Arc<SegmentSet>) -> Result<Self, PersistenceError> {
        let map = Self::with_defaults(segments);

        let Some(document) = read_optional_json::<AngleRangeDocument>(path)? else {
            info!(
                "Angle range file {} not found, using {}/{} for all segments",
                path.display(),
                DEFAULT_OPEN_ANGLE,
                DEFAULT_CLOSED_ANGLE
            );
            return Ok(map);
        };

        for (name, (open, closed)) in document {
            match map.segments.lookup(&name) {
                Some(id) => map.set(id, AngleRange::new(open, closed)),
                None => warn!("Ignoring angle range for unknown segment '{name}'"),
            }
        }
        info!("Loaded angle ranges from {}", path.display());
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mapping_open_greater_than_closed() {
        let range = AngleRange::new(180, 60);
        assert_eq!(range.device_angle(0.0), 180);
        assert_eq!(range.device_angle(100.0), 60);
        assert_eq!(range.device_angle(50.0), 120);
        assert_relative_eq!(range.angle_for(25.0), 150.0);
    }

    #[test]
    fn test_mapping_open_less_than_closed() {
        let range = AngleRange::new(10, 170);
        assert_eq!(range.device_angle(0.0), 10);
        assert_eq!(range.device_angle(100.0), 170);
        assert_eq!(range.device_angle(50.0), 90);
    }

    #[test]
    fn test_rounding() {
        let range = AngleRange::new(180, 60);
        // 180 - 120 * 0.333 = 140.04
        assert_eq!(range.device_angle(33.3), 140);
        // 180 - 120 * 0.6675 = 99.9
        assert_eq!(range.device_angle(66.75), 100);
    }

    #[test]
    fn test_defaults_and_reset() {
        let map = AngleRangeMap::with_defaults(Arc::new(SegmentSet::hand()));
        assert_eq!(map.get(SegmentId(3)), AngleRange::new(180, 60));

        map.set(SegmentId(3), AngleRange::new(170, 20));
        assert_eq!(map.get(SegmentId(3)), AngleRange::new(170, 20));

        map.reset();
        assert!(map.snapshot().iter().all(|r| *r == AngleRange::default()));
    }
}

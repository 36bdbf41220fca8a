//! Latest per-segment percentages, shared between producers and the scheduler.
//!
//! Producers are the landmark pipeline ([`HandTracker`](crate::tracker::HandTracker))
//! and the gesture path; the consumer is the scheduler tick. Readers always
//! get a whole-vector snapshot.

use std::sync::RwLock;

use crate::segment::SegmentId;
use crate::sync;

#[derive(Debug)]
pub struct PercentBoard {
    values: RwLock<Vec<Option<f64>>>,
}

impl PercentBoard {
    pub fn new(segments: usize) -> Self {
        Self {
            values: RwLock::new(vec![None; segments]),
        }
    }

    pub fn len(&self) -> usize {
        sync::read(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish one segment's percentage.
    pub fn publish(&self, segment: SegmentId, percent: f64) {
        if let Some(slot) = sync::write(&self.values).get_mut(segment.index()) {
            *slot = Some(percent);
        }
    }

    /// Replace every segment at once. Extra values are ignored; missing ones
    /// keep their previous value.
    pub fn publish_all(&self, percents: &[f64]) {
        let mut values = sync::write(&self.values);
        for (slot, &percent) in values.iter_mut().zip(percents) {
            *slot = Some(percent);
        }
    }

    pub fn get(&self, segment: SegmentId) -> Option<f64> {
        sync::read(&self.values)
            .get(segment.index())
            .copied()
            .flatten()
    }

    pub fn snapshot(&self) -> Vec<Option<f64>> {
        sync::read(&self.values).clone()
    }

    /// Forget all values; the scheduler stays silent until new data arrives.
    pub fn clear(&self) {
        sync::write(&self.values)
            .iter_mut()
            .for_each(|v| *v = None);
    }
}

//! Articulated segments (fingers) and their landmark triples.
//!
//! Segments are declared by name at configuration time and resolved once to
//! dense [`SegmentId`] indices. Hot paths (smoother, scheduler tick) index
//! plain vectors by `SegmentId`; names are only used at the edges (files,
//! operator commands, logs).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dense index of a segment within a [`SegmentSet`].
///
/// The index doubles as the device channel number in the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub usize);

impl SegmentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Landmark indices used to measure one segment's bend angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkTriple {
    /// Proximal landmark (usually the wrist)
    pub proximal: usize,
    /// Landmark at which the angle is measured
    pub joint: usize,
    /// Distal landmark (usually the fingertip)
    pub distal: usize,
}

impl LandmarkTriple {
    pub const fn new(proximal: usize, joint: usize, distal: usize) -> Self {
        Self {
            proximal,
            joint,
            distal,
        }
    }

    /// Largest landmark index referenced by this triple.
    pub fn max_index(&self) -> usize {
        self.proximal.max(self.joint).max(self.distal)
    }
}

/// A named articulated unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub landmarks: LandmarkTriple,
}

impl Segment {
    pub fn new(name: impl Into<String>, landmarks: LandmarkTriple) -> Self {
        Self {
            name: name.into(),
            landmarks,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("segment set must contain at least one segment")]
    Empty,

    #[error("duplicate segment name '{0}'")]
    DuplicateName(String),

    #[error("unknown segment '{0}'")]
    UnknownName(String),
}

/// Fixed, ordered set of segments with a name↔index lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSet {
    segments: Vec<Segment>,
    by_name: HashMap<String, SegmentId>,
}

impl SegmentSet {
    pub fn new(segments: Vec<Segment>) -> Result<Self, SegmentError> {
        if segments.is_empty() {
            return Err(SegmentError::Empty);
        }

        let mut by_name = HashMap::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            if by_name
                .insert(segment.name.clone(), SegmentId(index))
                .is_some()
            {
                return Err(SegmentError::DuplicateName(segment.name.clone()));
            }
        }

        Ok(Self { segments, by_name })
    }

    /// Five-finger hand using the 21-point hand landmark layout
    /// (wrist = 0, fingertips = 4, 8, 12, 16, 20).
    pub fn hand() -> Self {
        let segments = default_hand_segments();
        let by_name = segments
            .iter()
            .enumerate()
            .map(|(index, s)| (s.name.clone(), SegmentId(index)))
            .collect();
        Self { segments, by_name }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id.0)
    }

    pub fn name(&self, id: SegmentId) -> &str {
        self.segments
            .get(id.0)
            .map(|s| s.name.as_str())
            .unwrap_or("?")
    }

    pub fn lookup(&self, name: &str) -> Option<SegmentId> {
        self.by_name.get(name).copied()
    }

    pub fn resolve(&self, name: &str) -> Result<SegmentId, SegmentError> {
        self.lookup(name)
            .ok_or_else(|| SegmentError::UnknownName(name.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        (0..self.segments.len()).map(SegmentId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &Segment)> + '_ {
        self.segments
            .iter()
            .enumerate()
            .map(|(index, s)| (SegmentId(index), s))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl Default for SegmentSet {
    fn default() -> Self {
        Self::hand()
    }
}

/// Segment definitions for the reference five-finger hand.
pub fn default_hand_segments() -> Vec<Segment> {
    vec![
        Segment::new("thumb", LandmarkTriple::new(0, 2, 4)),
        Segment::new("index", LandmarkTriple::new(0, 6, 8)),
        Segment::new("middle", LandmarkTriple::new(0, 10, 12)),
        Segment::new("ring", LandmarkTriple::new(0, 14, 16)),
        Segment::new("pinky", LandmarkTriple::new(0, 18, 20)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_lookup() {
        let set = SegmentSet::hand();
        assert_eq!(set.len(), 5);
        assert_eq!(set.lookup("thumb"), Some(SegmentId(0)));
        assert_eq!(set.lookup("pinky"), Some(SegmentId(4)));
        assert_eq!(set.name(SegmentId(2)), "middle");
        assert!(set.lookup("wrist").is_none());
    }

    #[test]
    fn test_custom_count() {
        let set = SegmentSet::new(vec![
            Segment::new("a", LandmarkTriple::new(0, 1, 2)),
            Segment::new("b", LandmarkTriple::new(0, 3, 4)),
        ])
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.ids().collect::<Vec<_>>(), vec![SegmentId(0), SegmentId(1)]);
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        let dup = SegmentSet::new(vec![
            Segment::new("a", LandmarkTriple::new(0, 1, 2)),
            Segment::new("a", LandmarkTriple::new(0, 3, 4)),
        ]);
        assert_eq!(dup, Err(SegmentError::DuplicateName("a".to_string())));
        assert_eq!(SegmentSet::new(Vec::new()), Err(SegmentError::Empty));
    }

    #[test]
    fn test_resolve_unknown() {
        let set = SegmentSet::hand();
        assert!(matches!(
            set.resolve("elbow"),
            Err(SegmentError::UnknownName(name)) if name == "elbow"
        ));
    }

    #[test]
    fn test_max_index() {
        assert_eq!(LandmarkTriple::new(0, 18, 20).max_index(), 20);
    }
}

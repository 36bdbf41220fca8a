//! Gesture label → fixed percentage vector.
//!
//! A classifier (not part of this crate) names a gesture; the table turns the
//! label into one percentage per segment, published straight to the board
//! without going through calibration or smoothing.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::error::{read_optional_json, PersistenceError};

#[derive(Debug, Error)]
pub enum GestureError {
    #[error("unknown gesture '{0}'")]
    Unknown(String),

    #[error("gesture '{label}' has {got} values, expected {expected}")]
    WrongLength {
        label: String,
        got: usize,
        expected: usize,
    },

    #[error("gesture '{label}' value {value} is outside 0..=100")]
    OutOfRange { label: String, value: f64 },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

const BUILTIN: &[(&str, [f64; 5])] = &[
    ("Lateral Prehension", [0.0, 20.0, 20.0, 80.0, 90.0]),
    ("Thumb Adduction", [30.0, 50.0, 30.0, 50.0, 30.0]),
    ("Thumb and Little Finger Opposition", [40.0, 40.0, 40.0, 40.0, 40.0]),
    ("Thumb and Index Finger Opposition", [20.0, 70.0, 30.0, 30.0, 30.0]),
    ("Thumb and Index Finger Extension", [10.0, 10.0, 90.0, 90.0, 90.0]),
    ("Thumb and Little Finger Extension", [0.0, 30.0, 30.0, 30.0, 100.0]),
    ("Index and Middle Finger Extension", [30.0, 100.0, 100.0, 30.0, 30.0]),
    ("Little Finger Extension", [50.0, 50.0, 50.0, 50.0, 100.0]),
    ("Index Finger Extension", [20.0, 100.0, 20.0, 20.0, 20.0]),
    ("Thumb Finger Extension", [100.0, 20.0, 20.0, 20.0, 20.0]),
    ("Wrist Extension", [10.0, 10.0, 10.0, 10.0, 10.0]),
    ("Wrist Flexion", [90.0, 90.0, 90.0, 90.0, 90.0]),
    ("Forearm Supination", [20.0, 30.0, 40.0, 50.0, 60.0]),
    ("Forearm Pronation", [60.0, 50.0, 40.0, 30.0, 20.0]),
    ("open_hand_right", [0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Hand Close", [100.0, 100.0, 100.0, 100.0, 100.0]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct GestureTable {
    segments: usize,
    gestures: BTreeMap<String, Vec<f64>>,
}

impl GestureTable {
    /// The stock five-finger gesture set.
    pub fn builtin() -> Self {
        Self {
            segments: 5,
            gestures: BUILTIN
                .iter()
                .map(|(label, percents)| (label.to_string(), percents.to_vec()))
                .collect(),
        }
    }

    /// The stock set for a hand of `segments` segments. Only five-segment
    /// hands have one; anything else is [`GestureError::WrongLength`].
    pub fn builtin_for(segments: usize) -> Result<Self, GestureError> {
        Self::new(segments, Self::builtin().gestures)
    }

    pub fn empty(segments: usize) -> Self {
        Self {
            segments,
            gestures: BTreeMap::new(),
        }
    }

    /// Validate a table: every entry needs exactly `segments` values in 0..=100.
    pub fn new(segments: usize, gestures: BTreeMap<String, Vec<f64>>) -> Result<Self, GestureError> {
        for (label, percents) in &gestures {
            if percents.len() != segments {
                return Err(GestureError::WrongLength {
                    label: label.clone(),
                    got: percents.len(),
                    expected: segments,
                });
            }
            if let Some(&value) = percents.iter().find(|p| !(0.0..=100.0).contains(*p)) {
                return Err(GestureError::OutOfRange {
                    label: label.clone(),
                    value,
                });
            }
        }
        Ok(Self { segments, gestures })
    }

    /// Load `{ "label": [p0, p1, ...], ... }`; falls back to
    /// [`builtin_for`](Self::builtin_for) when the file does not exist.
    pub fn load(path: &Path, segments: usize) -> Result<Self, GestureError> {
        match read_optional_json::<BTreeMap<String, Vec<f64>>>(path)? {
            Some(gestures) => {
                let table = Self::new(segments, gestures)?;
                info!("Loaded {} gestures from {}", table.len(), path.display());
                Ok(table)
            }
            None => {
                info!("Gesture file {} not found, using built-in table", path.display());
                Self::builtin_for(segments)
            }
        }
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.gestures.get(label).map(Vec::as_slice)
    }

    pub fn resolve(&self, label: &str) -> Result<&[f64], GestureError> {
        self.get(label)
            .ok_or_else(|| GestureError::Unknown(label.to_string()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.gestures.keys().map(String::as_str)
    }
}

//! Newline-delimited JSON event stream driving the controller.
//!
//! One event per line, tagged by `type`:
//!
//! ```text
//! {"type":"landmarks","points":[[0.5,0.9],[0.52,0.8],...]}
//! {"type":"landmarks","points":null}
//! {"type":"calibrate","percent":100,"segment":"index"}
//! {"type":"gesture","label":"Hand Close"}
//! {"type":"threshold","value":5}
//! {"type":"interval","ms":40}
//! {"type":"range","segment":"thumb","open":170,"closed":40}
//! {"type":"clear_calibration","segment":"ring"}
//! {"type":"park"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Point2;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// One tracker frame; `null` or `[]` when no hand is visible.
    Landmarks {
        #[serde(default)]
        points: Option<Vec<Point2>>,
    },
    /// Capture the current angle at `percent` for one segment, or all.
    Calibrate {
        percent: f64,
        #[serde(default)]
        segment: Option<String>,
    },
    /// Classifier output.
    Gesture { label: String },
    Threshold { value: i32 },
    Interval { ms: u64 },
    /// Set one segment's device angle range.
    Range {
        segment: String,
        open: i32,
        closed: i32,
    },
    ClearCalibration { segment: String },
    /// Drive every segment open and stop sending.
    Park,
    Resume,
    /// Persist calibration and angle ranges now.
    Save,
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line_number: usize, line: &str) -> Result<Option<InputEvent>, InputError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| InputError::Parse {
            line: line_number,
            source,
        })
}

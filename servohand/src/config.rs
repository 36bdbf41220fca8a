//! Run-time configuration document.
//!
//! Every field has a default, so a partial JSON file (or none at all) is
//! valid. Command-line flags override individual fields after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{read_optional_json, write_json, PersistenceError};
use crate::link::serial::{DEFAULT_BAUD, DEFAULT_WRITE_TIMEOUT};
use crate::link::LinkConfig;
use crate::scheduler::{DEFAULT_THRESHOLD, DEFAULT_TICK_MS};
use crate::segment::{default_hand_segments, Segment, SegmentError, SegmentSet};
use crate::smoother::DEFAULT_SMOOTHING;

pub const DEFAULT_CALIBRATION_FILE: &str = "calibration_data.json";
pub const DEFAULT_ANGLE_MAP_FILE: &str = "angle_map.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Serial device path
    pub port: String,
    pub baud: u32,
    pub write_timeout_ms: u64,
    pub retry_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub tick_ms: u64,
    /// Minimum device-angle change before a segment is re-sent
    pub threshold: i32,
    /// Weight of the previous value in the output smoother (0..=1)
    pub smoothing: f64,
    pub calibration_file: PathBuf,
    pub angle_map_file: PathBuf,
    /// Custom gesture table; the built-in one is used when unset
    pub gesture_file: Option<PathBuf>,
    pub segments: Vec<Segment>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        let link = LinkConfig::default();
        Self {
            port: default_port().to_string(),
            baud: DEFAULT_BAUD,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT.as_millis() as u64,
            retry_interval_ms: link.retry_interval.as_millis() as u64,
            settle_delay_ms: link.settle_delay.as_millis() as u64,
            tick_ms: DEFAULT_TICK_MS,
            threshold: DEFAULT_THRESHOLD,
            smoothing: DEFAULT_SMOOTHING,
            calibration_file: PathBuf::from(DEFAULT_CALIBRATION_FILE),
            angle_map_file: PathBuf::from(DEFAULT_ANGLE_MAP_FILE),
            gesture_file: None,
            segments: default_hand_segments(),
        }
    }
}

#[cfg(windows)]
fn default_port() -> &'static str {
    "COM8"
}

#[cfg(not(windows))]
fn default_port() -> &'static str {
    "/dev/ttyACM0"
}

impl DriveConfig {
    /// Load from JSON; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        Ok(read_optional_json(path)?.unwrap_or_default())
    }

    /// [`load`](Self::load), but an unreadable or malformed file is logged
    /// and replaced by the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Using default configuration: {e}");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        write_json(path, self)
    }

    pub fn segment_set(&self) -> Result<SegmentSet, SegmentError> {
        SegmentSet::new(self.segments.clone())
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            ..LinkConfig::default()
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: DriveConfig =
            serde_json::from_str(r#"{"port": "COM3", "threshold": 3}"#).unwrap();
        assert_eq!(config.port, "COM3");
        assert_eq!(config.threshold, 3);
        assert_eq!(config.baud, 9600);
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.segments.len(), 5);
        assert_eq!(config.calibration_file, PathBuf::from("calibration_data.json"));
    }

    #[test]
    fn test_load_missing_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servohand.json");
        assert_eq!(DriveConfig::load(&path).unwrap(), DriveConfig::default());

        let config = DriveConfig {
            smoothing: 0.8,
            gesture_file: Some(PathBuf::from("gestures.json")),
            ..DriveConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DriveConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"port":"#).unwrap();

        assert!(matches!(
            DriveConfig::load(&path),
            Err(PersistenceError::Malformed { .. })
        ));
        assert_eq!(DriveConfig::load_or_default(&path), DriveConfig::default());
    }

    #[test]
    fn test_link_config_and_segments() {
        let config = DriveConfig {
            retry_interval_ms: 500,
            settle_delay_ms: 0,
            ..DriveConfig::default()
        };
        let link = config.link_config();
        assert_eq!(link.retry_interval, Duration::from_millis(500));
        assert_eq!(link.settle_delay, Duration::ZERO);
        assert_eq!(link.handshake, b"HELLO\n");
        assert_eq!(config.segment_set().unwrap().len(), 5);

        let empty = DriveConfig {
            segments: Vec::new(),
            ..DriveConfig::default()
        };
        assert_eq!(empty.segment_set(), Err(SegmentError::Empty));
    }
}

//! Servo finger control from hand landmarks.
//!
//! Landmark frames are turned into per-finger joint angles, mapped to a
//! closure percentage through per-finger calibration tables, smoothed, and
//! periodically written to a servo controller over a serial line as
//! `idx:angle,...` frames. Only segments whose device angle moved past a
//! threshold are re-sent.
//!
//! ```text
//! landmarks → joint_angle → PercentEstimator → OutputSmoother → PercentBoard
//!                                                                  │
//!                          ActuatorLink ← CommandScheduler ←───────┘
//! ```

pub mod angle_range;
pub mod board;
pub mod calibration;
pub mod config;
pub mod error;
pub mod estimator;
pub mod geometry;
pub mod gesture;
pub mod input;
pub mod link;
pub mod plot;
pub mod scheduler;
pub mod segment;
pub mod smoother;
pub mod tracker;

mod sync;

pub use angle_range::{AngleRange, AngleRangeMap};
pub use board::PercentBoard;
pub use calibration::{CalibrationError, CalibrationPoint, CalibrationStore};
pub use config::DriveConfig;
pub use error::PersistenceError;
pub use estimator::PercentEstimator;
pub use geometry::{joint_angle, Point2};
pub use gesture::{GestureError, GestureTable};
pub use input::{parse_line, InputError, InputEvent};
pub use link::{
    ActuatorLink, Connector, LinkConfig, LinkError, LinkState, LinkStats, SendOutcome, Transport,
};
pub use scheduler::{CommandScheduler, SchedulerHandle, SchedulerSettings, TickOutcome};
pub use segment::{LandmarkTriple, Segment, SegmentId, SegmentSet};
pub use smoother::OutputSmoother;
pub use tracker::{CaptureError, HandTracker, Observation};

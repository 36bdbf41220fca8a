//! Planar landmark geometry.

use serde::{Deserialize, Serialize};

/// Guards the cosine denominator when two landmarks coincide.
const NORM_EPSILON: f64 = 1e-6;

/// A 2-D landmark coordinate, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Point2> for (f64, f64) {
    fn from(p: Point2) -> Self {
        (p.x, p.y)
    }
}

/// Included angle at `joint` between the rays towards `proximal` and `distal`, in degrees.
///
/// Always returns a value in [0, 180]. Coincident points produce 90° rather
/// than NaN.
pub fn joint_angle(proximal: Point2, joint: Point2, distal: Point2) -> f64 {
    let (ax, ay) = (proximal.x - joint.x, proximal.y - joint.y);
    let (bx, by) = (distal.x - joint.x, distal.y - joint.y);

    let dot = ax * bx + ay * by;
    let norms = ax.hypot(ay) * bx.hypot(by);
    let cosine = dot / (norms + NORM_EPSILON);

    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}

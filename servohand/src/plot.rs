//! Calibration graphs: one PNG per segment with the captured points and the
//! fitted curve.
//!
//! plotters is built without a font backend, so the charts carry no text;
//! horizontal guides are drawn every 10 % and the segment name is in the
//! file name.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::calibration::fit::{fit_calibration, PolynomialFit};
use crate::calibration::{CalibrationPoint, CalibrationStore, MIN_POINTS};

/// Points sampled along the fitted curve.
pub const CURVE_SAMPLES: usize = 200;
/// Degrees added on each side of the calibrated angle span.
pub const ANGLE_MARGIN: f64 = 5.0;

const PLOT_WIDTH: u32 = 800;
const PLOT_HEIGHT: u32 = 600;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("failed to create plot directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to draw {path}: {message}")]
    Draw { path: PathBuf, message: String },
}

/// Render `<dir>/<segment>_calibration.png` for every segment with at least
/// two points. Returns the written paths.
pub fn render_calibration_graphs(
    store: &CalibrationStore,
    dir: &Path,
) -> Result<Vec<PathBuf>, PlotError> {
    std::fs::create_dir_all(dir).map_err(|source| PlotError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (id, segment) in store.segments().iter() {
        let points = store.points(id);
        if points.len() < MIN_POINTS {
            debug!(
                "Skipping plot for '{}': {} point(s)",
                segment.name,
                points.len()
            );
            continue;
        }

        let fit = match fit_calibration(&points) {
            Ok(fit) => Some(fit),
            Err(e) => {
                warn!("No fitted curve for '{}': {e}", segment.name);
                None
            }
        };

        let path = dir.join(format!("{}_calibration.png", segment.name));
        render_segment(&path, &points, fit.as_ref()).map_err(|message| PlotError::Draw {
            path: path.clone(),
            message,
        })?;
        written.push(path);
    }

    info!("Wrote {} calibration graph(s) to {}", written.len(), dir.display());
    Ok(written)
}

fn render_segment(
    path: &Path,
    points: &[CalibrationPoint],
    fit: Option<&PolynomialFit>,
) -> Result<(), String> {
    let angle_min = points.iter().map(|p| p.angle).fold(f64::INFINITY, f64::min);
    let angle_max = points
        .iter()
        .map(|p| p.angle)
        .fold(f64::NEG_INFINITY, f64::max);
    let x_min = angle_min - ANGLE_MARGIN;
    let x_max = angle_max + ANGLE_MARGIN;

    let curve = fit
        .map(|fit| fit.sample(x_min, x_max, CURVE_SAMPLES))
        .unwrap_or_default();

    // Keep wild high-degree curves from flattening the points.
    let y_min = curve
        .iter()
        .map(|&(_, y)| y)
        .chain(points.iter().map(|p| p.percent))
        .fold(0.0_f64, f64::min)
        .max(-20.0);
    let y_max = curve
        .iter()
        .map(|&(_, y)| y)
        .chain(points.iter().map(|p| p.percent))
        .fold(100.0_f64, f64::max)
        .min(120.0);

    let root = BitMapBackend::new(path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| e.to_string())?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| e.to_string())?;

    for percent in (0..=100).step_by(10).map(f64::from) {
        chart
            .draw_series(LineSeries::new(
                vec![(x_min, percent), (x_max, percent)],
                &BLACK.mix(0.15),
            ))
            .map_err(|e| e.to_string())?;
    }

    let visible: Vec<(f64, f64)> = curve
        .into_iter()
        .filter(|&(_, y)| (y_min..=y_max).contains(&y))
        .collect();
    chart
        .draw_series(LineSeries::new(visible, &BLUE))
        .map_err(|e| e.to_string())?;

    chart
        .draw_series(
            points
                .iter()
                .map(|p| Circle::new((p.angle, p.percent), 5, RED.filled())),
        )
        .map_err(|e| e.to_string())?;

    root.present().map_err(|e| e.to_string())?;
    debug!("Rendered {}", path.display());
    Ok(())
}

//! Polynomial fit of calibration points, for visualization only.
//!
//! Estimation always uses piecewise-linear interpolation; the fitted curve
//! is drawn next to the raw points so the operator can judge calibration
//! quality. Degree follows the number of points: 1 for two, 2 for three and
//! `n - 1` for four or more.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use super::CalibrationPoint;

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("need at least {need} points to fit, got {got}")]
    InsufficientPoints { got: usize, need: usize },

    #[error("least squares solve failed: {0}")]
    Solve(&'static str),
}

/// Polynomial in a normalized abscissa: `y = Σ cᵢ · ((x - center) / scale)ⁱ`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialFit {
    /// Coefficients in ascending power order
    coefficients: Vec<f64>,
    center: f64,
    scale: f64,
}

impl PolynomialFit {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Evaluate the polynomial with Horner's scheme.
    pub fn eval(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * t + c)
    }

    /// `samples` evenly spaced (x, y) pairs over `[x_min, x_max]`.
    pub fn sample(&self, x_min: f64, x_max: f64, samples: usize) -> Vec<(f64, f64)> {
        if samples < 2 {
            return vec![(x_min, self.eval(x_min))];
        }
        let step = (x_max - x_min) / (samples - 1) as f64;
        (0..samples)
            .map(|i| {
                let x = x_min + i as f64 * step;
                (x, self.eval(x))
            })
            .collect()
    }
}

/// Degree used for a given number of calibration points.
pub fn degree_for(points: usize) -> usize {
    match points {
        0..=2 => 1,
        3 => 2,
        n => n - 1,
    }
}

/// Fit percent as a function of angle through a segment's calibration points.
pub fn fit_calibration(points: &[CalibrationPoint]) -> Result<PolynomialFit, FitError> {
    let xs: Vec<f64> = points.iter().map(|p| p.angle).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.percent).collect();
    fit_polynomial(&xs, &ys, degree_for(points.len()))
}

/// Least-squares polynomial fit of `ys` against `xs`.
pub fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Result<PolynomialFit, FitError> {
    let n = xs.len().min(ys.len());
    let need = degree + 1;
    if n < need {
        return Err(FitError::InsufficientPoints { got: n, need });
    }

    let center = xs[..n].iter().sum::<f64>() / n as f64;
    let spread = xs[..n]
        .iter()
        .map(|x| (x - center).abs())
        .fold(0.0_f64, f64::max);
    let scale = if spread > f64::EPSILON { spread } else { 1.0 };

    let vandermonde = DMatrix::from_fn(n, need, |row, col| {
        ((xs[row] - center) / scale).powi(col as i32)
    });
    let rhs = DVector::from_column_slice(&ys[..n]);

    let coefficients = vandermonde
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map_err(FitError::Solve)?;

    Ok(PolynomialFit {
        coefficients: coefficients.iter().copied().collect(),
        center,
        scale,
    })
}

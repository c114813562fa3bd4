//! Interpolation and grid helpers for calibration tables.
//!
//! This module provides the one-dimensional interpolation used throughout the
//! completeness engine:
//!
//! - **Linear interpolation**: Fast 1D interpolation with error handling
//! - **Interpolators**: Reusable tables with configurable kind (linear or
//!   nearest-neighbor) and out-of-range behavior (error, extrapolate, fill)
//! - **Grids**: `arange`-style evenly stepped grids with numpy length rules

use thiserror::Error;

/// Errors that can occur during interpolation operations.
///
/// This enum provides detailed error information for interpolation failures,
/// allowing callers to handle different error conditions appropriately.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
}

/// Performs linear interpolation on 1D data using binary search for efficiency.
///
/// This function implements fast linear interpolation by:
/// 1. Validating input data (lengths, sorting, sufficient points)
/// 2. Using binary search to find the correct interval (O(log n))
/// 3. Applying linear interpolation formula: y = y₁ + t(y₂ - y₁)
///
/// where t = (x - x₁)/(x₂ - x₁) is the interpolation parameter.
///
/// A NaN query returns NaN rather than an error.
///
/// # Errors
///
/// * `InterpError::OutOfBounds` - x is outside the range \\[xs\\[0\\], xs\\[n-1\\]\\]
/// * `InterpError::InsufficientData` - Less than 2 data points provided
/// * `InterpError::MismatchedLengths` - xs and ys have different lengths
/// * `InterpError::UnsortedData` - xs array is not sorted in ascending order
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    validate(xs, ys)?;
    interp_unchecked(x, xs, ys, Bounds::Error)
}

fn validate(xs: &[f64], ys: &[f64]) -> Result<(), InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }

    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }

    // Check if xs is sorted
    for i in 1..xs.len() {
        if xs[i].partial_cmp(&xs[i - 1]) != Some(std::cmp::Ordering::Greater) {
            return Err(InterpError::UnsortedData);
        }
    }

    Ok(())
}

/// Index of the segment [xs[i], xs[i+1]] used for x. Clamped to the end segments.
fn segment(x: f64, xs: &[f64]) -> usize {
    let idx = xs.partition_point(|&xi| xi <= x);
    idx.clamp(1, xs.len() - 1) - 1
}

fn interp_unchecked(x: f64, xs: &[f64], ys: &[f64], bounds: Bounds) -> Result<f64, InterpError> {
    if x.is_nan() {
        return Ok(f64::NAN);
    }

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];

    if x < min_x || x > max_x {
        match bounds {
            Bounds::Error => return Err(InterpError::OutOfBounds(x, min_x, max_x)),
            Bounds::Fill(below, above) => {
                return Ok(if x < min_x { below } else { above });
            }
            Bounds::Extrapolate => {}
        }
    }

    let i1 = segment(x, xs);
    let i2 = i1 + 1;

    let x1 = xs[i1];
    let x2 = xs[i2];
    let y1 = ys[i1];
    let y2 = ys[i2];

    if x == x1 {
        return Ok(y1);
    }
    if x == x2 {
        return Ok(y2);
    }

    let t = (x - x1) / (x2 - x1);
    Ok(y1 + t * (y2 - y1))
}

/// How an interpolator treats queries outside the tabulated range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    /// Return `InterpError::OutOfBounds`
    Error,
    /// Continue the first/last segment linearly
    Extrapolate,
    /// Return the (below, above) fill values
    Fill(f64, f64),
}

/// Interpolation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Linear,
    /// Value of the closest tabulated point; ties go to the lower point
    Nearest,
}

/// A validated 1D lookup table.
///
/// Built once from calibration data and evaluated many times; validation
/// happens at construction so evaluation only fails for out-of-bounds queries
/// under [`Bounds::Error`].
#[derive(Debug, Clone)]
pub struct Interp1d {
    xs: Vec<f64>,
    ys: Vec<f64>,
    kind: Kind,
    bounds: Bounds,
}

impl Interp1d {
    /// Create a linear interpolator that rejects out-of-range queries.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, InterpError> {
        validate(&xs, &ys)?;
        Ok(Self {
            xs,
            ys,
            kind: Kind::Linear,
            bounds: Bounds::Error,
        })
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Tabulated x range (min, max)
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Evaluate at x.
    pub fn eval(&self, x: f64) -> Result<f64, InterpError> {
        match self.kind {
            Kind::Linear => interp_unchecked(x, &self.xs, &self.ys, self.bounds),
            Kind::Nearest => self.nearest(x),
        }
    }

    /// Evaluate at x for interpolators that cannot fail (any bounds other than `Error`).
    ///
    /// Out-of-bounds queries under [`Bounds::Error`] yield NaN.
    pub fn eval_or_nan(&self, x: f64) -> f64 {
        self.eval(x).unwrap_or(f64::NAN)
    }

    fn nearest(&self, x: f64) -> Result<f64, InterpError> {
        if x.is_nan() {
            return Ok(f64::NAN);
        }
        let (min_x, max_x) = self.domain();
        if x < min_x || x > max_x {
            match self.bounds {
                Bounds::Error => return Err(InterpError::OutOfBounds(x, min_x, max_x)),
                Bounds::Fill(below, above) => return Ok(if x < min_x { below } else { above }),
                Bounds::Extrapolate => {}
            }
        }
        let i1 = segment(x, &self.xs);
        let i2 = i1 + 1;
        let midpoint = 0.5 * (self.xs[i1] + self.xs[i2]);
        Ok(if x <= midpoint {
            self.ys[i1]
        } else {
            self.ys[i2]
        })
    }
}

/// Evenly stepped values in [start, stop) with numpy's `arange` length rule.
///
/// The number of points is `ceil((stop - start) / step)` and each value is
/// computed as `start + i * step` so no error accumulates along the grid.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step == 0.0 || !start.is_finite() || !stop.is_finite() {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil();
    if n <= 0.0 {
        return Vec::new();
    }
    (0..n as usize).map(|i| start + i as f64 * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_match() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(interp(2.0, &xs, &ys).unwrap(), 20.0);
        assert_eq!(interp(4.0, &xs, &ys).unwrap(), 40.0);
    }

    #[test]
    fn test_linear_interpolation() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys = vec![10.0, 20.0, 30.0];
        assert_eq!(interp(1.5, &xs, &ys).unwrap(), 15.0);
        assert_eq!(interp(2.5, &xs, &ys).unwrap(), 25.0);
    }

    #[test]
    fn test_out_of_bounds() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys = vec![10.0, 20.0, 30.0];
        assert!(matches!(
            interp(0.5, &xs, &ys),
            Err(InterpError::OutOfBounds(_, _, _))
        ));
        assert!(matches!(
            interp(3.5, &xs, &ys),
            Err(InterpError::OutOfBounds(_, _, _))
        ));
    }

    #[test]
    fn test_mismatched_lengths() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys = vec![10.0, 20.0];
        assert!(matches!(
            interp(1.5, &xs, &ys),
            Err(InterpError::MismatchedLengths)
        ));
    }

    #[test]
    fn test_insufficient_data() {
        let xs = vec![1.0];
        let ys = vec![10.0];
        assert!(matches!(
            interp(1.0, &xs, &ys),
            Err(InterpError::InsufficientData)
        ));
    }

    #[test]
    fn test_unsorted_data() {
        let xs = vec![2.0, 1.0, 3.0];
        let ys = vec![20.0, 10.0, 30.0];
        assert!(matches!(
            interp(1.5, &xs, &ys),
            Err(InterpError::UnsortedData)
        ));
    }

    #[test]
    fn test_nan_query_passes_through() {
        let xs = vec![1.0, 2.0];
        let ys = vec![1.0, 2.0];
        assert!(interp(f64::NAN, &xs, &ys).unwrap().is_nan());
    }

    #[test]
    fn test_extrapolation() {
        let table = Interp1d::new(vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 40.0])
            .unwrap()
            .with_bounds(Bounds::Extrapolate);
        assert_relative_eq!(table.eval(0.0).unwrap(), 0.0);
        assert_relative_eq!(table.eval(4.0).unwrap(), 60.0);
        assert_relative_eq!(table.eval(2.5).unwrap(), 30.0);
    }

    #[test]
    fn test_fill_values() {
        let table = Interp1d::new(vec![1.0, 2.0], vec![5.0, 6.0])
            .unwrap()
            .with_bounds(Bounds::Fill(-3.0, 9.0));
        assert_eq!(table.eval(0.5).unwrap(), -3.0);
        assert_eq!(table.eval(2.5).unwrap(), 9.0);
        assert_eq!(table.eval(1.5).unwrap(), 5.5);
    }

    #[test]
    fn test_nearest_kind() {
        let table = Interp1d::new(vec![0.0, 1.0, 2.0], vec![0.1, 0.2, 0.3])
            .unwrap()
            .with_kind(Kind::Nearest)
            .with_bounds(Bounds::Fill(0.3, 0.3));
        assert_eq!(table.eval(0.4).unwrap(), 0.1);
        assert_eq!(table.eval(0.5).unwrap(), 0.1);
        assert_eq!(table.eval(0.6).unwrap(), 0.2);
        assert_eq!(table.eval(2.0).unwrap(), 0.3);
        assert_eq!(table.eval(-1.0).unwrap(), 0.3);
        assert_eq!(table.eval(7.0).unwrap(), 0.3);
    }

    #[test]
    fn test_arange_length_rule() {
        let grid = arange(20.0, 26.0, 0.25);
        assert_eq!(grid.len(), 24);
        assert_eq!(grid[0], 20.0);
        assert_relative_eq!(grid[23], 25.75);

        // Stop not on the grid: ceil rule keeps the last point below stop
        let grid = arange(0.2, 3.0, 0.2);
        assert_eq!(grid.len(), 14);

        assert!(arange(1.0, 0.0, 0.1).is_empty());
    }
}

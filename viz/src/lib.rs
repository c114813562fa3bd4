//! ASCII visualization for survey statistics.
//!
//! Histograms are the workhorse of completeness studies: observed and model
//! distributions are binned on the same edges, compared bin by bin, and
//! printed to the terminal or log for a quick look.
//!
//! ```rust
//! use viz::histogram::Histogram;
//!
//! let mut hist = Histogram::new(vec![0.2, 0.4, 0.6, 0.8])?.with_title("log EW");
//! hist.add_all([0.25, 0.45, 0.5, 0.79]);
//! assert_eq!(hist.counts(), &[1.0, 2.0, 1.0]);
//! println!("{}", hist.format()?);
//! # Ok::<(), viz::VizError>(())
//! ```

use std::fmt;
use thiserror::Error;

/// Error types for visualization operations.
#[derive(Debug, Error)]
pub enum VizError {
    /// Histogram creation or analysis error.
    ///
    /// Includes issues with bin configuration and data validation.
    #[error("Histogram error: {0}")]
    HistogramError(String),

    /// Text formatting error.
    #[error("Formatting error: {0}")]
    FmtError(#[from] fmt::Error),
}

/// Standard Result type for all visualization operations.
pub type Result<T> = std::result::Result<T, VizError>;

pub mod histogram;

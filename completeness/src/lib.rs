//! Monte Carlo completeness engine for narrow-band H-alpha surveys
//!
//! For each narrow-band filter a synthetic population matching the observed
//! number counts is given log-normal equivalent widths, observed with
//! photometric noise and passed through the survey's excess selection. The
//! recovered fraction is reported against sSFR, SFR and line flux, and the
//! mock EW and flux distributions are compared with the real sample to pick
//! the best (mean, sigma) of the EW distribution.

pub mod aggregate;
pub mod cache;
pub mod compare;
pub mod config;
pub mod io;
pub mod mock;
pub mod photometry;
pub mod population;
pub mod properties;
pub mod selection;
pub mod shared_args;
pub mod sims;

pub use config::{FilterConfig, PipelineConfig};
pub use population::{BaseSyntheticPopulation, DerivedPopulation, EwHypothesis, NumberCounts};
pub use selection::SelectionCut;
pub use sims::{EwMc, EwMcError, RunOptions};

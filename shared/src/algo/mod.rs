//! Numeric algorithms shared by the simulation crates
//!
//! Interpolation tables, evenly stepped grids, and NaN-aware summary
//! statistics.

pub mod misc;
pub mod stats;

pub use misc::{arange, interp, Bounds, Interp1d, InterpError, Kind};
pub use stats::{median, std_dev, Summary};

pub mod calibration;
pub mod tables;

pub use calibration::{CalibrationError, CalibrationSource, ObservedSample};
pub use tables::{
    output_name, write_weighted_dispersion, BestFitTable, CompletenessRow, CompletenessTable,
    DispersionTable, WEIGHTED_DISPERSION_STEM,
};

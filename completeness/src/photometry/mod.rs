//! Photometry models: magnitude errors, the color-excess cut, line fluxes
//! and the distances needed to turn fluxes into luminosities.

pub mod cosmology;
pub mod line_flux;
pub mod magnitudes;

pub use cosmology::{halpha_redshift, FlatLambdaCdm};
pub use line_flux::{ew_flux_dual, Bandpass, EwExcessTable, EwFlux};
pub use magnitudes::{
    color_cut, mag_combine, magnitude_error, magnitude_errors, selection_break, LIMIT_SIGMA,
};

//! Emission-line equivalent width and flux from a narrow-band excess.
//!
//! A line of equivalent width EW inside a narrow band of width dNB (also
//! covered by a broad band of width dBB) brightens the narrow band relative to
//! the continuum. With y = 10^(-0.4 x) for an excess x = BB - NB:
//!
//! EW   = dNB (1 - y) / (y - dNB/dBB)
//! F    = dNB f_NB (1 - y) / (1 - dNB/dBB)
//!
//! where f_NB is the narrow-band flux density per Angstrom.

use shared::algo::{Bounds, Interp1d, InterpError};

use super::magnitudes::AB_ZERO_POINT;

/// Speed of light in Angstrom/s
pub const C_ANGSTROM_PER_S: f64 = 2.99792458e18;

/// Fill value for equivalent widths below the tabulated range
const BELOW_TABLE_EXCESS: f64 = -3.0;

/// Narrow-band/broad-band geometry of one filter (all in Angstrom).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bandpass {
    pub lambda_c: f64,
    pub d_nb: f64,
    pub d_bb: f64,
}

impl Bandpass {
    /// log10 of the equivalent width implied by excess `x`.
    ///
    /// NaN once the excess exceeds what the band geometry allows.
    pub fn log_ew(&self, x: f64) -> f64 {
        let y = 10f64.powf(-0.4 * x);
        (self.d_nb * (1.0 - y) / (y - self.d_nb / self.d_bb)).log10()
    }

    /// Narrow-band flux density in erg/s/cm^2/A.
    pub fn flux_density(&self, nb: f64) -> f64 {
        10f64.powf(-0.4 * (nb + AB_ZERO_POINT)) * C_ANGSTROM_PER_S / (self.lambda_c * self.lambda_c)
    }

    /// Line flux (erg/s/cm^2) for narrow-band magnitude `nb` and excess `x`.
    pub fn line_flux(&self, nb: f64, x: f64) -> f64 {
        let y = 10f64.powf(-0.4 * x);
        self.d_nb * self.flux_density(nb) * (1.0 - y) / (1.0 - self.d_nb / self.d_bb)
    }
}

/// Equivalent width and corrected line flux of one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwFlux {
    pub log_ew: f64,
    pub log_flux: f64,
}

/// Dual-band EW and flux for narrow-band magnitude `nb` and excess `x`.
///
/// NaN or negative excesses are treated as zero. The flux is multiplied by
/// the filter's statistical correction `filt_corr` before the log.
pub fn ew_flux_dual(nb: f64, x: f64, band: &Bandpass, filt_corr: f64) -> EwFlux {
    let x = if x.is_nan() || x < 0.0 { 0.0 } else { x };

    EwFlux {
        log_ew: band.log_ew(x),
        log_flux: (band.line_flux(nb, x) * filt_corr).log10(),
    }
}

/// Inverse of [`Bandpass::log_ew`]: equivalent width to narrow-band excess.
///
/// Built once per filter from a dense grid of excesses, keeping only the
/// finite equivalent widths.
#[derive(Debug, Clone)]
pub struct EwExcessTable {
    inverse: Interp1d,
}

impl EwExcessTable {
    pub fn build(band: &Bandpass, excess_grid: &[f64]) -> Result<Self, InterpError> {
        let (log_ew, excess): (Vec<f64>, Vec<f64>) = excess_grid
            .iter()
            .map(|&x| (band.log_ew(x), x))
            .filter(|(ew, _)| ew.is_finite())
            .unzip();

        let max_excess = excess.last().copied().unwrap_or(f64::NAN);
        let inverse = Interp1d::new(log_ew, excess)?
            .with_bounds(Bounds::Fill(BELOW_TABLE_EXCESS, max_excess));

        Ok(Self { inverse })
    }

    /// Tabulated log EW range (min, max)
    pub fn log_ew_range(&self) -> (f64, f64) {
        self.inverse.domain()
    }

    /// Excess for a log EW, clamped at zero.
    pub fn excess(&self, log_ew: f64) -> f64 {
        let x = self.inverse.eval_or_nan(log_ew);
        if x < 0.0 {
            0.0
        } else {
            x
        }
    }
}

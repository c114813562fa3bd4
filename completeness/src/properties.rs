//! Physical properties of H-alpha emitters from their photometry.
//!
//! The chain is: continuum magnitude -> stellar mass -> [NII]/H-alpha ->
//! metallicity, and narrow-band excess -> line flux -> [NII]-corrected
//! H-alpha flux -> luminosity -> metallicity-dependent SFR.

use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};
use shared::algo::{Bounds, Interp1d, InterpError, Kind};
use std::f64::consts::PI;

use crate::photometry::{ew_flux_dual, Bandpass};

/// Stellar-mass dispersion used where the calibration has too few objects
pub const DEFAULT_MASS_DISPERSION: f64 = 0.30;

/// [NII]/H-alpha below the mass break
pub const NII_HA_LOW_MASS: f64 = 0.0624396766589;
/// log stellar mass at or below which the low-mass ratio applies
pub const NII_HA_MASS_BREAK: f64 = 8.0;
const NII_HA_SLOPE: f64 = 0.169429547993;
const NII_HA_INTERCEPT: f64 = -1.29299670728;

/// Fraction of the [NII] doublet flux in the 6583 line (6583/6548 = 2.96)
pub const NII6583_FRACTION: f64 = 1.0 / (1.0 + 1.0 / 2.96);

/// Binned continuum magnitude versus stellar mass relation.
///
/// `cont_arr` holds the lower edge of each magnitude bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassTable {
    pub cont_arr: Vec<f64>,
    pub avg_log_m: Vec<f64>,
    pub std_log_m: Vec<f64>,
    pub n_log_m: Vec<f64>,
}

impl MassTable {
    /// Bin a cross-matched sample of continuum magnitudes and log masses.
    ///
    /// Bins of width `dmag` start at the brightest magnitude and cover the
    /// sample; empty bins get zero mean, dispersion and count.
    /// Pairs with a non-finite member are skipped.
    pub fn from_samples(cont_mag: &[f64], log_mass: &[f64], dmag: f64) -> Self {
        let pairs: Vec<(f64, f64)> = cont_mag
            .iter()
            .zip(log_mass)
            .map(|(&m, &logm)| (m, logm))
            .filter(|(m, logm)| m.is_finite() && logm.is_finite())
            .collect();

        let x_min = pairs.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let x_max = pairs.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let cont_arr = shared::algo::arange(x_min, x_max + dmag, dmag);

        let mut avg_log_m = Vec::with_capacity(cont_arr.len());
        let mut std_log_m = Vec::with_capacity(cont_arr.len());
        let mut n_log_m = Vec::with_capacity(cont_arr.len());

        for &lo in &cont_arr {
            let in_bin: Vec<f64> = pairs
                .iter()
                .filter(|(m, _)| *m >= lo && *m < lo + dmag)
                .map(|p| p.1)
                .collect();

            if in_bin.is_empty() {
                avg_log_m.push(0.0);
                std_log_m.push(0.0);
            } else {
                avg_log_m.push(in_bin.iter().sum::<f64>() / in_bin.len() as f64);
                std_log_m.push(shared::algo::std_dev(&in_bin));
            }
            n_log_m.push(in_bin.len() as f64);
        }

        Self {
            cont_arr,
            avg_log_m,
            std_log_m,
            n_log_m,
        }
    }
}

/// Interpolated stellar mass and its dispersion as functions of continuum magnitude.
#[derive(Debug, Clone)]
pub struct MassCalibration {
    mean: Interp1d,
    dispersion: Interp1d,
}

impl MassCalibration {
    /// Build the interpolators from a binned table.
    ///
    /// The mean uses bin centers with at least one object and extrapolates
    /// linearly. The dispersion uses every bin center, replaces bins with
    /// one object or fewer by [`DEFAULT_MASS_DISPERSION`], takes the nearest
    /// bin, and falls back to the default outside the table.
    pub fn from_table(table: &MassTable) -> Result<Self, InterpError> {
        let n = table.cont_arr.len();
        if table.avg_log_m.len() != n || table.std_log_m.len() != n || table.n_log_m.len() != n {
            return Err(InterpError::MismatchedLengths);
        }
        if n < 2 {
            return Err(InterpError::InsufficientData);
        }

        let dmag = table.cont_arr[1] - table.cont_arr[0];
        let centers: Vec<f64> = table.cont_arr.iter().map(|c| c + dmag / 2.0).collect();

        let (mean_x, mean_y): (Vec<f64>, Vec<f64>) = centers
            .iter()
            .zip(&table.avg_log_m)
            .zip(&table.n_log_m)
            .filter(|(_, &count)| count != 0.0)
            .map(|((&c, &m), _)| (c, m))
            .unzip();
        let mean = Interp1d::new(mean_x, mean_y)?
            .with_bounds(Bounds::Extrapolate);

        let std: Vec<f64> = table
            .std_log_m
            .iter()
            .zip(&table.n_log_m)
            .map(|(&s, &count)| {
                if count <= 1.0 {
                    DEFAULT_MASS_DISPERSION
                } else {
                    s
                }
            })
            .collect();
        let dispersion = Interp1d::new(centers, std)?
            .with_kind(Kind::Nearest)
            .with_bounds(Bounds::Fill(DEFAULT_MASS_DISPERSION, DEFAULT_MASS_DISPERSION));

        Ok(Self { mean, dispersion })
    }

    /// log stellar mass at continuum magnitude `bb`
    pub fn log_mass(&self, bb: f64) -> f64 {
        self.mean.eval_or_nan(bb)
    }

    /// Dispersion in log stellar mass at continuum magnitude `bb`
    pub fn dispersion(&self, bb: f64) -> f64 {
        self.dispersion.eval_or_nan(bb)
    }
}

/// [NII]6548,6583/H-alpha flux ratio as a function of log stellar mass.
///
/// Constant up to and including the mass break, linear above it. The two
/// pieces do not meet at the break.
pub fn nii_ha_ratio(log_mass: f64) -> f64 {
    if log_mass.is_nan() {
        f64::NAN
    } else if log_mass <= NII_HA_MASS_BREAK {
        NII_HA_LOW_MASS
    } else {
        NII_HA_SLOPE * log_mass + NII_HA_INTERCEPT
    }
}

/// Pettini & Pagel (2004) N2 calibration: 12 + log(O/H) from log([NII]6583/H-alpha).
pub fn pp04_n2(n2: f64) -> f64 {
    9.37 + 2.03 * n2 + 1.26 * n2.powi(2) + 0.32 * n2.powi(3)
}

/// 12 + log(O/H) from the [NII] doublet to H-alpha ratio
pub fn metallicity(nii_ha: f64) -> f64 {
    pp04_n2((nii_ha * NII6583_FRACTION).log10())
}

/// Remove the [NII] contribution from a log narrow-band line flux.
pub fn correct_nii(log_flux: f64, nii_ha: f64) -> f64 {
    log_flux - (1.0 + nii_ha).log10()
}

/// Metallicity-dependent H-alpha SFR conversion.
///
/// log SFR = -41.34 + 0.39 y + 0.127 y^2 + log L with y = log(O/H) + 3.31.
pub fn halpha_log_sfr(oh12: f64, log_lum: f64) -> f64 {
    let y = oh12 - 12.0 + 3.31;
    -41.34 + 0.39 * y + 0.127 * y * y + log_lum
}

/// Everything derived for one galaxy (or one mock realization of it).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GalaxyProperties {
    pub log_ew: f64,
    /// log narrow-band line flux including [NII]
    pub log_flux: f64,
    pub log_mass: f64,
    pub nii_ha: f64,
    /// 12 + log(O/H)
    pub oh12: f64,
    /// log H-alpha flux after [NII] removal
    pub ha_flux: f64,
    pub ha_lum: f64,
    pub log_sfr: f64,
}

/// Derived property arrays, one per field of [`GalaxyProperties`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedProperties<D: Dimension> {
    pub log_ew: Array<f64, D>,
    pub log_flux: Array<f64, D>,
    pub log_mass: Array<f64, D>,
    pub nii_ha: Array<f64, D>,
    pub oh12: Array<f64, D>,
    pub ha_flux: Array<f64, D>,
    pub ha_lum: Array<f64, D>,
    pub log_sfr: Array<f64, D>,
}

impl<D: Dimension> DerivedProperties<D> {
    fn from_records(records: Array<GalaxyProperties, D>) -> Self {
        Self {
            log_ew: records.mapv(|r| r.log_ew),
            log_flux: records.mapv(|r| r.log_flux),
            log_mass: records.mapv(|r| r.log_mass),
            nii_ha: records.mapv(|r| r.nii_ha),
            oh12: records.mapv(|r| r.oh12),
            ha_flux: records.mapv(|r| r.ha_flux),
            ha_lum: records.mapv(|r| r.ha_lum),
            log_sfr: records.mapv(|r| r.log_sfr),
        }
    }

    /// log specific SFR
    pub fn log_ssfr(&self) -> Array<f64, D> {
        &self.log_sfr - &self.log_mass
    }
}

/// Per-filter model turning photometry into physical properties.
#[derive(Debug, Clone)]
pub struct PropertyModel {
    pub band: Bandpass,
    pub filt_corr: f64,
    /// Luminosity distance of the filter's H-alpha redshift (cm)
    pub lum_dist_cm: f64,
    pub mass: MassCalibration,
}

impl PropertyModel {
    /// Properties of one object.
    ///
    /// `mass_deviate` is a standard-normal draw scaling the calibration
    /// dispersion; pass 0 for the mean relation.
    pub fn galaxy(&self, nb: f64, bb: f64, x: f64, mass_deviate: f64) -> GalaxyProperties {
        let line = ew_flux_dual(nb, x, &self.band, self.filt_corr);

        let mut log_mass = self.mass.log_mass(bb);
        if mass_deviate != 0.0 {
            log_mass += self.mass.dispersion(bb) * mass_deviate;
        }

        let nii_ha = nii_ha_ratio(log_mass);
        let oh12 = metallicity(nii_ha);
        let ha_flux = correct_nii(line.log_flux, nii_ha);
        let ha_lum = ha_flux + (4.0 * PI).log10() + 2.0 * self.lum_dist_cm.log10();

        GalaxyProperties {
            log_ew: line.log_ew,
            log_flux: line.log_flux,
            log_mass,
            nii_ha,
            oh12,
            ha_flux,
            ha_lum,
            log_sfr: halpha_log_sfr(oh12, ha_lum),
        }
    }

    /// Properties of every object, without mass scatter.
    pub fn derive<D: Dimension>(
        &self,
        nb: &Array<f64, D>,
        bb: &Array<f64, D>,
        x: &Array<f64, D>,
    ) -> DerivedProperties<D> {
        let records = Zip::from(nb)
            .and(bb)
            .and(x)
            .map_collect(|&nb, &bb, &x| self.galaxy(nb, bb, x, 0.0));
        DerivedProperties::from_records(records)
    }

    /// Properties of every object with stellar masses scattered by the
    /// calibration dispersion times `mass_deviates`.
    pub fn derive_scattered<D: Dimension>(
        &self,
        nb: &Array<f64, D>,
        bb: &Array<f64, D>,
        x: &Array<f64, D>,
        mass_deviates: &Array<f64, D>,
    ) -> DerivedProperties<D> {
        let records = Zip::from(nb)
            .and(bb)
            .and(x)
            .and(mass_deviates)
            .map_collect(|&nb, &bb, &x, &z| self.galaxy(nb, bb, x, z));
        DerivedProperties::from_records(records)
    }
}

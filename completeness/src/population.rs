//! Synthetic galaxy populations.
//!
//! A filter's [`BaseSyntheticPopulation`] is a deterministic list of
//! narrow-band magnitudes whose binned counts follow the observed number
//! counts. Each [`EwHypothesis`] then draws log-normal equivalent widths for
//! that list and derives everything else into a [`DerivedPopulation`].

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use shared::algo::{interp, InterpError};
use shared::noise::standard_normal_1d;
use viz::histogram::Histogram;

use crate::config::{FilterConfig, GridConfig};
use crate::photometry::{magnitude_errors, EwExcessTable, LIMIT_SIGMA};
use crate::properties::{DerivedProperties, GalaxyProperties, PropertyModel};
use crate::selection::SelectionCut;

/// Smallest spacing between the narrow-band, broad-band and mass streams
pub const MIN_SEED_STRIDE: usize = 5;
/// Spacing between filters in the equivalent-width seed space
pub const EW_SEED_STRIDE: u64 = 1000;

/// Normalized narrow-band number counts of one filter.
///
/// `n_norm` integrates to one over `mag` (bin lower edges) at the bin size
/// the counts were made with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberCounts {
    pub mag: Vec<f64>,
    pub n_norm: Vec<f64>,
}

impl NumberCounts {
    /// Brightest bin edge kept in the normalized counts
    pub const MAG_MIN: f64 = 20.0;
    const HIST_START: f64 = 17.0;
    const HIST_STOP: f64 = 28.0;

    /// Histogram a detection catalog and normalize the bins between
    /// [`Self::MAG_MIN`] and the limiting magnitude.
    pub fn from_magnitudes(mags: &[f64], m_nb: f64, bin_size: f64) -> Result<Self, viz::VizError> {
        let edges = shared::algo::arange(Self::HIST_START, Self::HIST_STOP, bin_size);
        let mut hist = Histogram::new(edges)?;
        hist.add_all(mags.iter().copied());

        let (mag, counts): (Vec<f64>, Vec<f64>) = hist
            .bin_edges()
            .iter()
            .zip(hist.counts())
            .filter(|(&edge, _)| edge >= Self::MAG_MIN && edge <= m_nb)
            .map(|(&edge, &n)| (edge, n))
            .unzip();

        let total: f64 = counts.iter().sum();
        let n_norm = counts.iter().map(|n| n / bin_size / total).collect();

        Ok(Self { mag, n_norm })
    }
}

/// Seeds of every random stream used for one filter.
///
/// The mock streams of filter `ff` are `ff`, `ff + stride` and
/// `ff + 2 stride` with `stride = max(n_filters, 5)`, so no two filters
/// ever share a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPlan {
    filter_index: u64,
    stride: u64,
}

impl SeedPlan {
    pub fn new(filter_index: usize, n_filters: usize) -> Self {
        Self {
            filter_index: filter_index as u64,
            stride: n_filters.max(MIN_SEED_STRIDE) as u64,
        }
    }

    /// Narrow-band mock magnitudes
    pub fn narrowband(&self) -> u64 {
        self.filter_index
    }

    /// Broad-band mock magnitudes
    pub fn broadband(&self) -> u64 {
        self.filter_index + self.stride
    }

    /// Mock stellar-mass scatter
    pub fn mass(&self) -> u64 {
        self.filter_index + 2 * self.stride
    }

    /// Equivalent-width draws of grid point (mm, ss)
    pub fn equivalent_width(&self, mm: usize, ss: usize, n_sigma: usize) -> u64 {
        EW_SEED_STRIDE * (self.filter_index + 1) + (mm * n_sigma + ss) as u64
    }
}

/// Noise-free synthetic population of one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSyntheticPopulation {
    pub nsim: usize,
    /// Narrow-band magnitude grid
    pub nb_grid: Vec<f64>,
    /// Expected counts per grid magnitude before rounding
    pub n_mag_mock: Vec<f64>,
    /// Objects materialized at each grid magnitude
    pub ndist: Vec<usize>,
    /// True narrow-band magnitude of every object
    pub nb_ref: Array1<f64>,
    /// Narrow-band magnitude error of every object
    pub nb_sig_ref: Array1<f64>,
}

impl BaseSyntheticPopulation {
    /// Materialize `round(N(m))` objects at each grid magnitude m.
    ///
    /// N is the normalized count interpolated onto the grid and scaled by
    /// `nsim` and the grid spacing. Grid magnitudes outside the calibrated
    /// range are an error.
    pub fn build(
        counts: &NumberCounts,
        filter: &FilterConfig,
        nb_grid: Vec<f64>,
        nsim: usize,
    ) -> Result<Self, InterpError> {
        let nb_bin = match nb_grid.as_slice() {
            [a, b, ..] => b - a,
            _ => return Err(InterpError::InsufficientData),
        };
        let scale = nsim as f64 * nb_bin;
        let scaled: Vec<f64> = counts.n_norm.iter().map(|n| n * scale).collect();

        let n_mag_mock = nb_grid
            .iter()
            .map(|&m| interp(m, &counts.mag, &scaled))
            .collect::<Result<Vec<f64>, InterpError>>()?;

        let ndist: Vec<usize> = n_mag_mock
            .iter()
            .map(|n| n.round_ties_even().max(0.0) as usize)
            .collect();

        let nb_sig = magnitude_errors(&Array1::from(nb_grid.clone()), filter.m_nb, LIMIT_SIGMA);

        let ngal: usize = ndist.iter().sum();
        let mut nb_ref = Vec::with_capacity(ngal);
        let mut nb_sig_ref = Vec::with_capacity(ngal);
        for ((&m, &sig), &n) in nb_grid.iter().zip(&nb_sig).zip(&ndist) {
            nb_ref.extend(std::iter::repeat(m).take(n));
            nb_sig_ref.extend(std::iter::repeat(sig).take(n));
        }

        Ok(Self {
            nsim,
            nb_grid,
            n_mag_mock,
            ndist,
            nb_ref: Array1::from(nb_ref),
            nb_sig_ref: Array1::from(nb_sig_ref),
        })
    }

    /// Number of synthetic galaxies
    pub fn ngal(&self) -> usize {
        self.nb_ref.len()
    }

    /// Whether this population was generated with the given parameters
    pub fn matches(&self, nsim: usize, nb_grid: &[f64]) -> bool {
        self.nsim == nsim && self.nb_grid == nb_grid
    }
}

/// One (mean, sigma) point of the log-normal equivalent-width grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwHypothesis {
    /// Row index (mean)
    pub mm: usize,
    /// Column index (sigma)
    pub ss: usize,
    pub log_ew_mean: f64,
    pub log_ew_sig: f64,
}

/// Row-major grid of [`EwHypothesis`] for one filter.
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisGrid {
    pub means: Vec<f64>,
    pub sigmas: Vec<f64>,
}

impl HypothesisGrid {
    pub fn new(filter: &FilterConfig, grid: &GridConfig) -> Self {
        let axis = |start: f64, n: usize| -> Vec<f64> {
            (0..n).map(|i| start + grid.step * i as f64).collect()
        };
        Self {
            means: axis(filter.logew_mean_start, grid.n_mean),
            sigmas: axis(filter.logew_sig_start, grid.n_sigma),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.means.len(), self.sigmas.len())
    }

    pub fn len(&self) -> usize {
        self.means.len() * self.sigmas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, mm: usize, ss: usize) -> Option<EwHypothesis> {
        Some(EwHypothesis {
            mm,
            ss,
            log_ew_mean: *self.means.get(mm)?,
            log_ew_sig: *self.sigmas.get(ss)?,
        })
    }

    /// All grid points, sigma varying fastest
    pub fn hypotheses(&self) -> Vec<EwHypothesis> {
        (0..self.means.len())
            .flat_map(|mm| (0..self.sigmas.len()).filter_map(move |ss| self.get(mm, ss)))
            .collect()
    }
}

/// Per-galaxy quantities of one synthetic galaxy under one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedGalaxyRecord {
    /// Drawn log EW
    pub log_ew: f64,
    /// BB - NB excess, never negative
    pub excess: f64,
    pub nb: f64,
    pub bb: f64,
    pub selected: bool,
    pub properties: GalaxyProperties,
}

/// Everything derived for a base population under one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedPopulation {
    pub ew_seed: u64,
    pub log_ew_mean: f64,
    pub log_ew_sig: f64,
    /// Drawn log EW of every galaxy
    pub log_ew: Array1<f64>,
    /// True BB - NB excess
    pub excess: Array1<f64>,
    /// True broad-band magnitude
    pub bb: Array1<f64>,
    /// Broad-band magnitude error
    pub bb_sig: Array1<f64>,
    /// 3-sigma excess limit at the true narrow-band magnitude
    pub sig_limit: Array1<f64>,
    /// Selection of the noise-free photometry
    pub selected: Array1<bool>,
    /// Properties from the noise-free photometry, without mass scatter
    pub properties: DerivedProperties<ndarray::Ix1>,
}

impl DerivedPopulation {
    /// Draw equivalent widths from `seed` and derive the true photometry,
    /// selection and physical properties of every galaxy.
    pub fn generate(
        base: &BaseSyntheticPopulation,
        hypothesis: &EwHypothesis,
        seed: u64,
        table: &EwExcessTable,
        cut: &SelectionCut,
        model: &PropertyModel,
        cont_lim: f64,
    ) -> Self {
        let deviates = standard_normal_1d(base.ngal(), seed);
        let log_ew = deviates.mapv(|z| hypothesis.log_ew_mean + hypothesis.log_ew_sig * z);
        let excess = log_ew.mapv(|ew| table.excess(ew));

        let selection = cut.apply(&base.nb_ref, &excess);

        let bb = &base.nb_ref + &excess;
        let bb_sig = magnitude_errors(&bb, cont_lim, LIMIT_SIGMA);
        let properties = model.derive(&base.nb_ref, &bb, &excess);

        Self {
            ew_seed: seed,
            log_ew_mean: hypothesis.log_ew_mean,
            log_ew_sig: hypothesis.log_ew_sig,
            log_ew,
            excess,
            bb,
            bb_sig,
            sig_limit: selection.sig_limit,
            selected: selection.flags,
            properties,
        }
    }

    pub fn ngal(&self) -> usize {
        self.log_ew.len()
    }

    /// Whether this bundle was generated with the given seed for a population of `ngal`
    pub fn matches(&self, seed: u64, ngal: usize) -> bool {
        self.ew_seed == seed && self.ngal() == ngal
    }

    /// Gather galaxy `i` into a single record
    pub fn record(&self, base: &BaseSyntheticPopulation, i: usize) -> Option<DerivedGalaxyRecord> {
        let p = &self.properties;
        Some(DerivedGalaxyRecord {
            log_ew: *self.log_ew.get(i)?,
            excess: *self.excess.get(i)?,
            nb: *base.nb_ref.get(i)?,
            bb: *self.bb.get(i)?,
            selected: *self.selected.get(i)?,
            properties: GalaxyProperties {
                log_ew: p.log_ew[i],
                log_flux: p.log_flux[i],
                log_mass: p.log_mass[i],
                nii_ha: p.nii_ha[i],
                oh12: p.oh12[i],
                ha_flux: p.ha_flux[i],
                ha_lum: p.ha_lum[i],
                log_sfr: p.log_sfr[i],
            },
        })
    }
}

//! Survey filters and pipeline parameters.
//!
//! A [`PipelineConfig`] is built once at startup (from defaults or a JSON
//! file) and handed by reference to every stage of the pipeline.

use serde::{Deserialize, Serialize};
use shared::algo::arange;
use std::path::Path;
use thiserror::Error;

use crate::photometry::{halpha_redshift, mag_combine, Bandpass, FlatLambdaCdm};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Immutable parameters of one narrow-band filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter name, e.g. "NB816"
    pub name: String,
    /// Central wavelength (Angstrom)
    pub lambda_c: f64,
    /// Narrow-band width (Angstrom)
    pub d_nb: f64,
    /// Width of the continuum broad band (Angstrom)
    pub d_bb: f64,
    /// 3-sigma narrow-band limiting magnitude
    pub m_nb: f64,
    /// 3-sigma limit of the first continuum band
    pub m_bb1: f64,
    /// 3-sigma limit of the second continuum band, if the continuum is a blend
    pub m_bb2: Option<f64>,
    /// Weight of the first band in the continuum blend
    pub epsilon: f64,
    /// Minimum BB - NB excess for selection
    pub minthres: f64,
    /// Statistical filter-profile correction applied to line fluxes
    pub filt_corr: f64,
    /// Key of the magnitude-mass calibration for this filter
    pub mass_prefix: String,
    /// Continuum band label used in log output, e.g. "i/z"
    pub continuum: String,
    /// First log EW mean of the hypothesis grid
    pub logew_mean_start: f64,
    /// First log EW sigma of the hypothesis grid
    pub logew_sig_start: f64,
}

impl FilterConfig {
    /// Effective 3-sigma continuum limiting magnitude.
    pub fn cont_lim(&self) -> f64 {
        mag_combine(self.m_bb1, self.m_bb2, self.epsilon)
    }

    pub fn bandpass(&self) -> Bandpass {
        Bandpass {
            lambda_c: self.lambda_c,
            d_nb: self.d_nb,
            d_bb: self.d_bb,
        }
    }

    /// H-alpha redshift seen by this filter
    pub fn redshift(&self) -> f64 {
        halpha_redshift(self.lambda_c)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |what: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(format!("{}: {what}", self.name)))
        };

        if self.name.is_empty() {
            return Err(ConfigError::Invalid("filter name is empty".to_string()));
        }
        if !(self.lambda_c > 0.0 && self.d_nb > 0.0 && self.d_bb > 0.0) {
            return invalid("wavelength and bandwidths must be positive");
        }
        if self.d_nb >= self.d_bb {
            return invalid("narrow band must be narrower than the broad band");
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return invalid("epsilon must lie in [0, 1]");
        }
        if !(self.m_nb.is_finite() && self.cont_lim().is_finite()) {
            return invalid("limiting magnitudes must be finite");
        }
        if !(self.minthres >= 0.0 && self.filt_corr > 0.0) {
            return invalid("minthres must be >= 0 and filt_corr > 0");
        }
        Ok(())
    }
}

/// Shape of the (mean, sigma) log EW hypothesis grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub n_mean: usize,
    pub n_sigma: usize,
    /// Spacing of both axes (dex)
    pub step: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_mean: 4,
            n_sigma: 4,
            step: 0.1,
        }
    }
}

/// Narrow-band magnitude grid of the synthetic population.
///
/// The grid runs from `nb_min` in steps of `nb_bin` up to `m_nb - nb_bin`
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NbGridConfig {
    pub nb_min: f64,
    pub nb_bin: f64,
}

impl Default for NbGridConfig {
    fn default() -> Self {
        Self {
            nb_min: 20.0,
            nb_bin: 0.25,
        }
    }
}

impl NbGridConfig {
    pub fn grid(&self, m_nb: f64) -> Vec<f64> {
        let nb_max = m_nb - self.nb_bin;
        arange(self.nb_min, nb_max + self.nb_bin, self.nb_bin)
    }
}

/// Evenly stepped bin edges, stored as `arange(start, stop, step)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl BinSpec {
    pub const fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    pub fn edges(&self) -> Vec<f64> {
        arange(self.start, self.stop, self.step)
    }
}

/// Bin edges for the comparison histograms and completeness curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinsConfig {
    /// log EW (Angstrom)
    pub ew: BinSpec,
    /// log H-alpha flux (erg/s/cm^2)
    pub flux: BinSpec,
    /// log sSFR (1/yr)
    pub ssfr: BinSpec,
    /// log SFR (Msun/yr)
    pub sfr: BinSpec,
    /// log stellar mass (Msun) for the main-sequence dispersion
    pub mass: BinSpec,
}

impl Default for BinsConfig {
    fn default() -> Self {
        Self {
            ew: BinSpec::new(0.2, 3.0, 0.2),
            flux: BinSpec::new(-17.75, -14.75, 0.25),
            ssfr: BinSpec::new(-11.0, -6.0, 0.2),
            sfr: BinSpec::new(-4.0, 2.0, 0.2),
            mass: BinSpec::new(6.0, 10.5, 0.5),
        }
    }
}

/// Everything the completeness pipeline needs besides the input tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filters: Vec<FilterConfig>,
    pub grid: GridConfig,
    /// Number of modelled galaxies that sets the population normalization
    pub nsim: usize,
    /// Noisy realizations per modelled galaxy
    pub nmock: usize,
    pub nb_grid: NbGridConfig,
    pub bins: BinsConfig,
    pub cosmology: FlatLambdaCdm,
    /// Excess grid the EW-excess table is tabulated on
    pub excess_grid: BinSpec,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            grid: GridConfig::default(),
            nsim: 5000,
            nmock: 10,
            nb_grid: NbGridConfig::default(),
            bins: BinsConfig::default(),
            cosmology: FlatLambdaCdm::default(),
            excess_grid: BinSpec::new(0.01, 10.0, 0.01),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing fields take their default values.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filters.is_empty() {
            return Err(ConfigError::Invalid("no filters configured".to_string()));
        }
        for filter in &self.filters {
            filter.validate()?;
        }
        if self.grid.n_mean == 0 || self.grid.n_sigma == 0 {
            return Err(ConfigError::Invalid("EW grid must be non-empty".to_string()));
        }
        if self.nsim == 0 || self.nmock == 0 {
            return Err(ConfigError::Invalid("nsim and nmock must be positive".to_string()));
        }
        if !(self.nb_grid.nb_bin > 0.0) {
            return Err(ConfigError::Invalid("nb_bin must be positive".to_string()));
        }
        for (name, spec) in [
            ("ew", self.bins.ew),
            ("flux", self.bins.flux),
            ("ssfr", self.bins.ssfr),
            ("sfr", self.bins.sfr),
            ("mass", self.bins.mass),
            ("excess_grid", self.excess_grid),
        ] {
            if spec.edges().len() < 2 {
                return Err(ConfigError::Invalid(format!(
                    "{name} bins need at least two edges"
                )));
            }
        }
        Ok(())
    }

    /// Look up a filter by name
    pub fn filter(&self, name: &str) -> Option<&FilterConfig> {
        self.filters.iter().find(|f| f.name == name)
    }
}

/// Subaru Deep Field NB704, NB711, NB816, NB921 and NB973.
pub fn default_filters() -> Vec<FilterConfig> {
    struct Row {
        name: &'static str,
        lambda_c: f64,
        d_nb: f64,
        d_bb: f64,
        m_nb: f64,
        m_bb1: f64,
        m_bb2: Option<f64>,
        epsilon: f64,
        minthres: f64,
        filt_corr: f64,
        mass_prefix: &'static str,
        continuum: &'static str,
        mean: f64,
        sig: f64,
    }

    let rows = [
        Row {
            name: "NB704",
            lambda_c: 7046.0,
            d_nb: 100.0,
            d_bb: 1110.0,
            m_nb: 26.7134 - 0.047,
            m_bb1: 28.0829,
            m_bb2: Some(27.7568),
            epsilon: 0.5,
            minthres: 0.15,
            filt_corr: 1.289439104,
            mass_prefix: "Ha-NB7",
            continuum: "R/i",
            mean: 1.25,
            sig: 0.15,
        },
        Row {
            name: "NB711",
            lambda_c: 7111.0,
            d_nb: 72.0,
            d_bb: 1110.0,
            m_nb: 26.0684,
            m_bb1: 28.0829,
            m_bb2: Some(27.7568),
            epsilon: 0.5,
            minthres: 0.15,
            filt_corr: 1.41022358406,
            mass_prefix: "Ha-NB7",
            continuum: "R/i",
            mean: 1.25,
            sig: 0.55,
        },
        Row {
            name: "NB816",
            lambda_c: 8150.0,
            d_nb: 120.0,
            d_bb: 1419.0,
            m_nb: 26.9016 + 0.057,
            m_bb1: 27.7568,
            m_bb2: Some(26.8250),
            epsilon: 0.6,
            minthres: 0.15,
            filt_corr: 1.29344789854,
            mass_prefix: "Ha-NB816",
            continuum: "i/z",
            mean: 1.25,
            sig: 0.25,
        },
        Row {
            name: "NB921",
            lambda_c: 9196.0,
            d_nb: 132.0,
            d_bb: 956.0,
            m_nb: 26.7088 - 0.109,
            m_bb1: 26.8250,
            m_bb2: None,
            epsilon: 1.0,
            minthres: 0.2,
            filt_corr: 1.32817034288,
            mass_prefix: "Ha-NB921",
            continuum: "z",
            mean: 1.25,
            sig: 0.35,
        },
        Row {
            name: "NB973",
            lambda_c: 9755.0,
            d_nb: 200.0,
            d_bb: 956.0,
            m_nb: 25.6917 - 0.051,
            m_bb1: 26.8250,
            m_bb2: None,
            epsilon: 1.0,
            minthres: 0.25,
            filt_corr: 1.29673596942,
            mass_prefix: "Ha-NB973",
            continuum: "z",
            mean: 0.90,
            sig: 0.55,
        },
    ];

    rows.into_iter()
        .map(|r| FilterConfig {
            name: r.name.to_string(),
            lambda_c: r.lambda_c,
            d_nb: r.d_nb,
            d_bb: r.d_bb,
            m_nb: r.m_nb,
            m_bb1: r.m_bb1,
            m_bb2: r.m_bb2,
            epsilon: r.epsilon,
            minthres: r.minthres,
            filt_corr: r.filt_corr,
            mass_prefix: r.mass_prefix.to_string(),
            continuum: r.continuum.to_string(),
            logew_mean_start: r.mean,
            logew_sig_start: r.sig,
        })
        .collect()
}

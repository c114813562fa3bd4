//! CSV output tables.
//!
//! Debug runs append `.debug` to every file stem so they never replace the
//! products of a full run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aggregate::{MainSequenceDispersion, WeightedDispersion};

/// Written in place of a chi-square that could not be computed
pub const UNAVAILABLE: &str = "unavailable";

/// `<stem>.csv`, or `<stem>.debug.csv` for a debug run
pub fn output_name(stem: &str, debug: bool) -> String {
    if debug {
        format!("{stem}.debug.csv")
    } else {
        format!("{stem}.csv")
    }
}

const HEADERS: [&str; 8] = [
    "log_EWmean",
    "log_EWsig",
    "comp_50_sSFR",
    "comp_50_SFR",
    "comp_50_flux",
    "chi2_EW",
    "chi2_flux",
    "chi2_comb",
];

/// Results of one grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletenessRow {
    pub log_ew_mean: f64,
    pub log_ew_sig: f64,
    pub comp_50_ssfr: f64,
    pub comp_50_sfr: f64,
    pub comp_50_flux: f64,
    pub chi2_ew: Option<f64>,
    pub chi2_flux: Option<f64>,
    pub chi2_comb: Option<f64>,
}

fn chi2_field(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.4}"),
        None => UNAVAILABLE.to_string(),
    }
}

impl CompletenessRow {
    fn csv_fields(&self) -> String {
        format!(
            "{:.2},{:.2},{:.4},{:.4},{:.4},{},{},{}",
            self.log_ew_mean,
            self.log_ew_sig,
            self.comp_50_ssfr,
            self.comp_50_sfr,
            self.comp_50_flux,
            chi2_field(self.chi2_ew),
            chi2_field(self.chi2_flux),
            chi2_field(self.chi2_comb),
        )
    }
}

/// Grid results of one filter in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessTable {
    pub filter: String,
    pub rows: Vec<CompletenessRow>,
}

impl CompletenessTable {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            rows: Vec::new(),
        }
    }

    /// `<filter>_completeness_50.csv`
    pub fn file_name(&self, debug: bool) -> String {
        output_name(&format!("{}_completeness_50", self.filter), debug)
    }

    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "{}", HEADERS.join(","))?;
        for row in &self.rows {
            writeln!(file, "{}", row.csv_fields())?;
        }
        file.flush()
    }
}

/// Best-fit row of every completed filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestFitTable {
    pub rows: Vec<(String, CompletenessRow)>,
}

impl BestFitTable {
    pub fn file_name(debug: bool) -> String {
        output_name("best_fit_completeness_50", debug)
    }

    pub fn push(&mut self, filter: impl Into<String>, row: CompletenessRow) {
        self.rows.push((filter.into(), row));
    }

    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "filter,{}", HEADERS.join(","))?;
        for (filter, row) in &self.rows {
            writeln!(file, "{},{}", filter, row.csv_fields())?;
        }
        file.flush()
    }
}

/// Main-sequence dispersion of one filter at its best-fit grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionTable {
    pub filter: String,
    pub dispersion: MainSequenceDispersion,
    /// Observed galaxies per mass bin
    pub observed: Vec<f64>,
}

impl DispersionTable {
    /// `<filter>_sfr_dispersion.csv`
    pub fn file_name(&self, debug: bool) -> String {
        output_name(&format!("{}_sfr_dispersion", self.filter), debug)
    }

    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(
            file,
            "log_mstar,n_full,sigma_full,n_sel,sigma_sel,n_obs,above_cutoff"
        )?;
        let cutoff = self.dispersion.low_mass_cutoff;
        for (bin, n_obs) in self.dispersion.bins.iter().zip(&self.observed) {
            writeln!(
                file,
                "{:.2},{},{:.4},{},{:.4},{},{}",
                bin.center,
                bin.n_full,
                bin.sigma_full,
                bin.n_selected,
                bin.sigma_selected,
                n_obs,
                bin.center >= cutoff,
            )?;
        }
        file.flush()
    }
}

/// Dispersion combined over every completed filter.
pub fn write_weighted_dispersion(
    path: &Path,
    combined: &WeightedDispersion,
) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "log_mstar,sigma_full,sigma_sel,n_obs")?;
    for (i, center) in combined.centers.iter().enumerate() {
        writeln!(
            file,
            "{:.2},{:.4},{:.4},{}",
            center,
            combined.sigma_full[i],
            combined.sigma_selected[i],
            combined.weight[i],
        )?;
    }
    file.flush()
}

/// File stem of [`write_weighted_dispersion`] output
pub const WEIGHTED_DISPERSION_STEM: &str = "weighted_sfr_dispersion";

//! Loaders for the calibration tables and real samples under an input directory.
//!
//! Layout:
//!
//! ```text
//! <input>/number_counts.json          { "<filter>": { "mag": [..], "n_norm": [..] }, .. }
//! <input>/mag_vs_mass_<prefix>.json   { "cont_arr": [..], "avg_log_m": [..], .. }
//! <input>/ew_flux_<filter>.json       { "nb_ew": [..], "ha_flux": [..], .. }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::population::NumberCounts;
use crate::properties::MassTable;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("missing input file {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: no entry for filter {filter}")]
    MissingFilter { path: PathBuf, filter: String },
    #[error("{path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Observed sample of one filter.
///
/// Only `nb_ew` (log EW) and `ha_flux` (log H-alpha flux) feed the model
/// comparison; the other columns are carried for downstream consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedSample {
    pub nb_ew: Vec<f64>,
    pub ha_flux: Vec<f64>,
    #[serde(default)]
    pub nb_mag: Vec<f64>,
    #[serde(default)]
    pub cont_mag: Vec<f64>,
    #[serde(default)]
    pub log_mstar: Vec<f64>,
    #[serde(default)]
    pub ha_sfr: Vec<f64>,
    #[serde(default)]
    pub ha_lum: Vec<f64>,
    #[serde(default)]
    pub spec_flag: Vec<bool>,
}

impl ObservedSample {
    pub fn len(&self) -> usize {
        self.nb_ew.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nb_ew.is_empty()
    }

    /// Spectroscopically confirmed objects
    pub fn spec_confirmed(&self) -> usize {
        self.spec_flag.iter().filter(|&&f| f).count()
    }
}

/// Input file locations relative to one directory.
#[derive(Debug, Clone)]
pub struct CalibrationSource {
    root_path: PathBuf,
}

impl CalibrationSource {
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn number_counts_path(&self) -> PathBuf {
        self.root_path.join("number_counts.json")
    }

    pub fn mass_table_path(&self, prefix: &str) -> PathBuf {
        self.root_path.join(format!("mag_vs_mass_{prefix}.json"))
    }

    pub fn sample_path(&self, filter: &str) -> PathBuf {
        self.root_path.join(format!("ew_flux_{filter}.json"))
    }

    /// Normalized number counts of `filter`.
    pub fn number_counts(&self, filter: &str) -> Result<NumberCounts, CalibrationError> {
        let path = self.number_counts_path();
        let mut all: BTreeMap<String, NumberCounts> = read_json(&path)?;
        let counts = all
            .remove(filter)
            .ok_or_else(|| CalibrationError::MissingFilter {
                path: path.clone(),
                filter: filter.to_string(),
            })?;

        if counts.mag.len() != counts.n_norm.len() || counts.mag.len() < 2 {
            return Err(CalibrationError::Invalid {
                path,
                reason: format!("{filter}: need matching mag/n_norm with at least two entries"),
            });
        }
        Ok(counts)
    }

    pub fn mass_table(&self, prefix: &str) -> Result<MassTable, CalibrationError> {
        let path = self.mass_table_path(prefix);
        let table: MassTable = read_json(&path)?;
        let n = table.cont_arr.len();
        if n < 2
            || table.avg_log_m.len() != n
            || table.std_log_m.len() != n
            || table.n_log_m.len() != n
        {
            return Err(CalibrationError::Invalid {
                path,
                reason: "mass table columns must match and hold at least two bins".to_string(),
            });
        }
        Ok(table)
    }

    pub fn observed_sample(&self, filter: &str) -> Result<ObservedSample, CalibrationError> {
        let path = self.sample_path(filter);
        let sample: ObservedSample = read_json(&path)?;
        if sample.nb_ew.len() != sample.ha_flux.len() {
            return Err(CalibrationError::Invalid {
                path,
                reason: "nb_ew and ha_flux lengths differ".to_string(),
            });
        }
        Ok(sample)
    }
}

/// Parse a JSON document, reporting a missing file distinctly.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CalibrationError> {
    if !path.exists() {
        return Err(CalibrationError::Missing(path.to_path_buf()));
    }
    let json = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| CalibrationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CalibrationError> {
    let io_err = |source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| CalibrationError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = CalibrationSource::with_path(dir.path().to_path_buf());
        match source.mass_table("Ha-NB816") {
            Err(CalibrationError::Missing(path)) => {
                assert!(path.ends_with("mag_vs_mass_Ha-NB816.json"))
            }
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn test_number_counts_by_filter() {
        let dir = TempDir::new().unwrap();
        let source = CalibrationSource::with_path(dir.path().to_path_buf());

        let mut all = BTreeMap::new();
        all.insert(
            "NB921".to_string(),
            NumberCounts {
                mag: vec![20.0, 20.25, 20.5],
                n_norm: vec![0.1, 0.2, 0.3],
            },
        );
        write_json(&source.number_counts_path(), &all).unwrap();

        let counts = source.number_counts("NB921").unwrap();
        assert_eq!(counts.mag.len(), 3);
        assert!(matches!(
            source.number_counts("NB973"),
            Err(CalibrationError::MissingFilter { .. })
        ));
    }

    #[test]
    fn test_sample_optional_columns() {
        let dir = TempDir::new().unwrap();
        let source = CalibrationSource::with_path(dir.path().to_path_buf());
        std::fs::write(
            source.sample_path("NB704"),
            r#"{ "nb_ew": [1.2, 1.5], "ha_flux": [-16.1, -15.8], "spec_flag": [true, false] }"#,
        )
        .unwrap();

        let sample = source.observed_sample("NB704").unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample.log_mstar.is_empty());
        assert_eq!(sample.spec_confirmed(), 1);
    }

    #[test]
    fn test_malformed_inputs() {
        let dir = TempDir::new().unwrap();
        let source = CalibrationSource::with_path(dir.path().to_path_buf());

        std::fs::write(source.sample_path("NB711"), "{ not json").unwrap();
        assert!(matches!(
            source.observed_sample("NB711"),
            Err(CalibrationError::Parse { .. })
        ));

        std::fs::write(
            source.mass_table_path("Ha-NB7"),
            r#"{ "cont_arr": [22.0, 22.4], "avg_log_m": [10.0], "std_log_m": [0.2, 0.2], "n_log_m": [3, 3] }"#,
        )
        .unwrap();
        assert!(matches!(
            source.mass_table("Ha-NB7"),
            Err(CalibrationError::Invalid { .. })
        ));
    }
}

//! On-disk cache of synthetic populations.
//!
//! One binary bundle per filter holds the base population and one per
//! (filter, mean, sigma) holds the derived population. Bundles are written
//! to a temporary file and renamed into place, so a reader sees either the
//! previous bundle or the complete new one.

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::population::{BaseSyntheticPopulation, DerivedPopulation};

/// Decimals a grid value may need in a bundle name
const KEY_MAX_DECIMALS: usize = 6;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::error::EncodeError,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::error::DecodeError,
    },
    #[error("trailing bytes in {path}")]
    TrailingBytes { path: PathBuf },
}

/// Write `value` to `path` through a sibling temporary file.
pub fn write_bundle<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(
        |source| CacheError::Encode {
            path: path.to_path_buf(),
            source,
        },
    )?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path).map_err(io_err)?;
    file.write_all(&bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(io_err)
}

/// Read a bundle written by [`write_bundle`].
pub fn read_bundle<T: DeserializeOwned>(path: &Path) -> Result<T, CacheError> {
    let bytes = std::fs::read(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (value, read) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|source| CacheError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    if read != bytes.len() {
        return Err(CacheError::TrailingBytes {
            path: path.to_path_buf(),
        });
    }
    Ok(value)
}

/// `value` with two decimals, or more when two would round it.
fn key_component(value: f64) -> String {
    let decimals = (2..KEY_MAX_DECIMALS)
        .find(|&d| {
            let scale = 10f64.powi(d as i32);
            ((value * scale).round() / scale - value).abs() < 1e-9
        })
        .unwrap_or(KEY_MAX_DECIMALS);
    format!("{value:.decimals$}")
}

/// Population cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root_path: PathBuf,
}

impl CacheStore {
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Base population bundle of a filter
    pub fn base_path(&self, filter: &str) -> PathBuf {
        self.root_path.join(format!("{filter}_init.bin"))
    }

    /// Derived population bundle of one grid point
    pub fn hypothesis_path(&self, filter: &str, log_ew_mean: f64, log_ew_sig: f64) -> PathBuf {
        let mean = key_component(log_ew_mean);
        let sig = key_component(log_ew_sig);
        self.root_path.join(format!("{filter}_{mean}_{sig}.bin"))
    }

    /// Cached base population of `filter`.
    ///
    /// Returns None if nothing is cached.
    /// Returns Some(Err) if the bundle exists but cannot be read.
    pub fn get_base(&self, filter: &str) -> Option<Result<BaseSyntheticPopulation, CacheError>> {
        Self::get(&self.base_path(filter))
    }

    pub fn save_base(
        &self,
        filter: &str,
        base: &BaseSyntheticPopulation,
    ) -> Result<PathBuf, CacheError> {
        self.save(self.base_path(filter), base)
    }

    /// Cached derived population of one grid point, same contract as [`Self::get_base`]
    pub fn get_derived(
        &self,
        filter: &str,
        log_ew_mean: f64,
        log_ew_sig: f64,
    ) -> Option<Result<DerivedPopulation, CacheError>> {
        Self::get(&self.hypothesis_path(filter, log_ew_mean, log_ew_sig))
    }

    pub fn save_derived(
        &self,
        filter: &str,
        derived: &DerivedPopulation,
    ) -> Result<PathBuf, CacheError> {
        let path = self.hypothesis_path(filter, derived.log_ew_mean, derived.log_ew_sig);
        self.save(path, derived)
    }

    fn get<T: DeserializeOwned>(path: &Path) -> Option<Result<T, CacheError>> {
        if !path.exists() {
            return None;
        }
        info!("File found : {}", path.display());
        Some(read_bundle(path))
    }

    fn save<T: Serialize>(&self, path: PathBuf, value: &T) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(&self.root_path).map_err(|source| CacheError::Io {
            path: self.root_path.clone(),
            source,
        })?;

        if path.exists() {
            info!("Overwriting : {}", path.display());
        } else {
            info!("Writing : {}", path.display());
        }
        write_bundle(&path, value)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::DerivedProperties;
    use ndarray::{array, Array1};
    use tempfile::TempDir;

    fn base() -> BaseSyntheticPopulation {
        BaseSyntheticPopulation {
            nsim: 10,
            nb_grid: vec![20.0, 20.25],
            n_mag_mock: vec![1.2, 0.8],
            ndist: vec![1, 1],
            nb_ref: array![20.0, 20.25],
            nb_sig_ref: array![0.01, f64::NAN],
        }
    }

    #[test]
    fn test_paths() {
        let store = CacheStore::with_path(PathBuf::from("/tmp/cache"));
        assert_eq!(
            store.base_path("NB816"),
            PathBuf::from("/tmp/cache/NB816_init.bin")
        );
        assert_eq!(
            store.hypothesis_path("NB816", 1.35, 0.25),
            PathBuf::from("/tmp/cache/NB816_1.35_0.25.bin")
        );
        // Grid arithmetic noise does not leak into the name
        assert_eq!(
            store.hypothesis_path("NB816", 1.0 + 0.1, 0.2 + 0.1),
            PathBuf::from("/tmp/cache/NB816_1.10_0.30.bin")
        );
    }

    #[test]
    fn test_fine_grid_keys_stay_distinct() {
        let store = CacheStore::with_path(PathBuf::from("/tmp/cache"));
        let a = store.hypothesis_path("NB921", 1.0, 0.3);
        let b = store.hypothesis_path("NB921", 1.005, 0.3);
        assert_ne!(a, b);
        assert!(b.ends_with("NB921_1.005_0.30.bin"));
    }

    #[test]
    fn test_missing_bundle_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::with_path(dir.path().to_path_buf());
        assert!(store.get_base("NB704").is_none());
        assert!(store.get_derived("NB704", 1.0, 0.5).is_none());
    }

    #[test]
    fn test_base_round_trip_keeps_nan() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::with_path(dir.path().join("nested"));
        let path = store.save_base("NB921", &base()).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("bin.tmp").exists());

        let loaded = store.get_base("NB921").unwrap().unwrap();
        assert_eq!(loaded.nb_grid, base().nb_grid);
        assert_eq!(loaded.nb_ref, base().nb_ref);
        assert!(loaded.nb_sig_ref[1].is_nan());

        // Overwrite in place
        let mut other = base();
        other.nsim = 20;
        store.save_base("NB921", &other).unwrap();
        assert_eq!(store.get_base("NB921").unwrap().unwrap().nsim, 20);
    }

    fn derived() -> DerivedPopulation {
        let values = array![1.2, f64::NAN, f64::NEG_INFINITY];
        DerivedPopulation {
            ew_seed: 3005,
            log_ew_mean: 1.2,
            log_ew_sig: 0.35,
            log_ew: values.clone(),
            excess: array![0.4, 0.0, 0.0],
            bb: array![22.4, 25.0, 26.0],
            bb_sig: array![0.02, 0.3, f64::NAN],
            sig_limit: array![0.1, f64::INFINITY, 2.5],
            selected: array![true, false, false],
            properties: DerivedProperties {
                log_ew: values.clone(),
                log_flux: values.mapv(|v| v - 18.0),
                log_mass: array![9.1, 8.2, f64::NAN],
                nii_ha: array![0.2, 0.1, f64::NAN],
                oh12: array![8.7, 8.5, f64::NAN],
                ha_flux: values.mapv(|v| v - 18.1),
                ha_lum: values.mapv(|v| v + 40.0),
                log_sfr: values.mapv(|v| v - 1.0),
            },
        }
    }

    fn assert_same_bits(a: &Array1<f64>, b: &Array1<f64>) {
        let bits = |x: &Array1<f64>| x.iter().map(|v| v.to_bits()).collect::<Vec<u64>>();
        assert_eq!(bits(a), bits(b));
    }

    #[test]
    fn test_derived_round_trip_is_bit_exact() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::with_path(dir.path().to_path_buf());
        let original = derived();
        let path = store.save_derived("NB816", &original).unwrap();
        assert!(path.ends_with("NB816_1.20_0.35.bin"));

        let loaded = store.get_derived("NB816", 1.2, 0.35).unwrap().unwrap();
        assert_eq!(loaded.ew_seed, original.ew_seed);
        assert_eq!(loaded.log_ew_mean, original.log_ew_mean);
        assert_eq!(loaded.log_ew_sig, original.log_ew_sig);
        assert_eq!(loaded.selected, original.selected);
        for (a, b) in [
            (&loaded.log_ew, &original.log_ew),
            (&loaded.excess, &original.excess),
            (&loaded.bb, &original.bb),
            (&loaded.bb_sig, &original.bb_sig),
            (&loaded.sig_limit, &original.sig_limit),
        ] {
            assert_same_bits(a, b);
        }
        let (p, q) = (&loaded.properties, &original.properties);
        for (a, b) in [
            (&p.log_ew, &q.log_ew),
            (&p.log_flux, &q.log_flux),
            (&p.log_mass, &q.log_mass),
            (&p.nii_ha, &q.nii_ha),
            (&p.oh12, &q.oh12),
            (&p.ha_flux, &q.ha_flux),
            (&p.ha_lum, &q.ha_lum),
            (&p.log_sfr, &q.log_sfr),
        ] {
            assert_same_bits(a, b);
        }

        // A reload is only reused for the same seed and population size
        assert!(loaded.matches(3005, 3));
        assert!(!loaded.matches(3006, 3));
        assert!(!loaded.matches(3005, 4));
    }

    #[test]
    fn test_corrupt_bundle_is_error() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::with_path(dir.path().to_path_buf());
        std::fs::write(store.base_path("NB973"), b"not a bundle").unwrap();
        assert!(store.get_base("NB973").unwrap().is_err());
    }
}

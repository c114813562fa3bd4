//! Flat Lambda-CDM distances.

use serde::{Deserialize, Serialize};

/// Speed of light in km/s
pub const C_KM_PER_S: f64 = 299_792.458;

/// One megaparsec in centimeters
pub const MPC_IN_CM: f64 = 3.085_677_581_491_367_3e24;

/// Rest wavelength of H-alpha in Angstrom
pub const HA_REST_WAVELENGTH: f64 = 6562.8;

/// Simpson intervals used for the comoving distance integral (even)
const INTEGRATION_STEPS: usize = 2000;

/// Flat cosmology without radiation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatLambdaCdm {
    /// Hubble constant in km/s/Mpc
    pub h0: f64,
    /// Matter density today
    pub om0: f64,
}

impl Default for FlatLambdaCdm {
    fn default() -> Self {
        Self { h0: 70.0, om0: 0.3 }
    }
}

impl FlatLambdaCdm {
    /// Dimensionless Hubble parameter E(z)
    fn efunc(&self, z: f64) -> f64 {
        (self.om0 * (1.0 + z).powi(3) + (1.0 - self.om0)).sqrt()
    }

    /// Hubble distance c/H0 in Mpc
    pub fn hubble_distance_mpc(&self) -> f64 {
        C_KM_PER_S / self.h0
    }

    /// Line-of-sight comoving distance in Mpc.
    pub fn comoving_distance_mpc(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        let h = z / INTEGRATION_STEPS as f64;
        let mut sum = 1.0 / self.efunc(0.0) + 1.0 / self.efunc(z);
        for i in 1..INTEGRATION_STEPS {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight / self.efunc(i as f64 * h);
        }
        self.hubble_distance_mpc() * sum * h / 3.0
    }

    pub fn luminosity_distance_mpc(&self, z: f64) -> f64 {
        (1.0 + z) * self.comoving_distance_mpc(z)
    }

    pub fn luminosity_distance_cm(&self, z: f64) -> f64 {
        self.luminosity_distance_mpc(z) * MPC_IN_CM
    }
}

/// Redshift at which H-alpha lands at `lambda_c` (Angstrom).
pub fn halpha_redshift(lambda_c: f64) -> f64 {
    lambda_c / HA_REST_WAVELENGTH - 1.0
}

//! AB magnitude noise model and the narrow-band color-excess cut.
//!
//! All limiting magnitudes are 3-sigma limits. A `sigma` argument rescales
//! them to another significance level.

use ndarray::{Array, Dimension};

/// AB magnitude zero point: m = -2.5 log10(f_nu) - 48.6 with f_nu in erg/s/cm^2/Hz
pub const AB_ZERO_POINT: f64 = 48.6;

/// Significance the survey limiting magnitudes are quoted at.
pub const LIMIT_SIGMA: f64 = 3.0;

/// Photometric error of an object of magnitude `x` given a limiting magnitude.
///
/// The signal-to-noise at the limit is `sigma`, so SNR = sigma 10^(-0.4 (x - lim))
/// and dmag = 2.5 log10(1 + 1/SNR). Faint objects get arbitrarily large
/// errors; non-finite inputs pass straight through.
pub fn magnitude_error(x: f64, lim: f64, sigma: f64) -> f64 {
    let snr = sigma * 10f64.powf(-0.4 * (x - lim));
    2.5 * (1.0 + 1.0 / snr).log10()
}

/// [`magnitude_error`] applied elementwise.
pub fn magnitude_errors<D: Dimension>(x: &Array<f64, D>, lim: f64, sigma: f64) -> Array<f64, D> {
    x.mapv(|m| magnitude_error(m, lim, sigma))
}

/// Flux density (per Hz, AB) of an object with magnitude `m`.
#[inline]
pub fn ab_flux(m: f64) -> f64 {
    10f64.powf(-0.4 * (AB_ZERO_POINT + m))
}

/// Minimum broad-band minus narrow-band excess detectable at `sigma` for an
/// object of narrow-band magnitude `x`.
///
/// `lim1` and `lim2` are the 3-sigma narrow-band and continuum limits. Their
/// flux thresholds add in quadrature:
///
/// val = mean - 2.5 log10(1 - sqrt(f1^2 + f2^2) / f)
///
/// Objects fainter than the combined noise floor give NaN, which callers
/// treat as "not selectable".
pub fn color_cut(x: f64, lim1: f64, lim2: f64, mean: f64, sigma: f64) -> f64 {
    let f1 = (sigma / LIMIT_SIGMA) * ab_flux(lim1);
    let f2 = (sigma / LIMIT_SIGMA) * ab_flux(lim2);
    let f = ab_flux(x);

    mean - 2.5 * (1.0 - (f1 * f1 + f2 * f2).sqrt() / f).log10()
}

/// Narrow-band magnitude where the `sigma` color cut rises to `minthres`.
///
/// Brighter than this break the fixed excess threshold dominates the
/// selection; fainter, the noise-driven cut does. Solved in closed form from
/// [`color_cut`] with zero mean.
pub fn selection_break(lim1: f64, lim2: f64, minthres: f64, sigma: f64) -> f64 {
    let scale = sigma / LIMIT_SIGMA;
    let noise = scale * (10f64.powf(-0.8 * lim1) + 10f64.powf(-0.8 * lim2)).sqrt();
    let ratio = 1.0 - 10f64.powf(-0.4 * minthres);
    -2.5 * (noise / ratio).log10()
}

/// Effective continuum limit of a pair of broad bands.
///
/// The limiting fluxes are weighted by `epsilon` and `1 - epsilon` and summed
/// in quadrature. A single band is returned unchanged.
pub fn mag_combine(m1: f64, m2: Option<f64>, epsilon: f64) -> f64 {
    let Some(m2) = m2 else {
        return m1;
    };
    let f1 = epsilon * 10f64.powf(-0.4 * m1);
    let f2 = (1.0 - epsilon) * 10f64.powf(-0.4 * m2);
    -2.5 * (f1 * f1 + f2 * f2).sqrt().log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_error_at_limit() {
        // SNR equals sigma exactly at the limiting magnitude
        let dmag = magnitude_error(26.0, 26.0, 3.0);
        assert_relative_eq!(dmag, 2.5 * (1.0 + 1.0 / 3.0_f64).log10(), epsilon = 1e-14);

        let dmag5 = magnitude_error(25.0, 25.0, 5.0);
        assert_relative_eq!(dmag5, 2.5 * 1.2_f64.log10(), epsilon = 1e-14);
    }

    #[test]
    fn test_error_grows_without_bound() {
        let bright = magnitude_error(20.0, 26.0, 3.0);
        let faint = magnitude_error(36.0, 26.0, 3.0);
        assert!(bright < 0.01);
        assert!(faint > 8.0);
        assert!(faint.is_finite());
    }

    #[test]
    fn test_error_passes_nan() {
        assert!(magnitude_error(f64::NAN, 26.0, 3.0).is_nan());
        let errs = magnitude_errors(&array![24.0, f64::NAN], 26.0, 3.0);
        assert!(errs[0].is_finite());
        assert!(errs[1].is_nan());
    }

    #[test]
    fn test_color_cut_bright_object_near_zero() {
        let val = color_cut(20.0, 26.0, 27.0, 0.0, 3.0);
        assert!(val > 0.0 && val < 0.01, "val {val}");
    }

    #[test]
    fn test_color_cut_rises_toward_limit() {
        let bright = color_cut(23.0, 26.0, 27.0, 0.0, 3.0);
        let faint = color_cut(25.5, 26.0, 27.0, 0.0, 3.0);
        assert!(faint > bright);
    }

    #[test]
    fn test_color_cut_undefined_below_noise_floor() {
        // Fainter than the quadrature noise floor the log argument is negative
        assert!(color_cut(27.0, 26.0, 27.0, 0.0, 3.0).is_nan());
    }

    #[test]
    fn test_color_cut_mean_offset() {
        let base = color_cut(24.0, 26.0, 27.0, 0.0, 3.0);
        let shifted = color_cut(24.0, 26.0, 27.0, 0.1, 3.0);
        assert_relative_eq!(shifted - base, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_selection_break_matches_color_cut() {
        let (lim1, lim2, minthres) = (26.0, 27.0, 0.15);
        let nb_break = selection_break(lim1, lim2, minthres, 3.0);
        assert!(nb_break < lim1);
        assert_relative_eq!(
            color_cut(nb_break, lim1, lim2, 0.0, 3.0),
            minthres,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_mag_combine() {
        assert_eq!(mag_combine(27.5, None, 0.5), 27.5);
        assert_relative_eq!(mag_combine(27.5, Some(26.0), 1.0), 27.5, epsilon = 1e-12);

        // Equal bands, equal weights: flux 0.5*sqrt(2) of one band
        let m = mag_combine(27.0, Some(27.0), 0.5);
        assert_relative_eq!(m, 27.0 - 2.5 * (0.5 * 2f64.sqrt()).log10(), epsilon = 1e-12);
    }
}

//! Goodness of fit between mock and observed distributions.

use ndarray::{Array2, Zip};
use viz::histogram::Histogram;

/// Fewest bins with both model and data for a usable statistic
pub const MIN_USABLE_BINS: usize = 3;
/// Fitted parameters subtracted from the degrees of freedom
const FIT_PARAMETERS: usize = 2;

/// Reduced chi-square between model counts `ng` and observed counts `no`.
///
/// Only bins where both are non-zero count. Each contributes
/// `(Ng - No)^2 / (Ng + No)` and the sum is divided by the usable bins
/// minus two. `None` when fewer than [`MIN_USABLE_BINS`] bins are usable.
pub fn reduced_chi2(ng: &[f64], no: &[f64]) -> Option<f64> {
    let terms: Vec<f64> = ng
        .iter()
        .zip(no)
        .filter(|(&g, &o)| g != 0.0 && o != 0.0)
        .map(|(&g, &o)| (g - o).powi(2) / (g + o))
        .collect();

    if terms.len() < MIN_USABLE_BINS {
        return None;
    }
    Some(terms.iter().sum::<f64>() / (terms.len() - FIT_PARAMETERS) as f64)
}

/// Observed and normalized model histograms of one quantity.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub observed: Histogram,
    pub model: Histogram,
    /// Selected mock entries behind `model`
    pub n_selected: usize,
}

impl Comparison {
    /// Histogram the observed sample and the selected mock entries.
    ///
    /// Each selected entry is weighted so the model total equals the number
    /// of observed objects.
    pub fn new(
        observed: &[f64],
        mock_values: &Array2<f64>,
        flags: &Array2<bool>,
        edges: &[f64],
    ) -> viz::Result<Self> {
        let mut obs = Histogram::new(edges.to_vec())?;
        obs.add_all(observed.iter().copied());

        let n_selected = flags.iter().filter(|&&f| f).count();
        let mut model = Histogram::new(edges.to_vec())?;
        if n_selected > 0 {
            let weight = observed.len() as f64 / n_selected as f64;
            Zip::from(mock_values).and(flags).for_each(|&v, &f| {
                if f {
                    model.add_weighted(v, weight);
                }
            });
        }

        Ok(Self {
            observed: obs,
            model,
            n_selected,
        })
    }

    /// Reduced chi-square; `None` with no selected mocks or too few usable bins
    pub fn chi2(&self) -> Option<f64> {
        if self.n_selected == 0 {
            return None;
        }
        reduced_chi2(self.model.counts(), self.observed.counts())
    }
}

/// Equal-weight combination of the EW and flux statistics.
pub fn combined_chi2(ew: Option<f64>, flux: Option<f64>) -> Option<f64> {
    Some((ew? * ew? / 2.0 + flux? * flux? / 2.0).sqrt())
}

/// Grid position of the smallest available value in a row-major grid with
/// `n_cols` columns. Ties go to the first position.
pub fn best_fit(values: &[Option<f64>], n_cols: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, value) in values.iter().enumerate() {
        let Some(v) = *value else { continue };
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v < b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| (i / n_cols.max(1), i % n_cols.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_reduced_chi2_skips_empty_bins() {
        let ng = [10.0, 0.0, 5.0, 8.0, 3.0];
        let no = [12.0, 4.0, 5.0, 6.0, 0.0];
        // Usable bins: 0, 2, 3
        let expected = (4.0 / 22.0 + 0.0 + 4.0 / 14.0) / 1.0;
        assert_relative_eq!(reduced_chi2(&ng, &no).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_reduced_chi2_needs_three_bins() {
        assert!(reduced_chi2(&[1.0, 2.0, 0.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(reduced_chi2(&[], &[]).is_none());
    }

    #[test]
    fn test_identical_distributions_give_zero() {
        let counts = [3.0, 7.0, 2.0, 9.0];
        assert_eq!(reduced_chi2(&counts, &counts), Some(0.0));
    }

    #[test]
    fn test_combined() {
        assert_relative_eq!(combined_chi2(Some(3.0), Some(4.0)).unwrap(), 12.5f64.sqrt());
        assert!(combined_chi2(None, Some(1.0)).is_none());
        assert!(combined_chi2(Some(1.0), None).is_none());
    }

    #[test]
    fn test_best_fit_row_major_first_wins() {
        let values = [Some(3.0), None, Some(1.0), Some(2.0), Some(1.0), Some(5.0)];
        assert_eq!(best_fit(&values, 3), Some((0, 2)));
        assert_eq!(best_fit(&[None, None], 2), None);
    }

    #[test]
    fn test_model_normalized_to_observed_count() {
        let observed = [1.1, 1.2, 2.5, 3.3];
        let mock = array![[1.5, 2.5, 9.0], [1.7, 3.5, 2.2]];
        let flags = array![[true, true, true], [false, true, false]];
        let cmp = Comparison::new(&observed, &mock, &flags, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        assert_eq!(cmp.n_selected, 4);
        // 9.0 lies outside the edges and is dropped after weighting
        assert_relative_eq!(cmp.model.total_count(), 3.0);
        assert_eq!(cmp.observed.counts(), &[2.0, 1.0, 1.0]);
        assert_eq!(cmp.model.counts(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_no_selected_mocks_is_unavailable() {
        let mock = array![[1.5, 2.5, 3.5]];
        let flags = array![[false, false, false]];
        let cmp = Comparison::new(&[1.5, 2.5, 3.5], &mock, &flags, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(cmp.chi2(), None);
    }
}

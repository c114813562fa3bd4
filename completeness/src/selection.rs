//! Narrow-band excess selection.
//!
//! An object is selected when its BB - NB excess clears both the filter's
//! fixed minimum threshold and the 3-sigma color cut evaluated at its own
//! narrow-band magnitude. Any comparison involving NaN fails, so objects
//! below the noise floor are never selected.

use ndarray::{Array, Dimension, Zip};

use crate::config::FilterConfig;
use crate::photometry::{color_cut, selection_break, LIMIT_SIGMA};

/// Selection thresholds of one filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionCut {
    pub minthres: f64,
    /// 3-sigma narrow-band limit
    pub m_nb: f64,
    /// 3-sigma continuum limit
    pub cont_lim: f64,
}

impl SelectionCut {
    pub fn from_filter(filter: &FilterConfig) -> Self {
        Self {
            minthres: filter.minthres,
            m_nb: filter.m_nb,
            cont_lim: filter.cont_lim(),
        }
    }

    /// 3-sigma excess limit at narrow-band magnitude `nb`
    pub fn sig_limit(&self, nb: f64) -> f64 {
        color_cut(nb, self.m_nb, self.cont_lim, 0.0, LIMIT_SIGMA)
    }

    pub fn is_selected(&self, nb: f64, x: f64) -> bool {
        x >= self.minthres && x >= self.sig_limit(nb)
    }

    /// Narrow-band magnitude where the color cut meets `minthres`
    pub fn nb_break(&self) -> f64 {
        selection_break(self.m_nb, self.cont_lim, self.minthres, LIMIT_SIGMA)
    }

    /// Classify every object given its narrow-band magnitude and excess.
    pub fn apply<D: Dimension>(&self, nb: &Array<f64, D>, x: &Array<f64, D>) -> Selection<D> {
        let sig_limit = nb.mapv(|m| self.sig_limit(m));
        let flags = Zip::from(x)
            .and(&sig_limit)
            .map_collect(|&x, &lim| x >= self.minthres && x >= lim);
        Selection { flags, sig_limit }
    }
}

/// Outcome of [`SelectionCut::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<D: Dimension> {
    /// True where the object is selected
    pub flags: Array<bool, D>,
    /// 3-sigma excess limit at each object's narrow-band magnitude
    pub sig_limit: Array<f64, D>,
}

impl<D: Dimension> Selection<D> {
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.len() - self.selected_count()
    }

    /// Indices of selected objects in logical order
    pub fn selected(&self) -> Vec<D::Pattern> {
        self.indices_where(true)
    }

    /// Indices of rejected objects in logical order
    pub fn rejected(&self) -> Vec<D::Pattern> {
        self.indices_where(false)
    }

    fn indices_where(&self, value: bool) -> Vec<D::Pattern> {
        self.flags
            .indexed_iter()
            .filter(|(_, f)| **f == value)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Flags as 0/1 counts
    pub fn as_counts(&self) -> Array<f64, D> {
        self.flags.mapv(|f| if f { 1.0 } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn cut() -> SelectionCut {
        SelectionCut {
            minthres: 0.15,
            m_nb: 26.0,
            cont_lim: 27.0,
        }
    }

    #[test]
    fn test_bright_large_excess_selected() {
        assert!(cut().is_selected(24.0, 0.5));
    }

    #[test]
    fn test_near_limit_small_excess_rejected() {
        assert!(!cut().is_selected(25.9, 0.1));
    }

    #[test]
    fn test_below_minthres_rejected_even_when_bright() {
        assert!(!cut().is_selected(21.0, 0.14));
        assert!(cut().is_selected(21.0, 0.15));
    }

    #[test]
    fn test_color_cut_dominates_near_limit() {
        let cut = cut();
        let nb = 25.8;
        let lim = cut.sig_limit(nb);
        assert!(lim > cut.minthres);
        assert!(!cut.is_selected(nb, lim - 0.01));
        assert!(cut.is_selected(nb, lim + 0.01));
    }

    #[test]
    fn test_nan_never_selected() {
        let cut = cut();
        assert!(!cut.is_selected(24.0, f64::NAN));
        // Below the noise floor the limit itself is NaN
        assert!(cut.sig_limit(27.5).is_nan());
        assert!(!cut.is_selected(27.5, 5.0));
    }

    #[test]
    fn test_partition_is_exhaustive_and_disjoint() {
        let nb: Array2<f64> = array![[24.0, 25.9, 27.5], [21.0, 25.0, 23.0]];
        let x: Array2<f64> = array![[0.5, 0.1, 1.0], [0.14, f64::NAN, 0.2]];
        let sel = cut().apply(&nb, &x);

        let selected = sel.selected();
        let rejected = sel.rejected();
        assert_eq!(selected.len() + rejected.len(), nb.len());
        assert!(selected.iter().all(|idx| !rejected.contains(idx)));
        assert_eq!(selected, vec![(0, 0), (1, 2)]);
        assert_eq!(sel.selected_count(), 2);
        assert_eq!(sel.rejected_count(), 4);
    }

    #[test]
    fn test_nb_break_separates_regimes() {
        let cut = cut();
        let nb_break = cut.nb_break();
        assert!(cut.sig_limit(nb_break - 0.5) < cut.minthres);
        assert!(cut.sig_limit(nb_break + 0.5) > cut.minthres);
    }
}

//! Noisy mock observations of a synthetic population.

use ndarray::{Array1, Array2, Ix2, Zip};
use shared::noise::standard_normal;

use crate::population::{BaseSyntheticPopulation, DerivedPopulation, SeedPlan};
use crate::properties::{DerivedProperties, PropertyModel};
use crate::selection::{Selection, SelectionCut};

/// `reference + sigma * N(0, 1)` for `nmock` realizations of every object.
///
/// Rows are realizations, columns are objects.
pub fn random_mags(
    seed: u64,
    nmock: usize,
    reference: &Array1<f64>,
    sigma: &Array1<f64>,
) -> Array2<f64> {
    let mut mags = standard_normal((nmock, reference.len()), seed);
    Zip::from(&mut mags)
        .and_broadcast(reference)
        .and_broadcast(sigma)
        .for_each(|m, &r, &s| *m = r + s * *m);
    mags
}

/// `nmock` noisy realizations of a derived population, re-selected and
/// re-derived from the noisy photometry.
#[derive(Debug, Clone)]
pub struct MockEnsemble {
    pub nb: Array2<f64>,
    pub bb: Array2<f64>,
    /// BB - NB of the noisy photometry
    pub excess: Array2<f64>,
    pub selection: Selection<Ix2>,
    /// Properties with stellar-mass scatter
    pub properties: DerivedProperties<Ix2>,
}

impl MockEnsemble {
    /// Observe `derived` with the filter-wide narrow-band mocks `nb_mc`.
    ///
    /// Broad-band noise and mass scatter come from `seeds`, so every
    /// hypothesis of a filter sees the same deviates.
    pub fn observe(
        derived: &DerivedPopulation,
        nb_mc: &Array2<f64>,
        seeds: &SeedPlan,
        cut: &SelectionCut,
        model: &PropertyModel,
    ) -> Self {
        let nmock = nb_mc.nrows();
        let bb = random_mags(seeds.broadband(), nmock, &derived.bb, &derived.bb_sig);
        let excess = &bb - nb_mc;

        let selection = cut.apply(nb_mc, &excess);

        let mass_deviates = standard_normal(nb_mc.raw_dim(), seeds.mass());
        let properties = model.derive_scattered(nb_mc, &bb, &excess, &mass_deviates);

        Self {
            nb: nb_mc.clone(),
            bb,
            excess,
            selection,
            properties,
        }
    }

    pub fn nmock(&self) -> usize {
        self.nb.nrows()
    }

    pub fn ngal(&self) -> usize {
        self.nb.ncols()
    }
}

/// Narrow-band mocks shared by every hypothesis of a filter.
pub fn narrowband_mocks(
    base: &BaseSyntheticPopulation,
    seeds: &SeedPlan,
    nmock: usize,
) -> Array2<f64> {
    random_mags(seeds.narrowband(), nmock, &base.nb_ref, &base.nb_sig_ref)
}

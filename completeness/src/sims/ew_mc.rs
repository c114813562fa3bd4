//! Monte Carlo completeness run over every filter and EW grid point
//!
//! For each filter the run:
//! 1. Loads (or builds and caches) the base synthetic population
//! 2. Draws the narrow-band mocks shared by all grid points
//! 3. Evaluates every (mean, sigma) grid point, in parallel unless serial
//! 4. Writes the completeness table and picks the best-fit grid point
//! 5. Writes the main-sequence dispersion at the best fit
//!
//! A filter that fails is logged and skipped; the others still run. The
//! dispersions of every completed filter are then combined, weighted by the
//! observed galaxies in each mass bin.

use log::{debug, error, info, warn};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use shared::algo::{InterpError, Summary};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use viz::VizError;

use crate::aggregate::{
    mass_bin_counts, per_galaxy_completeness, CompletenessCurve, ErrorSummary,
    MainSequenceDispersion, WeightedDispersion,
};
use crate::cache::{CacheError, CacheStore};
use crate::compare::{best_fit, combined_chi2, Comparison};
use crate::config::{ConfigError, FilterConfig, PipelineConfig};
use crate::io::{
    output_name, write_weighted_dispersion, BestFitTable, CalibrationError, CalibrationSource,
    CompletenessRow, CompletenessTable, DispersionTable, ObservedSample, WEIGHTED_DISPERSION_STEM,
};
use crate::mock::{narrowband_mocks, MockEnsemble};
use crate::photometry::EwExcessTable;
use crate::population::{
    BaseSyntheticPopulation, DerivedPopulation, EwHypothesis, HypothesisGrid, SeedPlan,
};
use crate::properties::{MassCalibration, PropertyModel};
use crate::selection::SelectionCut;

#[derive(Error, Debug)]
pub enum EwMcError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("interpolation failed: {0}")]
    Interp(#[from] InterpError),
    #[error("binning failed: {0}")]
    Viz(#[from] VizError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("filter index {0} out of range")]
    NoSuchFilter(usize),
    #[error("two grid points share the cache bundle {}", .0.display())]
    CacheKeyCollision(PathBuf),
}

/// Run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Regenerate populations even when cached
    pub redo: bool,
    /// First filter and first grid point only, tables suffixed `.debug`
    pub debug: bool,
    /// Evaluate grid points on the calling thread
    pub serial: bool,
}

/// Completeness curves of one grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessCurves {
    /// sSFR, restricted to mocks brighter than the selection break
    pub ssfr: CompletenessCurve,
    pub sfr: CompletenessCurve,
    pub flux: CompletenessCurve,
}

/// Everything computed for one grid point.
#[derive(Debug, Clone)]
pub struct HypothesisResult {
    pub hypothesis: EwHypothesis,
    pub row: CompletenessRow,
    pub errors: ErrorSummary,
    pub curves: CompletenessCurves,
    pub dispersion: MainSequenceDispersion,
    /// Selected (realization, galaxy) entries
    pub selected_mocks: usize,
}

/// Outcome of one filter.
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub filter: String,
    pub ngal: usize,
    pub table: CompletenessTable,
    pub hypotheses: Vec<HypothesisResult>,
    /// (mean index, sigma index) of the best fit
    pub best: Option<(usize, usize)>,
    /// Observed galaxies per stellar-mass bin
    pub mass_counts: Vec<f64>,
}

impl FilterResult {
    pub fn best_hypothesis(&self) -> Option<&HypothesisResult> {
        let (mm, ss) = self.best?;
        self.hypotheses
            .iter()
            .find(|h| h.hypothesis.mm == mm && h.hypothesis.ss == ss)
    }

    pub fn best_row(&self) -> Option<CompletenessRow> {
        self.best_hypothesis().map(|h| h.row)
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<FilterResult>,
    pub failed: Vec<(String, EwMcError)>,
}

/// Per-filter state shared read-only by every grid point.
struct FilterContext<'a> {
    filter: &'a FilterConfig,
    seeds: SeedPlan,
    base: BaseSyntheticPopulation,
    nb_mc: Array2<f64>,
    /// Mock entries at or brighter than the selection break
    above_break: Array2<bool>,
    excess_table: EwExcessTable,
    cut: SelectionCut,
    model: PropertyModel,
    observed: ObservedSample,
    mass_counts: Vec<f64>,
}

/// Completeness pipeline over a [`PipelineConfig`].
pub struct EwMc<'a> {
    config: &'a PipelineConfig,
    inputs: CalibrationSource,
    cache: CacheStore,
    output_dir: PathBuf,
    options: RunOptions,
}

fn log_summary(label: &str, values: &Array1<f64>) {
    match Summary::of_finite(values) {
        Some(s) => debug!("{label} : {s}"),
        None => debug!("{label} : no finite values"),
    }
}

impl<'a> EwMc<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        input_dir: &Path,
        cache_dir: &Path,
        output_dir: &Path,
        options: RunOptions,
    ) -> Self {
        Self {
            config,
            inputs: CalibrationSource::with_path(input_dir.to_path_buf()),
            cache: CacheStore::with_path(cache_dir.to_path_buf()),
            output_dir: output_dir.to_path_buf(),
            options,
        }
    }

    /// Run every filter, then write the best-fit summary.
    ///
    /// Only output-directory failures abort the run; filter failures are
    /// collected in the summary.
    pub fn run(&self) -> Result<RunSummary, EwMcError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let n_filters = if self.options.debug {
            self.config.filters.len().min(1)
        } else {
            self.config.filters.len()
        };

        let mut summary = RunSummary::default();
        let mut best = BestFitTable::default();
        for ff in 0..n_filters {
            let name = self.config.filters[ff].name.clone();
            match self.run_filter(ff) {
                Ok(result) => {
                    if let Some(row) = result.best_row() {
                        best.push(name, row);
                    }
                    summary.completed.push(result);
                }
                Err(e) => {
                    error!("{name} aborted: {e}");
                    summary.failed.push((name, e));
                }
            }
        }

        if !best.rows.is_empty() {
            let path = self
                .output_dir
                .join(BestFitTable::file_name(self.options.debug));
            best.write_csv(&path)?;
            info!("Writing : {}", path.display());
        }
        self.write_combined_dispersion(&summary.completed)?;
        Ok(summary)
    }

    /// Combine the best-fit dispersions of the completed filters.
    fn write_combined_dispersion(&self, completed: &[FilterResult]) -> Result<(), EwMcError> {
        let parts: Vec<(&MainSequenceDispersion, &[f64])> = completed
            .iter()
            .filter_map(|r| {
                let best = r.best_hypothesis()?;
                Some((&best.dispersion, r.mass_counts.as_slice()))
            })
            .collect();
        if parts.is_empty() {
            return Ok(());
        }

        let combined = WeightedDispersion::combine(&parts)?;
        for (center, sigma) in combined.centers.iter().zip(&combined.sigma_selected) {
            debug!("Weighted dispersion at log M = {center:.2} : {sigma:.3}");
        }
        let name = output_name(WEIGHTED_DISPERSION_STEM, self.options.debug);
        let path = self.output_dir.join(name);
        write_weighted_dispersion(&path, &combined)?;
        info!("Writing : {}", path.display());
        Ok(())
    }

    /// Evaluate the full grid of filter `ff`.
    pub fn run_filter(&self, ff: usize) -> Result<FilterResult, EwMcError> {
        let start = Instant::now();
        let filter = self
            .config
            .filters
            .get(ff)
            .ok_or(EwMcError::NoSuchFilter(ff))?;
        let continuum = &filter.continuum;
        info!("Working on : {} (continuum {continuum})", filter.name);

        let ctx = self.prepare(ff, filter)?;

        let grid = HypothesisGrid::new(filter, &self.config.grid);
        let mut hypotheses = grid.hypotheses();
        if self.options.debug {
            hypotheses.truncate(1);
        }

        let mut keys = HashSet::new();
        for hyp in &hypotheses {
            let path = self
                .cache
                .hypothesis_path(&filter.name, hyp.log_ew_mean, hyp.log_ew_sig);
            if !keys.insert(path.clone()) {
                return Err(EwMcError::CacheKeyCollision(path));
            }
        }

        info!(
            "Evaluating {} grid points {}",
            hypotheses.len(),
            if self.options.serial {
                "serially"
            } else {
                "in parallel"
            }
        );
        let results: Vec<HypothesisResult> = if self.options.serial {
            hypotheses
                .iter()
                .map(|hyp| self.evaluate(&ctx, hyp))
                .collect::<Result<_, _>>()?
        } else {
            hypotheses
                .par_iter()
                .map(|hyp| self.evaluate(&ctx, hyp))
                .collect::<Result<_, _>>()?
        };

        let mut table = CompletenessTable::new(filter.name.clone());
        table.rows = results.iter().map(|r| r.row).collect();

        let combined: Vec<Option<f64>> = results.iter().map(|r| r.row.chi2_comb).collect();
        // Results are a row-major prefix of the grid
        let best = best_fit(&combined, grid.shape().1);
        match best.and_then(|(mm, ss)| grid.get(mm, ss)) {
            Some(hyp) => info!(
                "{} best fit : log EW mean = {:.2}, sigma = {:.2}",
                filter.name, hyp.log_ew_mean, hyp.log_ew_sig
            ),
            None => warn!("{} : no grid point has a combined chi-square", filter.name),
        }

        let path = self.output_dir.join(table.file_name(self.options.debug));
        table.write_csv(&path)?;
        info!("Writing : {}", path.display());

        let best_result = best.and_then(|(mm, ss)| {
            results
                .iter()
                .find(|r| r.hypothesis.mm == mm && r.hypothesis.ss == ss)
        });
        if let Some(result) = best_result {
            let dispersion = DispersionTable {
                filter: filter.name.clone(),
                dispersion: result.dispersion.clone(),
                observed: ctx.mass_counts.clone(),
            };
            let path = self
                .output_dir
                .join(dispersion.file_name(self.options.debug));
            dispersion.write_csv(&path)?;
            info!("Writing : {}", path.display());
        }

        info!(
            "{} finished in {:.1} s",
            filter.name,
            start.elapsed().as_secs_f64()
        );

        Ok(FilterResult {
            filter: filter.name.clone(),
            ngal: ctx.base.ngal(),
            table,
            hypotheses: results,
            best,
            mass_counts: ctx.mass_counts,
        })
    }

    /// Load inputs and build everything the grid points share.
    fn prepare<'f>(
        &self,
        ff: usize,
        filter: &'f FilterConfig,
    ) -> Result<FilterContext<'f>, EwMcError> {
        let band = filter.bandpass();
        let excess_table = EwExcessTable::build(&band, &self.config.excess_grid.edges())?;
        let (ew_min, ew_max) = excess_table.log_ew_range();
        info!("EW_ref : {ew_min:.3} .. {ew_max:.3}");
        info!("Minimum log EW : {:.3}", band.log_ew(filter.minthres));

        let cut = SelectionCut::from_filter(filter);
        info!(
            "Continuum limit : {:.3}  NB break : {:.3}",
            cut.cont_lim,
            cut.nb_break()
        );

        // Structural inputs first so a missing file fails before any draws
        let mass_table = self.inputs.mass_table(&filter.mass_prefix)?;
        let observed = self.inputs.observed_sample(&filter.name)?;
        info!(
            "Observed sample : {} objects ({} spectroscopic)",
            observed.len(),
            observed.spec_confirmed()
        );
        let mass_counts = mass_bin_counts(&observed.log_mstar, &self.config.bins.mass.edges())?;
        if observed.log_mstar.is_empty() {
            warn!(
                "{} : no stellar masses observed, no weight in the combined dispersion",
                filter.name
            );
        }

        let model = PropertyModel {
            band,
            filt_corr: filter.filt_corr,
            lum_dist_cm: self
                .config
                .cosmology
                .luminosity_distance_cm(filter.redshift()),
            mass: MassCalibration::from_table(&mass_table)?,
        };

        let nb_grid = self.config.nb_grid.grid(filter.m_nb);
        let base = self.base_population(filter, nb_grid)?;
        info!("Ngal : {}", base.ngal());
        log_summary("NB_ref", &base.nb_ref);
        log_summary("NB_sig_ref", &base.nb_sig_ref);

        let seeds = SeedPlan::new(ff, self.config.filters.len());
        let nb_mc = narrowband_mocks(&base, &seeds, self.config.nmock);
        let nb_break = cut.nb_break();
        let above_break = nb_mc.mapv(|m| m <= nb_break);

        Ok(FilterContext {
            filter,
            seeds,
            base,
            nb_mc,
            above_break,
            excess_table,
            cut,
            model,
            observed,
            mass_counts,
        })
    }

    fn base_population(
        &self,
        filter: &FilterConfig,
        nb_grid: Vec<f64>,
    ) -> Result<BaseSyntheticPopulation, EwMcError> {
        let nsim = self.config.nsim;
        if !self.options.redo {
            match self.cache.get_base(&filter.name) {
                Some(Ok(base)) if base.matches(nsim, &nb_grid) => return Ok(base),
                Some(Ok(_)) => warn!(
                    "Stale cache for {}: nsim or NB grid changed, regenerating",
                    filter.name
                ),
                Some(Err(e)) => warn!("Unreadable cache for {}: {e}, regenerating", filter.name),
                None => {}
            }
        }

        let counts = self.inputs.number_counts(&filter.name)?;
        let base = BaseSyntheticPopulation::build(&counts, filter, nb_grid, nsim)?;
        self.cache.save_base(&filter.name, &base)?;
        Ok(base)
    }

    fn derived_population(
        &self,
        ctx: &FilterContext<'_>,
        hyp: &EwHypothesis,
    ) -> Result<DerivedPopulation, EwMcError> {
        let name = &ctx.filter.name;
        let seed = ctx
            .seeds
            .equivalent_width(hyp.mm, hyp.ss, self.config.grid.n_sigma);

        if !self.options.redo {
            let (mean, sig) = (hyp.log_ew_mean, hyp.log_ew_sig);
            match self.cache.get_derived(name, mean, sig) {
                Some(Ok(derived)) if derived.matches(seed, ctx.base.ngal()) => return Ok(derived),
                Some(Ok(_)) => warn!(
                    "Stale cache for {name} ({:.2}, {:.2}): seed or Ngal changed, regenerating",
                    hyp.log_ew_mean, hyp.log_ew_sig
                ),
                Some(Err(e)) => warn!("Unreadable cache for {name}: {e}, regenerating"),
                None => {}
            }
        }

        let derived = DerivedPopulation::generate(
            &ctx.base,
            hyp,
            seed,
            &ctx.excess_table,
            &ctx.cut,
            &ctx.model,
            ctx.cut.cont_lim,
        );
        self.cache.save_derived(name, &derived)?;
        Ok(derived)
    }

    fn evaluate(
        &self,
        ctx: &FilterContext<'_>,
        hyp: &EwHypothesis,
    ) -> Result<HypothesisResult, EwMcError> {
        let name = &ctx.filter.name;
        let bins = &self.config.bins;
        debug!(
            "{name} : log EW mean = {:.2}, sigma = {:.2}",
            hyp.log_ew_mean, hyp.log_ew_sig
        );

        let derived = self.derived_population(ctx, hyp)?;
        let mock = MockEnsemble::observe(&derived, &ctx.nb_mc, &ctx.seeds, &ctx.cut, &ctx.model);
        let flags = &mock.selection.flags;
        let selected_mocks = mock.selection.selected_count();
        debug!(
            "{name} : {} of {} true galaxies selected, {selected_mocks} mock entries",
            derived.selected.iter().filter(|&&s| s).count(),
            derived.ngal()
        );

        let comp = per_galaxy_completeness(flags);
        let errors = ErrorSummary::new(&comp, &derived.selected);
        if let Some(t1) = errors.type1 {
            debug!("Type 1 completeness : {t1}");
        }
        if let Some(t2) = errors.type2 {
            debug!("Type 2 completeness : {t2}");
        }

        let props = &derived.properties;
        let curves = CompletenessCurves {
            ssfr: CompletenessCurve::from_truth(
                &props.log_ssfr(),
                flags,
                Some(&ctx.above_break),
                &bins.ssfr.edges(),
            )?,
            sfr: CompletenessCurve::from_truth(&props.log_sfr, flags, None, &bins.sfr.edges())?,
            flux: CompletenessCurve::from_truth(&props.ha_flux, flags, None, &bins.flux.edges())?,
        };

        let ew_cmp = Comparison::new(
            &ctx.observed.nb_ew,
            &mock.properties.log_ew,
            flags,
            &bins.ew.edges(),
        )?;
        let flux_cmp = Comparison::new(
            &ctx.observed.ha_flux,
            &mock.properties.ha_flux,
            flags,
            &bins.flux.edges(),
        )?;
        if log::log_enabled!(log::Level::Debug) {
            let model = ew_cmp.model.clone().with_title(format!(
                "{name} log EW model ({:.2}, {:.2})",
                hyp.log_ew_mean, hyp.log_ew_sig
            ));
            let observed = ew_cmp
                .observed
                .clone()
                .with_title(format!("{name} log EW observed"));
            debug!("\n{}", model.format()?);
            debug!("\n{}", observed.format()?);
        }

        let chi2_ew = ew_cmp.chi2();
        let chi2_flux = flux_cmp.chi2();
        if chi2_ew.is_none() || chi2_flux.is_none() {
            warn!(
                "{name} ({:.2}, {:.2}): chi-square unavailable (EW {}, flux {})",
                hyp.log_ew_mean,
                hyp.log_ew_sig,
                chi2_ew.map_or("n/a".to_string(), |v| format!("{v:.3}")),
                chi2_flux.map_or("n/a".to_string(), |v| format!("{v:.3}")),
            );
        }

        let dispersion = MainSequenceDispersion::new(
            &mock.properties.log_mass,
            &mock.properties.log_sfr,
            flags,
            &bins.mass.edges(),
        )?;

        let row = CompletenessRow {
            log_ew_mean: hyp.log_ew_mean,
            log_ew_sig: hyp.log_ew_sig,
            comp_50_ssfr: curves.ssfr.comp_50(),
            comp_50_sfr: curves.sfr.comp_50(),
            comp_50_flux: curves.flux.comp_50(),
            chi2_ew,
            chi2_flux,
            chi2_comb: combined_chi2(chi2_ew, chi2_flux),
        };

        Ok(HypothesisResult {
            hypothesis: *hyp,
            row,
            errors,
            curves,
            dispersion,
            selected_mocks,
        })
    }
}

//! Completeness statistics over mock realizations.

use ndarray::{Array1, Array2, Axis, Zip};
use shared::algo::{std_dev, Summary};
use viz::histogram::Histogram;
use viz::VizError;

/// Completeness fraction at which the characteristic value is read off
pub const COMPLETENESS_LEVEL: f64 = 0.5;
/// Lowest allowed low-mass cutoff (log Msun)
pub const LOW_MASS_FLOOR: f64 = 6.0;
/// Standard deviations below the mean mass at which the cutoff sits
const LOW_MASS_NSIGMA: f64 = 1.5;

/// Fraction of realizations in which each galaxy is selected.
pub fn per_galaxy_completeness(flags: &Array2<bool>) -> Array1<f64> {
    let nmock = flags.nrows().max(1) as f64;
    flags
        .map(|&f| if f { 1.0 } else { 0.0 })
        .sum_axis(Axis(0))
        .mapv_into(|n| n / nmock)
}

/// Spread of per-galaxy completeness split by true selection.
///
/// Type 1 galaxies are selected in the noise-free photometry and can only
/// be lost to noise. Type 2 galaxies are rejected in truth and can only be
/// gained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSummary {
    pub type1: Option<Summary>,
    pub type2: Option<Summary>,
}

impl ErrorSummary {
    pub fn new(completeness: &Array1<f64>, truth: &Array1<bool>) -> Self {
        let split = |want: bool| {
            let values: Vec<f64> = completeness
                .iter()
                .zip(truth)
                .filter(|(_, &t)| t == want)
                .map(|(&c, _)| c)
                .collect();
            Summary::of_finite(&values)
        };
        Self {
            type1: split(true),
            type2: split(false),
        }
    }
}

/// One populated bin of a completeness curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub center: f64,
    pub completeness: f64,
    /// Eligible entries in the bin
    pub total: f64,
}

/// Selected fraction per bin of some property.
///
/// Bins without eligible entries are left out.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessCurve {
    pub points: Vec<CurvePoint>,
}

impl CompletenessCurve {
    /// Bin every (realization, galaxy) entry by its galaxy's noise-free
    /// value and take the selected fraction.
    ///
    /// `eligible` restricts the entries considered; `None` keeps them all.
    pub fn from_truth(
        truth: &Array1<f64>,
        flags: &Array2<bool>,
        eligible: Option<&Array2<bool>>,
        edges: &[f64],
    ) -> viz::Result<Self> {
        let values = truth
            .broadcast(flags.raw_dim())
            .ok_or_else(|| {
                VizError::HistogramError(format!(
                    "{} true values do not match {} galaxies",
                    truth.len(),
                    flags.ncols()
                ))
            })?
            .to_owned();
        Self::from_mocks(&values, flags, eligible, edges)
    }

    /// Bin every (realization, galaxy) entry by its own noisy value and take
    /// the selected fraction.
    pub fn from_mocks(
        values: &Array2<f64>,
        flags: &Array2<bool>,
        eligible: Option<&Array2<bool>>,
        edges: &[f64],
    ) -> viz::Result<Self> {
        let mut total = Histogram::new(edges.to_vec())?;
        let mut selected = Histogram::new(edges.to_vec())?;

        let mut bin = |v: f64, f: bool, ok: bool| {
            if ok {
                total.add(v);
                if f {
                    selected.add(v);
                }
            }
        };
        match eligible {
            Some(mask) => Zip::from(values)
                .and(flags)
                .and(mask)
                .for_each(|&v, &f, &ok| bin(v, f, ok)),
            None => Zip::from(values)
                .and(flags)
                .for_each(|&v, &f| bin(v, f, true)),
        }

        let points = total
            .bin_centers()
            .into_iter()
            .zip(total.counts())
            .zip(selected.counts())
            .filter(|((_, &n), _)| n > 0.0)
            .map(|((center, &n), &s)| CurvePoint {
                center,
                completeness: s / n,
                total: n,
            })
            .collect();

        Ok(Self { points })
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Lowest value at which the curve reaches `level`.
    ///
    /// Interpolates linearly between the bin centers around the first
    /// crossing; NaN when the curve never gets there.
    pub fn value_at(&self, level: f64) -> f64 {
        let Some(first) = self.points.iter().position(|p| p.completeness >= level) else {
            return f64::NAN;
        };
        let hit = self.points[first];
        if first == 0 {
            return hit.center;
        }
        let prev = self.points[first - 1];
        let t = (level - prev.completeness) / (hit.completeness - prev.completeness);
        prev.center + t * (hit.center - prev.center)
    }

    /// 50% completeness value
    pub fn comp_50(&self) -> f64 {
        self.value_at(COMPLETENESS_LEVEL)
    }
}

/// `max(mean - 1.5 std, 6)` of the finite stellar masses.
///
/// Bins below it hold too few selected galaxies to trust their dispersion.
pub fn low_mass_cutoff(log_mass: &[f64]) -> f64 {
    let finite: Vec<f64> = log_mass.iter().copied().filter(|m| m.is_finite()).collect();
    if finite.is_empty() {
        return LOW_MASS_FLOOR;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    (mean - LOW_MASS_NSIGMA * std_dev(&finite)).max(LOW_MASS_FLOOR)
}

/// Galaxies of a sample in each stellar-mass bin.
pub fn mass_bin_counts(log_mass: &[f64], edges: &[f64]) -> viz::Result<Vec<f64>> {
    let mut hist = Histogram::new(edges.to_vec())?;
    hist.add_all(log_mass.iter().copied());
    Ok(hist.counts().to_vec())
}

/// log SFR scatter of the mocks in one stellar-mass bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassBinDispersion {
    pub center: f64,
    /// Entries with a finite SFR in the bin
    pub n_full: usize,
    /// Standard deviation of log SFR, NaN for an empty bin
    pub sigma_full: f64,
    pub n_selected: usize,
    pub sigma_selected: f64,
}

/// Main-sequence dispersion: scatter of log SFR at fixed stellar mass,
/// over all mock entries and over the selected ones.
#[derive(Debug, Clone, PartialEq)]
pub struct MainSequenceDispersion {
    pub bins: Vec<MassBinDispersion>,
    /// [`low_mass_cutoff`] of the selected entries
    pub low_mass_cutoff: f64,
}

impl MainSequenceDispersion {
    pub fn new(
        log_mass: &Array2<f64>,
        log_sfr: &Array2<f64>,
        flags: &Array2<bool>,
        edges: &[f64],
    ) -> viz::Result<Self> {
        if log_mass.dim() != log_sfr.dim() || log_mass.dim() != flags.dim() {
            return Err(VizError::HistogramError(format!(
                "mass {:?}, SFR {:?} and selection {:?} shapes differ",
                log_mass.dim(),
                log_sfr.dim(),
                flags.dim()
            )));
        }

        let binner = Histogram::new(edges.to_vec())?;
        let mut full = vec![Vec::new(); binner.num_bins()];
        let mut selected = vec![Vec::new(); binner.num_bins()];
        let mut selected_mass = Vec::new();
        Zip::from(log_mass)
            .and(log_sfr)
            .and(flags)
            .for_each(|&mass, &sfr, &f| {
                if f {
                    selected_mass.push(mass);
                }
                let Some(b) = binner.find_bin(mass).filter(|_| sfr.is_finite()) else {
                    return;
                };
                full[b].push(sfr);
                if f {
                    selected[b].push(sfr);
                }
            });

        let bins = binner
            .bin_centers()
            .into_iter()
            .zip(full.iter().zip(&selected))
            .map(|(center, (all, sel))| MassBinDispersion {
                center,
                n_full: all.len(),
                sigma_full: std_dev(all),
                n_selected: sel.len(),
                sigma_selected: std_dev(sel),
            })
            .collect();

        Ok(Self {
            bins,
            low_mass_cutoff: low_mass_cutoff(&selected_mass),
        })
    }
}

/// Main-sequence dispersion combined over filters.
///
/// Per bin, `sqrt(sum(w sigma^2) / sum(w))` where `w` is each filter's
/// observed galaxy count in the bin. A filter whose sigma is NaN in a bin
/// adds nothing to that bin; a bin without weight is NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedDispersion {
    pub centers: Vec<f64>,
    pub sigma_full: Vec<f64>,
    pub sigma_selected: Vec<f64>,
    /// Observed galaxies per bin over all filters
    pub weight: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct QuadratureSum {
    weighted: f64,
    weight: f64,
}

impl QuadratureSum {
    fn add(&mut self, sigma: f64, weight: f64) {
        if sigma.is_finite() && weight > 0.0 {
            self.weighted += weight * sigma * sigma;
            self.weight += weight;
        }
    }

    fn value(&self) -> f64 {
        if self.weight > 0.0 {
            (self.weighted / self.weight).sqrt()
        } else {
            f64::NAN
        }
    }
}

impl WeightedDispersion {
    /// Combine `(dispersion, observed counts per bin)` of each filter.
    ///
    /// Every filter must use the same mass bins.
    pub fn combine(parts: &[(&MainSequenceDispersion, &[f64])]) -> viz::Result<Self> {
        let Some((first, _)) = parts.first() else {
            return Err(VizError::HistogramError("no dispersions to combine".to_string()));
        };
        let centers: Vec<f64> = first.bins.iter().map(|b| b.center).collect();
        let nbins = centers.len();

        let mut full = vec![QuadratureSum::default(); nbins];
        let mut selected = vec![QuadratureSum::default(); nbins];
        let mut weight = vec![0.0; nbins];
        for (dispersion, counts) in parts {
            if dispersion.bins.len() != nbins || counts.len() != nbins {
                return Err(VizError::HistogramError(format!(
                    "expected {nbins} mass bins, got {} with {} counts",
                    dispersion.bins.len(),
                    counts.len()
                )));
            }
            for (b, (bin, &w)) in dispersion.bins.iter().zip(counts.iter()).enumerate() {
                full[b].add(bin.sigma_full, w);
                selected[b].add(bin.sigma_selected, w);
                weight[b] += w;
            }
        }

        Ok(Self {
            centers,
            sigma_full: full.iter().map(QuadratureSum::value).collect(),
            sigma_selected: selected.iter().map(QuadratureSum::value).collect(),
            weight,
        })
    }
}

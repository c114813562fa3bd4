use completeness::io::calibration::write_json;
use completeness::io::CalibrationError;
use completeness::population::NumberCounts;
use completeness::properties::MassTable;
use completeness::sims::{EwMc, EwMcError, RunOptions, RunSummary};
use completeness::PipelineConfig;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FILTER: &str = "NB816";

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    let mut filter = config.filter(FILTER).cloned().unwrap();
    filter.m_nb = 26.0;
    filter.m_bb1 = 27.0;
    filter.m_bb2 = None;
    filter.epsilon = 1.0;
    filter.logew_mean_start = 1.0;
    filter.logew_sig_start = 0.3;

    config.filters = vec![filter];
    config.grid.n_mean = 2;
    config.grid.n_sigma = 2;
    config.nsim = 300;
    config.nmock = 3;
    config
}

/// Input, cache and output directories under `dir`
fn workspace(dir: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
    let root = dir.path();
    (root.join("in"), root.join("cache"), root.join("out"))
}

fn write_inputs(dir: &Path, config: &PipelineConfig) {
    let mag: Vec<f64> = (0..33).map(|i| 19.0 + 0.25 * i as f64).collect();
    let n_norm = vec![1.0 / 8.0; mag.len()];
    let mut counts = BTreeMap::new();
    counts.insert(FILTER.to_string(), NumberCounts { mag, n_norm });
    write_json(&dir.join("number_counts.json"), &counts).unwrap();

    let filter = &config.filters[0];
    let table = MassTable {
        cont_arr: (0..8).map(|i| 20.0 + i as f64).collect(),
        avg_log_m: (0..8).map(|i| 11.0 - 0.4 * i as f64).collect(),
        std_log_m: vec![0.25; 8],
        n_log_m: vec![10.0; 8],
    };
    let mass_path = dir.join(format!("mag_vs_mass_{}.json", filter.mass_prefix));
    write_json(&mass_path, &table).unwrap();

    let n = 40;
    let step = |i: usize| 1.8 * i as f64 / n as f64;
    let nb_ew: Vec<f64> = (0..n).map(|i| 0.6 + step(i)).collect();
    let ha_flux: Vec<f64> = (0..n).map(|i| -16.9 + step(i)).collect();
    let log_mstar: Vec<f64> = (0..n).map(|i| 7.0 + step(i)).collect();
    let sample = json!({
        "nb_ew": nb_ew,
        "ha_flux": ha_flux,
        "log_mstar": log_mstar,
        "spec_flag": vec![false; n],
    });
    write_json(&dir.join(format!("ew_flux_{FILTER}.json")), &sample).unwrap();
}

fn run(
    config: &PipelineConfig,
    inputs: &Path,
    cache: &Path,
    output: &Path,
    options: RunOptions,
) -> RunSummary {
    EwMc::new(config, inputs, cache, output, options)
        .run()
        .unwrap()
}

fn read(output: &Path, name: &str) -> String {
    std::fs::read_to_string(output.join(name)).unwrap()
}

fn table_text(output: &Path) -> String {
    read(output, &format!("{FILTER}_completeness_50.csv"))
}

#[test]
fn test_fresh_run_writes_tables_and_cache() {
    let dir = TempDir::new().unwrap();
    let (inputs, cache, output) = workspace(&dir);
    let config = small_config();
    write_inputs(&inputs, &config);

    let summary = run(&config, &inputs, &cache, &output, RunOptions::default());
    assert!(summary.failed.is_empty());
    assert_eq!(summary.completed.len(), 1);

    let result = &summary.completed[0];
    // 300 * 0.25 / 8 = 9.375 objects at each of 24 grid magnitudes
    assert_eq!(result.ngal, 9 * 24);
    assert_eq!(result.table.rows.len(), 4);
    assert_eq!(result.hypotheses[1].hypothesis.ss, 1);

    for h in &result.hypotheses {
        for curve in [&h.curves.flux, &h.curves.sfr, &h.curves.ssfr] {
            assert!(curve
                .points
                .iter()
                .all(|p| p.total > 0.0 && (0.0..=1.0).contains(&p.completeness)));
        }
    }

    assert!(cache.join("NB816_init.bin").exists());
    for name in ["1.00_0.30", "1.00_0.40", "1.10_0.30", "1.10_0.40"] {
        assert!(cache.join(format!("NB816_{name}.bin")).exists(), "{name}");
    }

    let text = table_text(&output);
    assert_eq!(text.lines().count(), 5);
    assert!(text.starts_with("log_EWmean,log_EWsig,comp_50_sSFR"));

    assert!(result.best.is_some());
    let best = read(&output, "best_fit_completeness_50.csv");
    let lines: Vec<&str> = best.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("NB816,"));
}

#[test]
fn test_fresh_run_writes_dispersion_tables() {
    let dir = TempDir::new().unwrap();
    let (inputs, cache, output) = workspace(&dir);
    let config = small_config();
    write_inputs(&inputs, &config);

    let summary = run(&config, &inputs, &cache, &output, RunOptions::default());
    let result = &summary.completed[0];
    let nbins = config.bins.mass.edges().len() - 1;

    // 40 observed masses between 7.0 and 8.8
    assert_eq!(result.mass_counts.len(), nbins);
    assert_eq!(result.mass_counts.iter().sum::<f64>(), 40.0);

    let best = result.best_hypothesis().unwrap();
    assert_eq!(best.dispersion.bins.len(), nbins);
    let entries: usize = best.dispersion.bins.iter().map(|b| b.n_full).sum();
    assert!(entries > 0);

    let per_filter = read(&output, "NB816_sfr_dispersion.csv");
    assert_eq!(per_filter.lines().count(), nbins + 1);
    let weighted = read(&output, "weighted_sfr_dispersion.csv");
    assert_eq!(weighted.lines().count(), nbins + 1);
    assert!(weighted.starts_with("log_mstar,sigma_full,sigma_sel,n_obs"));
}

#[test]
fn test_cached_rerun_matches_fresh_run() {
    let dir = TempDir::new().unwrap();
    let (inputs, cache, output) = workspace(&dir);
    let config = small_config();
    write_inputs(&inputs, &config);

    run(&config, &inputs, &cache, &output, RunOptions::default());
    let fresh = table_text(&output);

    // The cache alone must reproduce the run
    std::fs::remove_file(inputs.join("number_counts.json")).unwrap();
    run(&config, &inputs, &cache, &output, RunOptions::default());
    assert_eq!(table_text(&output), fresh);
}

#[test]
fn test_independent_runs_are_deterministic() {
    let dir = TempDir::new().unwrap();
    let inputs = dir.path().join("in");
    let config = small_config();
    write_inputs(&inputs, &config);

    let out_a = dir.path().join("a");
    let out_b = dir.path().join("b");
    let cache_a = dir.path().join("cache_a");
    let cache_b = dir.path().join("cache_b");
    let serial = RunOptions {
        redo: true,
        serial: true,
        ..RunOptions::default()
    };
    run(&config, &inputs, &cache_a, &out_a, RunOptions::default());
    run(&config, &inputs, &cache_b, &out_b, serial);
    assert_eq!(table_text(&out_a), table_text(&out_b));
}

#[test]
fn test_changed_nsim_regenerates_population() {
    let dir = TempDir::new().unwrap();
    let (inputs, cache, output) = workspace(&dir);
    let mut config = small_config();
    write_inputs(&inputs, &config);

    let first = run(&config, &inputs, &cache, &output, RunOptions::default());
    config.nsim = 600;
    let second = run(&config, &inputs, &cache, &output, RunOptions::default());

    assert_eq!(first.completed[0].ngal, 9 * 24);
    // 600 * 0.25 / 8 = 18.75 rounds to 19
    assert_eq!(second.completed[0].ngal, 19 * 24);
}

#[test]
fn test_missing_inputs_abort_only_that_filter() {
    let dir = TempDir::new().unwrap();
    let (inputs, cache, output) = workspace(&dir);
    let mut config = small_config();
    write_inputs(&inputs, &config);

    let mut orphan = config.filters[0].clone();
    orphan.name = "NB999".to_string();
    config.filters.insert(0, orphan);

    let summary = run(&config, &inputs, &cache, &output, RunOptions::default());
    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.completed[0].filter, FILTER);
    assert_eq!(summary.failed.len(), 1);
    let (name, err) = &summary.failed[0];
    assert_eq!(name, "NB999");
    assert!(matches!(err, EwMcError::Calibration(CalibrationError::Missing(_))));
    assert!(!output.join("NB999_completeness_50.csv").exists());
}

#[test]
fn test_debug_run_writes_suffixed_tables() {
    let dir = TempDir::new().unwrap();
    let (inputs, cache, output) = workspace(&dir);
    let config = small_config();
    write_inputs(&inputs, &config);

    let debug = RunOptions {
        debug: true,
        ..RunOptions::default()
    };
    let summary = run(&config, &inputs, &cache, &output, debug);
    assert_eq!(summary.completed[0].hypotheses.len(), 1);

    let text = read(&output, "NB816_completeness_50.debug.csv");
    assert_eq!(text.lines().count(), 2);
    for name in ["NB816_completeness_50.csv", "best_fit_completeness_50.csv"] {
        assert!(!output.join(name).exists(), "{name}");
    }
}

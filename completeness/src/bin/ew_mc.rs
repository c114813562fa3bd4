//! Narrow-band H-alpha completeness from Monte Carlo EW distributions
//!
//! Runs every configured filter over its (mean, sigma) log EW grid and
//! writes one completeness table per filter plus a best-fit summary.

use anyhow::{bail, Context};
use clap::Parser;
use completeness::shared_args::SharedPipelineArgs;
use completeness::sims::{EwMc, RunOptions};
use log::info;
use std::time::Instant;

/// Command line arguments for the completeness run
#[derive(Parser, Debug)]
#[command(
    name = "EW Monte Carlo",
    about = "Estimates narrow-band survey completeness over a log-normal EW grid",
    long_about = None
)]
struct Args {
    #[command(flatten)]
    shared: SharedPipelineArgs,

    /// Modelled galaxies setting the population normalization
    #[arg(long)]
    nsim: Option<usize>,

    /// Noisy realizations per modelled galaxy
    #[arg(long)]
    nmock: Option<usize>,

    /// Regenerate cached populations
    #[arg(long, default_value_t = false)]
    redo: bool,

    /// Evaluate grid points serially instead of in parallel
    #[arg(long, default_value_t = false)]
    serial: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = args
        .shared
        .load_config()
        .context("failed to load pipeline configuration")?;
    if let Some(nsim) = args.nsim {
        config.nsim = nsim;
    }
    if let Some(nmock) = args.nmock {
        config.nmock = nmock;
    }
    config.validate().context("invalid pipeline configuration")?;

    info!(
        "{} filters, nsim = {}, nmock = {}",
        config.filters.len(),
        config.nsim,
        config.nmock
    );

    let options = RunOptions {
        redo: args.redo,
        debug: args.shared.debug,
        serial: args.serial,
    };
    let pipeline = EwMc::new(
        &config,
        &args.shared.input_dir,
        &args.shared.cache_dir,
        &args.shared.output_dir,
        options,
    );

    let start = Instant::now();
    let summary = pipeline
        .run()
        .with_context(|| format!("writing to {}", args.shared.output_dir.display()))?;
    info!(
        "Completed {} filters in {:.1} s",
        summary.completed.len(),
        start.elapsed().as_secs_f64()
    );

    if !summary.failed.is_empty() {
        let names: Vec<&str> = summary.failed.iter().map(|(n, _)| n.as_str()).collect();
        bail!("{} filter(s) failed: {}", names.len(), names.join(", "));
    }
    Ok(())
}

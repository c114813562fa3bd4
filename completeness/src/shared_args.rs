use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigError, PipelineConfig};

/// Common arguments for pipeline binaries
#[derive(Parser, Debug, Clone)]
pub struct SharedPipelineArgs {
    /// Directory holding number counts, mass calibrations and real samples
    #[arg(long, default_value = "inputs")]
    pub input_dir: PathBuf,

    /// Directory for cached synthetic populations
    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Directory for output tables
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// JSON pipeline configuration (built-in SDF filters when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// First filter and first grid point only, without writing tables
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

impl SharedPipelineArgs {
    /// Configuration from `--config`, or the defaults
    pub fn load_config(&self) -> Result<PipelineConfig, ConfigError> {
        match &self.config {
            Some(path) => PipelineConfig::load_from_file(path),
            None => Ok(PipelineConfig::default()),
        }
    }
}

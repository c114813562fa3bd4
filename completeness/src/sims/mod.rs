pub mod ew_mc;

pub use ew_mc::{EwMc, EwMcError, FilterResult, HypothesisResult, RunOptions, RunSummary};

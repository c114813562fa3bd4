//! Shared components and utilities for the completeness workspace.
//!
//! This crate contains the numeric building blocks (interpolation, grids,
//! statistics, seeded random deviates) used by the simulation crates so that
//! they stay consistent with each other.

pub mod algo;
pub mod noise;

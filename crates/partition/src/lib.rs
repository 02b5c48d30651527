#![deny(warnings)]

//! Multi-start partition driver.
//!
//! Sweeps the partition count, seeds each trial (multilevel, spectral,
//! random), polishes with FM (optionally KL), scores through the cost
//! oracle, and reduces to the single best feasible solution. Trials are
//! independent and run in parallel; the reduction is deterministic.

mod driver;
mod seeds;

pub use driver::{run_sweep, DriverConfig, DriverReport, TrialResult};
pub use seeds::{multilevel_seed, random_seed, spectral_seed};

#![deny(warnings)]

//! Partition refinement: K-way Fiduccia-Mattheyses moves and
//! Kernighan-Lin pairwise swaps, both driven by a reach-aware cut cost
//! and periodic floorplan feedback.

mod fm;
mod gain;
mod kl;
mod score;

pub use fm::fm_refine;
pub use gain::CutModel;
pub use kl::kl_refine;
pub use score::evaluate_with_floorplan;

use serde::{Deserialize, Serialize};

/// Knobs shared by the FM and KL refiners.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Outer pass count; each pass ends with a floorplan refresh and an
    /// oracle evaluation.
    pub refiner_iters: usize,
    /// Moves per pass; 0 means one move per vertex.
    pub max_moves_per_pass: usize,
    /// Trigger a floorplan refresh every N accepted moves; 0 defers the
    /// refresh to the end of the pass.
    pub floorplan_every_moves: usize,
    /// Cut-cost multiplier for nets longer than their reach.
    pub long_range_factor: f64,
    /// Balance tolerance around the average partition weight.
    pub balance_factor: f64,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            refiner_iters: 3,
            max_moves_per_pass: 0,
            floorplan_every_moves: 0,
            long_range_factor: 4.0,
            balance_factor: 0.3,
        }
    }
}

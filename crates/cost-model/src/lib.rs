#![deny(warnings)]

//! Chip-tree cost oracle.
//!
//! Turns a candidate (partition, per-partition technology, floorplan
//! geometry) into a single scalar cost covering silicon, assembly, test,
//! and NRE, and decides whether the candidate is feasible at all. The
//! chip tree is a flat arena of records; children reference parents by
//! index so bonding pitch and die separation inherit without cyclic
//! ownership.

mod chip;
mod error;
mod oracle;
mod padgrid;
mod wafer_packing;

pub use chip::{ChipArena, ChipId, ChipNode, Derived};
pub use error::CostError;
pub use oracle::{CostOracle, Evaluation, OracleParams, SharedOracle};
pub use padgrid::{size_pad_grid, PadBucket, PadGrid};
pub use wafer_packing::dies_per_wafer;

use part_core::{Block, Solution};
use tech_lib::area_scale_factor;

/// Silicon area of every partition after rescaling each block from its
/// home node to the partition's assigned node.
pub fn scaled_part_areas(blocks: &[Block], solution: &Solution) -> Vec<f64> {
    let mut areas = vec![0.0; solution.num_parts()];
    for (v, block) in blocks.iter().enumerate() {
        let p = solution.part[v];
        let s = area_scale_factor(
            &block.tech,
            &solution.tech[p],
            block.memory_frac,
            block.logic_frac,
            block.analog_frac,
        );
        areas[p] += block.area_mm2 * s;
    }
    areas
}

#![deny(warnings)]

//! Simulated-annealing sequence-pair floorplanner.
//!
//! Chiplets are soft rectangles (fixed area, aspect ratio chosen from a
//! discrete set). A sequence pair encodes relative placement; annealing
//! searches over pair permutations and aspect ratios for a placement that
//! minimizes bounding-box area plus bandwidth-weighted wirelength while
//! keeping every bundle within its IO reach.

mod anneal;
mod netlist;
mod seqpair;

pub use anneal::{rect_gap, solve, FloorplanConfig};
pub use netlist::{Bundle, ChipletNetlist};
pub use seqpair::SequencePair;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the floorplanner.
#[derive(Debug, Error, PartialEq)]
pub enum FloorplanError {
    /// Annealing produced no layout satisfying every reach and envelope
    /// constraint.
    #[error("no feasible floorplan found")]
    Infeasible,
    /// A bundle references a chiplet outside the netlist.
    #[error("bundle references chiplet {0} outside the netlist")]
    InvalidChiplet(usize),
}

/// A decoded, scored placement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Floorplan {
    /// Chosen width/height ratio per chiplet.
    pub aspect_ratios: Vec<f64>,
    pub widths: Vec<f64>,
    pub heights: Vec<f64>,
    /// Lower-left corners.
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub bbox_width: f64,
    pub bbox_height: f64,
    /// No reach violation and inside the envelope (when one is set).
    pub feasible: bool,
    /// Annealing objective; lower is better.
    pub objective: f64,
}

impl Floorplan {
    /// Center of chiplet `i`.
    pub fn center(&self, i: usize) -> (f64, f64) {
        (
            self.x[i] + self.widths[i] / 2.0,
            self.y[i] + self.heights[i] / 2.0,
        )
    }

    /// Placement rectangle `(x, y, w, h)` of chiplet `i`.
    pub fn rect(&self, i: usize) -> (f64, f64, f64, f64) {
        (self.x[i], self.y[i], self.widths[i], self.heights[i])
    }

    /// All placement rectangles in chiplet order.
    pub fn rects(&self) -> Vec<(f64, f64, f64, f64)> {
        (0..self.x.len()).map(|i| self.rect(i)).collect()
    }

    /// The feasibility flag as an error, for callers that must not
    /// proceed with an infeasible layout.
    pub fn require_feasible(&self) -> Result<(), FloorplanError> {
        if self.feasible {
            Ok(())
        } else {
            Err(FloorplanError::Infeasible)
        }
    }
}

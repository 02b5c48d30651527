use cost_model::{Evaluation, SharedOracle};
use floorplan::{solve, ChipletNetlist, Floorplan, FloorplanConfig};
use part_core::{Block, Hypergraph, PartGeometry, Solution};
use tracing::debug;

/// Floorplan a candidate, write the geometry back into it, and score it
/// through the (lock-guarded) cost oracle.
///
/// This is the one path every optimizer uses to turn a raw partition into
/// a scored solution; the oracle lock is held only for the evaluation
/// itself.
pub fn evaluate_with_floorplan(
    graph: &Hypergraph,
    blocks: &[Block],
    oracle: &SharedOracle,
    fp_cfg: &FloorplanConfig,
    solution: &mut Solution,
) -> (Evaluation, Floorplan) {
    let netlist = match ChipletNetlist::project(graph, blocks, &solution.part, &solution.tech) {
        Ok(nl) => nl,
        Err(err) => {
            debug!(%err, "projection failed; scoring candidate infeasible");
            solution.cost = f64::INFINITY;
            solution.valid = false;
            let empty = Floorplan {
                aspect_ratios: Vec::new(),
                widths: Vec::new(),
                heights: Vec::new(),
                x: Vec::new(),
                y: Vec::new(),
                bbox_width: 0.0,
                bbox_height: 0.0,
                feasible: false,
                objective: f64::INFINITY,
            };
            return (Evaluation::invalid(), empty);
        }
    };
    let plan = solve(&netlist, fp_cfg);
    solution.geometry = (0..solution.num_parts())
        .map(|p| PartGeometry {
            aspect_ratio: plan.aspect_ratios.get(p).copied().unwrap_or(1.0),
            x: plan.x.get(p).copied().unwrap_or(0.0),
            y: plan.y.get(p).copied().unwrap_or(0.0),
        })
        .collect();
    let eval = {
        let guard = oracle.lock().expect("oracle lock poisoned");
        guard.evaluate(solution, plan.feasible)
    };
    solution.cost = eval.cost;
    solution.valid = eval.valid;
    (eval, plan)
}

use crate::{evaluate_with_floorplan, CutModel, RefineConfig};
use cost_model::SharedOracle;
use floorplan::{solve, ChipletNetlist, FloorplanConfig};
use part_core::{Block, Hypergraph, Solution};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, trace};

/// Gain-ordered queue entry. Stale entries are detected on pop by
/// recomputing the gain.
#[derive(Debug)]
struct QueueEntry {
    gain: f64,
    vertex: usize,
    to: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on gain; deterministic tie-break on (vertex, target).
        self.gain
            .total_cmp(&other.gain)
            .then(other.vertex.cmp(&self.vertex))
            .then(other.to.cmp(&self.to))
    }
}

struct MoveRecord {
    vertex: usize,
    from: usize,
}

/// K-way FM refinement with best-prefix rollback.
///
/// Returns the refined solution; the input is returned unchanged when no
/// improving pass exists. The solution's cost/validity are refreshed from
/// the oracle after every pass.
pub fn fm_refine(
    graph: &Hypergraph,
    blocks: &[Block],
    oracle: &SharedOracle,
    fp_cfg: &FloorplanConfig,
    cfg: &RefineConfig,
    solution: &mut Solution,
) {
    let k = solution.num_parts();
    if k < 2 || graph.num_vertices() == 0 {
        let _ = evaluate_with_floorplan(graph, blocks, oracle, fp_cfg, solution);
        return;
    }
    let (upper, lower) = graph.balance_bounds(k, cfg.balance_factor);
    let mut model = CutModel::new(graph, cfg.long_range_factor);

    let mut best = solution.clone();
    let (eval, plan) = evaluate_with_floorplan(graph, blocks, oracle, fp_cfg, solution);
    best.cost = eval.cost;
    best.valid = eval.valid;
    best.geometry = solution.geometry.clone();
    if plan.feasible {
        model.set_rects(plan.rects());
    }

    for pass in 0..cfg.refiner_iters.max(1) {
        let moved = fm_pass(graph, blocks, fp_cfg, cfg, &mut model, solution, &upper, &lower);
        let (eval, plan) = evaluate_with_floorplan(graph, blocks, oracle, fp_cfg, solution);
        if plan.feasible {
            model.set_rects(plan.rects());
        }
        trace!(pass, moved, cost = eval.cost, "fm pass complete");
        if eval.valid && eval.cost < best.cost {
            best = solution.clone();
        }
        if moved == 0 {
            break;
        }
    }
    if best.valid || best.cost < solution.cost {
        *solution = best;
    }
    debug!(cost = solution.cost, valid = solution.valid, "fm refinement done");
}

/// One locked pass over the gain queue. Returns the number of moves kept
/// after rolling back to the best prefix.
#[allow(clippy::too_many_arguments)]
fn fm_pass(
    graph: &Hypergraph,
    blocks: &[Block],
    fp_cfg: &FloorplanConfig,
    cfg: &RefineConfig,
    model: &mut CutModel<'_>,
    solution: &mut Solution,
    upper: &[f64],
    lower: &[f64],
) -> usize {
    let n = graph.num_vertices();
    let k = solution.num_parts();
    let mut part = solution.part.clone();
    let mut weights = part_weights(graph, &part, k);
    let mut locked = vec![false; n];
    let max_moves = if cfg.max_moves_per_pass == 0 {
        n
    } else {
        cfg.max_moves_per_pass.min(n)
    };

    let mut heap = BinaryHeap::with_capacity(n);
    for v in 0..n {
        push_best_move(&mut heap, model, &mut part, v, k);
    }

    let mut history: Vec<MoveRecord> = Vec::new();
    let mut cumulative = 0.0f64;
    let mut best_cumulative = 0.0f64;
    let mut best_prefix = 0usize;

    while let Some(entry) = heap.pop() {
        if history.len() >= max_moves {
            break;
        }
        let v = entry.vertex;
        if locked[v] || entry.to == part[v] {
            continue;
        }
        let gain = model.move_gain(&mut part, v, entry.to);
        if (gain - entry.gain).abs() > 1e-9 {
            // Stale entry; requeue at the fresh gain.
            heap.push(QueueEntry {
                gain,
                vertex: v,
                to: entry.to,
            });
            continue;
        }
        if !move_is_legal(graph, &weights, v, part[v], entry.to, upper, lower) {
            continue;
        }

        let from = part[v];
        apply_move(graph, &mut weights, v, from, entry.to);
        part[v] = entry.to;
        locked[v] = true;
        cumulative += gain;
        history.push(MoveRecord { vertex: v, from });
        if cumulative > best_cumulative {
            best_cumulative = cumulative;
            best_prefix = history.len();
        }

        // Refresh the gains of unlocked neighbors.
        if let Ok(edges) = graph.edges_of(v) {
            let edges = edges.to_vec();
            for e in edges {
                if let Ok(pins) = graph.vertices_of(e) {
                    let pins = pins.to_vec();
                    for u in pins {
                        if !locked[u] {
                            push_best_move(&mut heap, model, &mut part, u, k);
                        }
                    }
                }
            }
        }

        if cfg.floorplan_every_moves > 0 && history.len() % cfg.floorplan_every_moves == 0 {
            // Centers shift under the queued gains; the lazy revalidation
            // on pop absorbs the staleness.
            let probe = Solution {
                part: part.clone(),
                tech: solution.tech.clone(),
                geometry: solution.geometry.clone(),
                cost: f64::INFINITY,
                valid: false,
            };
            if let Some(rects) = rects_for(graph, blocks, &probe, fp_cfg) {
                model.set_rects(rects);
            }
        }
    }

    // Canonical FM rollback: undo everything past the best prefix.
    for record in history.iter().skip(best_prefix).rev() {
        part[record.vertex] = record.from;
    }
    if best_prefix > 0 {
        solution.part = part;
    }
    best_prefix
}

fn part_weights(graph: &Hypergraph, part: &[usize], k: usize) -> Vec<Vec<f64>> {
    let mut weights = vec![vec![0.0; graph.weight_dim()]; k];
    for (v, &p) in part.iter().enumerate() {
        for (acc, w) in weights[p].iter_mut().zip(graph.vertex_weight(v)) {
            *acc += w;
        }
    }
    weights
}

fn move_is_legal(
    graph: &Hypergraph,
    weights: &[Vec<f64>],
    v: usize,
    from: usize,
    to: usize,
    upper: &[f64],
    lower: &[f64],
) -> bool {
    let w = graph.vertex_weight(v);
    for d in 0..w.len() {
        if weights[to][d] + w[d] > upper[d] {
            return false;
        }
        if weights[from][d] - w[d] < lower[d] {
            return false;
        }
    }
    true
}

fn apply_move(graph: &Hypergraph, weights: &mut [Vec<f64>], v: usize, from: usize, to: usize) {
    let w = graph.vertex_weight(v).to_vec();
    for d in 0..w.len() {
        weights[from][d] -= w[d];
        weights[to][d] += w[d];
    }
}

fn push_best_move(
    heap: &mut BinaryHeap<QueueEntry>,
    model: &CutModel<'_>,
    part: &mut Vec<usize>,
    v: usize,
    k: usize,
) {
    let from = part[v];
    let mut best: Option<(f64, usize)> = None;
    for to in 0..k {
        if to == from {
            continue;
        }
        let gain = model.move_gain(part, v, to);
        if best.map_or(true, |(g, _)| gain > g) {
            best = Some((gain, to));
        }
    }
    if let Some((gain, to)) = best {
        heap.push(QueueEntry {
            gain,
            vertex: v,
            to,
        });
    }
}

/// Convenience for mid-pass refreshes: floorplan rectangles for a bare
/// partition without touching the oracle.
pub(crate) fn rects_for(
    graph: &Hypergraph,
    blocks: &[Block],
    solution: &Solution,
    fp_cfg: &FloorplanConfig,
) -> Option<Vec<(f64, f64, f64, f64)>> {
    let netlist =
        ChipletNetlist::project(graph, blocks, &solution.part, &solution.tech).ok()?;
    let plan = solve(&netlist, fp_cfg);
    Some(plan.rects())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RefineConfig;
    use cost_model::{CostOracle, OracleParams};
    use part_core::PartGeometry;
    use tech_lib::builtin::reference_library;

    fn blocks(n: usize) -> Vec<Block> {
        (0..n)
            .map(|i| Block {
                name: format!("b{i}"),
                area_mm2: 4.0,
                power_w: 0.2,
                tech: "7nm".to_string(),
                memory_frac: 0.2,
                logic_frac: 0.7,
                analog_frac: 0.1,
            })
            .collect()
    }

    /// Two 4-cliques joined by a single weak net.
    fn clustered_graph() -> Hypergraph {
        let mut edges = Vec::new();
        let mut weights = Vec::new();
        for base in [0usize, 4] {
            for i in 0..4 {
                for j in i + 1..4 {
                    edges.push(vec![base + i, base + j]);
                    weights.push(vec![32.0]);
                }
            }
        }
        edges.push(vec![3, 4]);
        weights.push(vec![1.0]);
        let m = edges.len();
        Hypergraph::new(
            edges,
            vec![vec![4.0, 0.2]; 8],
            weights,
            vec![2.0; m],
            vec![0.05; m],
            vec!["UCIe_standard".to_string(); m],
        )
        .unwrap()
    }

    fn shared_oracle(graph: &Hypergraph) -> SharedOracle {
        let lib = reference_library();
        CostOracle::new(
            graph.clone(),
            blocks(8),
            lib.wafers,
            lib.layers,
            lib.ios,
            lib.assemblies.into_iter().next().unwrap(),
            lib.tests.into_iter().next().unwrap(),
            OracleParams::default(),
        )
        .into_shared()
    }

    fn quick_fp() -> FloorplanConfig {
        FloorplanConfig {
            max_steps: 1_500,
            num_workers: 1,
            ..Default::default()
        }
    }

    fn scrambled() -> Solution {
        Solution {
            // Interleaved: every clique edge is cut.
            part: vec![0, 1, 0, 1, 0, 1, 0, 1],
            tech: vec!["7nm".to_string(), "7nm".to_string()],
            geometry: vec![PartGeometry::default(); 2],
            cost: f64::INFINITY,
            valid: false,
        }
    }

    #[test]
    fn fm_recovers_the_natural_bisection() {
        let graph = clustered_graph();
        let oracle = shared_oracle(&graph);
        let cfg = RefineConfig::default();
        let mut sol = scrambled();
        let before_cut = sol.cut_size(&graph);
        fm_refine(&graph, &blocks(8), &oracle, &quick_fp(), &cfg, &mut sol);
        let after_cut = sol.cut_size(&graph);
        assert!(after_cut < before_cut);
        // The natural bisection cuts exactly the one weak net.
        assert_eq!(after_cut, 1);
        assert!(sol.validate().is_ok());
    }

    #[test]
    fn fm_respects_balance_bounds() {
        let graph = clustered_graph();
        let oracle = shared_oracle(&graph);
        let cfg = RefineConfig {
            balance_factor: 0.1,
            ..Default::default()
        };
        let mut sol = scrambled();
        fm_refine(&graph, &blocks(8), &oracle, &quick_fp(), &cfg, &mut sol);
        let (upper, lower) = graph.balance_bounds(2, 0.1);
        for w in sol.part_weights(&graph) {
            for d in 0..w.len() {
                assert!(w[d] <= upper[d] + 1e-9);
                assert!(w[d] >= lower[d] - 1e-9);
            }
        }
    }

    #[test]
    fn fm_never_worsens_a_good_partition() {
        let graph = clustered_graph();
        let oracle = shared_oracle(&graph);
        let cfg = RefineConfig::default();
        let mut sol = scrambled();
        sol.part = vec![0, 0, 0, 0, 1, 1, 1, 1];
        fm_refine(&graph, &blocks(8), &oracle, &quick_fp(), &cfg, &mut sol);
        assert_eq!(sol.cut_size(&graph), 1);
    }

    #[test]
    fn single_partition_is_a_no_op_with_a_score() {
        let graph = clustered_graph();
        let oracle = shared_oracle(&graph);
        let cfg = RefineConfig::default();
        let mut sol = Solution::trivial(8, "7nm");
        fm_refine(&graph, &blocks(8), &oracle, &quick_fp(), &cfg, &mut sol);
        assert_eq!(sol.part, vec![0; 8]);
        assert!(sol.valid);
        assert!(sol.cost.is_finite());
    }
}

use crate::fm::rects_for;
use crate::{evaluate_with_floorplan, CutModel, RefineConfig};
use cost_model::SharedOracle;
use floorplan::FloorplanConfig;
use itertools::Itertools;
use part_core::{Block, Hypergraph, Solution};
use tracing::{debug, trace};

/// Kernighan-Lin pairwise-swap refinement.
///
/// Each pass greedily executes the best legal swap among unlocked vertex
/// pairs in different partitions, locks the pair, and finally rolls back
/// to the best cumulative prefix. Interchangeable with an FM pass over
/// the same cut model.
pub fn kl_refine(
    graph: &Hypergraph,
    blocks: &[Block],
    oracle: &SharedOracle,
    fp_cfg: &FloorplanConfig,
    cfg: &RefineConfig,
    solution: &mut Solution,
) {
    let k = solution.num_parts();
    if k < 2 || graph.num_vertices() < 2 {
        let _ = evaluate_with_floorplan(graph, blocks, oracle, fp_cfg, solution);
        return;
    }
    let (upper, lower) = graph.balance_bounds(k, cfg.balance_factor);
    let mut model = CutModel::new(graph, cfg.long_range_factor);
    if let Some(rects) = rects_for(graph, blocks, solution, fp_cfg) {
        model.set_rects(rects);
    }

    let mut best = solution.clone();
    let (eval, _) = evaluate_with_floorplan(graph, blocks, oracle, fp_cfg, solution);
    best.cost = eval.cost;
    best.valid = eval.valid;
    best.geometry = solution.geometry.clone();

    for pass in 0..cfg.refiner_iters.max(1) {
        let swapped = kl_pass(graph, cfg, &model, solution, &upper, &lower);
        let (eval, plan) = evaluate_with_floorplan(graph, blocks, oracle, fp_cfg, solution);
        if plan.feasible {
            model.set_rects(plan.rects());
        }
        trace!(pass, swapped, cost = eval.cost, "kl pass complete");
        if eval.valid && eval.cost < best.cost {
            best = solution.clone();
        }
        if swapped == 0 {
            break;
        }
    }
    if best.valid || best.cost < solution.cost {
        *solution = best;
    }
    debug!(cost = solution.cost, valid = solution.valid, "kl refinement done");
}

fn kl_pass(
    graph: &Hypergraph,
    cfg: &RefineConfig,
    model: &CutModel<'_>,
    solution: &mut Solution,
    upper: &[f64],
    lower: &[f64],
) -> usize {
    let n = graph.num_vertices();
    let mut part = solution.part.clone();
    let mut weights = part_weights(graph, &part, solution.num_parts());
    let mut locked = vec![false; n];
    let max_swaps = if cfg.max_moves_per_pass == 0 {
        n / 2
    } else {
        cfg.max_moves_per_pass
    };

    let mut history: Vec<(usize, usize, f64)> = Vec::new();
    let mut cumulative = 0.0;
    let mut best_cumulative = 0.0;
    let mut best_prefix = 0usize;

    while history.len() < max_swaps {
        let mut best_pair: Option<(f64, usize, usize)> = None;
        for (u, v) in (0..n).tuple_combinations() {
            if locked[u] || locked[v] || part[u] == part[v] {
                continue;
            }
            if !swap_is_legal(graph, &weights, u, v, &part, upper, lower) {
                continue;
            }
            let gain = model.swap_gain(&mut part, u, v);
            if best_pair.map_or(true, |(g, _, _)| gain > g) {
                best_pair = Some((gain, u, v));
            }
        }
        let Some((gain, u, v)) = best_pair else {
            break;
        };
        // KL continues through locally negative swaps; the best-prefix
        // rollback undoes any tail that never paid off.
        apply_swap(graph, &mut weights, u, v, &part);
        part.swap(u, v);
        locked[u] = true;
        locked[v] = true;
        cumulative += gain;
        history.push((u, v, gain));
        if cumulative > best_cumulative {
            best_cumulative = cumulative;
            best_prefix = history.len();
        }
        if gain <= 0.0 && cumulative < best_cumulative - 1e2 {
            // Deep in the red; further swaps cannot recover this pass.
            break;
        }
    }

    for &(u, v, _) in history.iter().skip(best_prefix).rev() {
        part.swap(u, v);
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

fn swap_is_legal(
    graph: &Hypergraph,
    weights: &[Vec<f64>],
    u: usize,
    v: usize,
    part: &[usize],
    upper: &[f64],
    lower: &[f64],
) -> bool {
    let (pu, pv) = (part[u], part[v]);
    let wu = graph.vertex_weight(u);
    let wv = graph.vertex_weight(v);
    for d in 0..wu.len() {
        let new_pu = weights[pu][d] - wu[d] + wv[d];
        let new_pv = weights[pv][d] - wv[d] + wu[d];
        if new_pu > upper[d] || new_pu < lower[d] || new_pv > upper[d] || new_pv < lower[d] {
            return false;
        }
    }
    true
}

fn apply_swap(graph: &Hypergraph, weights: &mut [Vec<f64>], u: usize, v: usize, part: &[usize]) {
    let (pu, pv) = (part[u], part[v]);
    let wu = graph.vertex_weight(u).to_vec();
    let wv = graph.vertex_weight(v).to_vec();
    for d in 0..wu.len() {
        weights[pu][d] += wv[d] - wu[d];
        weights[pv][d] += wu[d] - wv[d];
    }
}

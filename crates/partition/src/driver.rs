use crate::{multilevel_seed, random_seed, spectral_seed};
use cost_model::{Evaluation, SharedOracle};
use floorplan::FloorplanConfig;
use part_core::{PartGeometry, Solution};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use refine::{evaluate_with_floorplan, fm_refine, kl_refine, RefineConfig};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Sweep and trial configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverConfig {
    pub min_parts: usize,
    pub max_parts: usize,
    /// Seeded trials per partition count.
    pub num_trials: usize,
    /// Technology node assigned to every partition.
    pub tech: String,
    pub seed: u64,
    /// Candidates retained for the report.
    pub top_n: usize,
    /// Follow the FM polish with a KL pass.
    pub use_kl: bool,
    pub refine: RefineConfig,
    pub floorplan: FloorplanConfig,
    /// Wall-clock budget; the sweep stops between partition counts and
    /// returns the best so far.
    pub time_budget: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            min_parts: 1,
            max_parts: 8,
            num_trials: 4,
            tech: "7nm".to_string(),
            seed: 1,
            top_n: 5,
            use_kl: false,
            refine: RefineConfig::default(),
            floorplan: FloorplanConfig::default(),
            time_budget: None,
        }
    }
}

/// One scored trial.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrialResult {
    pub solution: Solution,
    pub evaluation: Evaluation,
    pub k: usize,
    pub trial: usize,
}

/// Sweep outcome: the winner, the short list, and the timing breakdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverReport {
    /// Best feasible solution, if any trial produced one.
    pub best: Option<TrialResult>,
    /// Top candidates by cost (feasible first).
    pub top: Vec<TrialResult>,
    /// Seconds spent per swept partition count.
    pub per_k_seconds: Vec<(usize, f64)>,
    pub total_seconds: f64,
}

/// Run the k-sweep over the shared oracle.
pub fn run_sweep(oracle: &SharedOracle, cfg: &DriverConfig) -> DriverReport {
    let started = Instant::now();
    let (graph, blocks) = {
        let guard = oracle.lock().expect("oracle lock poisoned");
        (guard.graph().clone(), guard.blocks().to_vec())
    };

    let mut candidates: Vec<TrialResult> = Vec::new();
    let mut per_k_seconds = Vec::new();
    let lo = cfg.min_parts.max(1);
    let hi = cfg.max_parts.max(lo).min(graph.num_vertices().max(1));

    for k in lo..=hi {
        if let Some(budget) = cfg.time_budget {
            if started.elapsed() >= budget {
                info!(k, "time budget exhausted; returning best so far");
                break;
            }
        }
        let k_started = Instant::now();
        let trials = if k == 1 { 1 } else { cfg.num_trials.max(1) };
        let mut results: Vec<TrialResult> = (0..trials)
            .into_par_iter()
            .map(|trial| {
                let mut solution = seed_solution(&graph, cfg, k, trial);
                polish(&graph, &blocks, oracle, cfg, &mut solution);
                let (evaluation, _) = evaluate_with_floorplan(
                    &graph,
                    &blocks,
                    oracle,
                    &cfg.floorplan,
                    &mut solution,
                );
                let (upper, lower) = graph.balance_bounds(solution.num_parts(), cfg.refine.balance_factor);
                if let Err(err) = solution.check_balance(&graph, &upper, &lower) {
                    debug!(%err, k, trial, "trial finished outside the balance bounds");
                }
                TrialResult {
                    solution,
                    evaluation,
                    k,
                    trial,
                }
            })
            .collect();
        results.sort_by(|a, b| order_key(a, b));
        debug!(
            k,
            best_cost = results.first().map(|r| r.solution.cost),
            "k-sweep step complete"
        );
        candidates.extend(results);
        per_k_seconds.push((k, k_started.elapsed().as_secs_f64()));
    }

    candidates.sort_by(order_key);
    let best = candidates
        .iter()
        .find(|c| c.solution.valid)
        .cloned();
    candidates.truncate(cfg.top_n.max(1));
    if let Some(b) = &best {
        info!(
            k = b.k,
            cost = b.solution.cost,
            "partition sweep finished with a feasible winner"
        );
    } else {
        info!("partition sweep finished without a feasible solution");
    }
    DriverReport {
        best,
        top: candidates,
        per_k_seconds,
        total_seconds: started.elapsed().as_secs_f64(),
    }
}

/// Deterministic candidate order: feasible first, then cost, then trial
/// index (worker), then partition count.
fn order_key(a: &TrialResult, b: &TrialResult) -> std::cmp::Ordering {
    b.solution
        .valid
        .cmp(&a.solution.valid)
        .then(a.solution.cost.total_cmp(&b.solution.cost))
        .then(a.trial.cmp(&b.trial))
        .then(a.k.cmp(&b.k))
}

fn seed_solution(
    graph: &part_core::Hypergraph,
    cfg: &DriverConfig,
    k: usize,
    trial: usize,
) -> Solution {
    let part = match trial {
        0 => multilevel_seed(graph, k),
        1 => spectral_seed(graph, k),
        _ => {
            let mut rng = ChaCha8Rng::seed_from_u64(
                cfg.seed
                    .wrapping_add(k as u64 * 1_000)
                    .wrapping_add(trial as u64),
            );
            random_seed(graph, k, &mut rng)
        }
    };
    let mut solution = Solution {
        part,
        tech: vec![cfg.tech.clone(); k],
        geometry: vec![PartGeometry::default(); k],
        cost: f64::INFINITY,
        valid: false,
    };
    // Seeds may collapse below k on tiny graphs; keep IDs dense either way.
    solution.renumber_dense();
    solution
}

fn polish(
    graph: &part_core::Hypergraph,
    blocks: &[part_core::Block],
    oracle: &SharedOracle,
    cfg: &DriverConfig,
    solution: &mut Solution,
) {
    fm_refine(
        graph,
        blocks,
        oracle,
        &cfg.floorplan,
        &cfg.refine,
        solution,
    );
    if cfg.use_kl {
        kl_refine(
            graph,
            blocks,
            oracle,
            &cfg.floorplan,
            &cfg.refine,
            solution,
        );
    }
}

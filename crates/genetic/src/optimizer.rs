use crate::individual::{balanced_partition, random_techs};
use crate::{canonical_key, canonicalize, crossover, mutate, repair, GaConfig, Individual};
use cost_model::SharedOracle;
use floorplan::FloorplanConfig;
use part_core::{Block, Hypergraph, PartGeometry, Solution};
use partition::{multilevel_seed, random_seed, spectral_seed};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use refine::{fm_refine, RefineConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// Everything the genetic loop needs besides its own configuration.
pub struct GaContext {
    pub oracle: SharedOracle,
    /// Technology nodes the optimizer may assign.
    pub available_techs: Vec<String>,
    pub refine: RefineConfig,
    pub floorplan: FloorplanConfig,
    pub seed: u64,
}

/// Outcome of one genetic run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaReport {
    /// Best validated individual, if any generation produced one.
    pub best: Option<Individual>,
    pub generations_run: usize,
    /// Best cost after each generation.
    pub history: Vec<f64>,
    pub total_seconds: f64,
}

/// Fitness memo shared across a run, keyed by the canonical form. The
/// refined solution is cached alongside its cost so hit and miss paths
/// leave an individual in the identical state regardless of which worker
/// got there first.
struct FitnessCache {
    map: Mutex<HashMap<String, Solution>>,
}

impl FitnessCache {
    fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<Solution> {
        self.map.lock().expect("fitness cache poisoned").get(key).cloned()
    }

    fn put(&self, key: String, value: Solution) {
        self.map
            .lock()
            .expect("fitness cache poisoned")
            .insert(key, value);
    }
}

/// Run the genetic technology optimizer.
pub fn run_ga(ctx: &GaContext, cfg: &GaConfig) -> GaReport {
    let started = std::time::Instant::now();
    let (graph, blocks) = {
        let guard = ctx.oracle.lock().expect("oracle lock poisoned");
        (guard.graph().clone(), guard.blocks().to_vec())
    };
    let mut rng = ChaCha8Rng::seed_from_u64(ctx.seed);
    let cache = FitnessCache::new();

    let mut population = initial_population(&graph, &blocks, ctx, cfg, &mut rng);
    // Evaluations run in parallel; each one serializes on the oracle lock.
    population
        .par_iter_mut()
        .for_each(|ind| evaluate(ind, &graph, &blocks, ctx, &cache));
    sort_population(&mut population);

    let mut best = population.first().filter(|i| i.solution.valid).cloned();
    let mut history = Vec::with_capacity(cfg.num_generations);
    history.push(best.as_ref().map_or(f64::INFINITY, |b| b.fitness));
    let mut stale_generations = 0usize;
    let mut generations_run = 0usize;

    for generation in 0..cfg.num_generations {
        generations_run = generation + 1;
        let mut next: Vec<Individual> = Vec::with_capacity(cfg.population_size);
        // Elitism: the best validated individual survives unchanged.
        if let Some(b) = &best {
            for _ in 0..cfg.elite_count.max(1).min(cfg.population_size) {
                next.push(b.clone());
            }
        }
        while next.len() < cfg.population_size {
            let p1 = tournament(&population, cfg, &mut rng);
            let p2 = tournament(&population, cfg, &mut rng);
            let mut child = if rng.gen_bool(cfg.crossover_rate.clamp(0.0, 1.0)) {
                crossover(&population[p1], &population[p2], &mut rng)
            } else {
                population[p1.min(p2)].solution.clone()
            };
            if rng.gen_bool(cfg.mutation_rate.clamp(0.0, 1.0)) {
                mutate(&mut child, &ctx.available_techs, cfg, &mut rng);
            }
            // Repair, then (optionally) canonicalize, then validate.
            repair(&mut child, &ctx.available_techs, cfg, &mut rng);
            if cfg.canonical {
                canonicalize(&mut child);
            }
            if child.validate().is_err() {
                // Repair failed to produce a structurally sound child;
                // drop it from the gene pool.
                continue;
            }
            next.push(Individual::new(child));
        }

        next.par_iter_mut().for_each(|ind| {
            if ind.fitness.is_infinite() {
                evaluate(ind, &graph, &blocks, ctx, &cache);
            }
        });
        sort_population(&mut next);
        population = next;

        let generation_best = population.first().filter(|i| i.solution.valid).cloned();
        let prev_cost = best.as_ref().map_or(f64::INFINITY, |b| b.fitness);
        if let Some(gb) = generation_best {
            if gb.fitness < prev_cost {
                best = Some(gb);
            }
        }
        let new_cost = best.as_ref().map_or(f64::INFINITY, |b| b.fitness);
        history.push(new_cost);
        // Relative-improvement convergence gate.
        let improved = prev_cost.is_infinite() && new_cost.is_finite()
            || (prev_cost.is_finite() && (prev_cost - new_cost) / prev_cost.abs().max(1e-12) > 1e-3);
        if improved {
            stale_generations = 0;
        } else {
            stale_generations += 1;
        }
        debug!(
            generation,
            best_cost = new_cost,
            stale = stale_generations,
            "generation complete"
        );
        if stale_generations >= cfg.max_no_improvement {
            info!(generation, "converged: no relative improvement");
            break;
        }
    }

    info!(
        generations_run,
        best_cost = best.as_ref().map_or(f64::INFINITY, |b| b.fitness),
        "genetic optimization finished"
    );
    GaReport {
        best,
        generations_run,
        history,
        total_seconds: started.elapsed().as_secs_f64(),
    }
}

fn initial_population(
    graph: &Hypergraph,
    blocks: &[Block],
    ctx: &GaContext,
    cfg: &GaConfig,
    rng: &mut ChaCha8Rng,
) -> Vec<Individual> {
    let areas: Vec<f64> = blocks.iter().map(|b| b.area_mm2).collect();
    let lo = cfg.min_parts.max(1);
    let hi = cfg.max_parts.max(lo).min(graph.num_vertices().max(1));
    let mut population = Vec::with_capacity(cfg.population_size);

    // Mixed seeding: balanced, multilevel, spectral, random for every k.
    'outer: loop {
        for k in lo..=hi {
            for strategy in 0..4usize {
                if population.len() >= cfg.population_size {
                    break 'outer;
                }
                let part = match strategy {
                    0 => balanced_partition(&areas, k),
                    1 => multilevel_seed(graph, k),
                    2 => spectral_seed(graph, k),
                    _ => random_seed(graph, k, rng),
                };
                let mut solution = Solution {
                    part,
                    tech: random_techs(k, &ctx.available_techs, rng),
                    geometry: vec![PartGeometry::default(); k],
                    cost: f64::INFINITY,
                    valid: false,
                };
                repair(&mut solution, &ctx.available_techs, cfg, rng);
                population.push(Individual::new(solution));
            }
        }
        if lo == hi && population.len() >= 4 {
            // Tiny range: the deterministic seeds repeat; top up randomly.
            while population.len() < cfg.population_size {
                let k = lo;
                let mut solution = Solution {
                    part: random_seed(graph, k, rng),
                    tech: random_techs(k, &ctx.available_techs, rng),
                    geometry: vec![PartGeometry::default(); k],
                    cost: f64::INFINITY,
                    valid: false,
                };
                repair(&mut solution, &ctx.available_techs, cfg, rng);
                population.push(Individual::new(solution));
            }
            break;
        }
    }
    population
}

/// Fitness: oracle cost after a floorplan pass and a short FM polish,
/// memoized under the canonical key. Infeasible individuals score
/// infinity and can never become the best.
fn evaluate(
    ind: &mut Individual,
    graph: &Hypergraph,
    blocks: &[Block],
    ctx: &GaContext,
    cache: &FitnessCache,
) {
    let key = canonical_key(&ind.solution);
    if let Some(cached) = cache.get(&key) {
        ind.fitness = if cached.valid {
            cached.cost
        } else {
            f64::INFINITY
        };
        ind.solution = cached;
        return;
    }
    // Score the canonical representative: symmetric labelings must agree
    // on fitness, even when two of them race on a cache miss, and the
    // refinement is deterministic given that representative.
    canonicalize(&mut ind.solution);
    let short = RefineConfig {
        refiner_iters: 1,
        ..ctx.refine.clone()
    };
    fm_refine(graph, blocks, &ctx.oracle, &ctx.floorplan, &short, &mut ind.solution);
    ind.fitness = if ind.solution.valid {
        ind.solution.cost
    } else {
        f64::INFINITY
    };
    cache.put(key, ind.solution.clone());
}

fn sort_population(population: &mut [Individual]) {
    population.sort_by(|a, b| {
        b.solution
            .valid
            .cmp(&a.solution.valid)
            .then(a.fitness.total_cmp(&b.fitness))
    });
}

/// N-way tournament: the fittest of `tournament_size` random picks.
fn tournament(population: &[Individual], cfg: &GaConfig, rng: &mut ChaCha8Rng) -> usize {
    let n = population.len();
    let mut winner = rng.gen_range(0..n);
    for _ in 1..cfg.tournament_size.max(1) {
        let challenger = rng.gen_range(0..n);
        if population[challenger].fitness < population[winner].fitness {
            winner = challenger;
        }
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;
    use cost_model::{CostOracle, OracleParams};
    use tech_lib::builtin::reference_library;

    fn blocks(n: usize) -> Vec<Block> {
        (0..n)
            .map(|i| Block {
                name: format!("b{i}"),
                area_mm2: if i % 3 == 0 { 6.0 } else { 2.0 },
                power_w: 0.1,
                tech: "7nm".to_string(),
                memory_frac: 0.3,
                logic_frac: 0.6,
                analog_frac: 0.1,
            })
            .collect()
    }

    /// 11 vertices, 20 hyperedges: a small SoC-like mesh.
    fn adi_like_graph() -> Hypergraph {
        let mut edges = Vec::new();
        for i in 0..10usize {
            edges.push(vec![i, i + 1]);
        }
        for i in 0..9usize {
            edges.push(vec![i, i + 2]);
        }
        edges.push(vec![0, 5, 10]);
        let m = edges.len();
        assert_eq!(m, 20);
        Hypergraph::new(
            edges,
            blocks(11).iter().map(|b| vec![b.area_mm2, b.power_w]).collect(),
            vec![vec![24.0]; m],
            vec![2.0; m],
            vec![0.05; m],
            vec!["UCIe_standard".to_string(); m],
        )
        .unwrap()
    }

    fn context(seed: u64) -> GaContext {
        let lib = reference_library();
        let oracle = CostOracle::new(
            adi_like_graph(),
            blocks(11),
            lib.wafers,
            lib.layers,
            lib.ios,
            lib.assemblies.into_iter().next().unwrap(),
            lib.tests.into_iter().next().unwrap(),
            OracleParams::default(),
        )
        .into_shared();
        GaContext {
            oracle,
            available_techs: vec!["7nm".into(), "10nm".into(), "45nm".into()],
            refine: RefineConfig {
                refiner_iters: 1,
                ..Default::default()
            },
            floorplan: FloorplanConfig {
                max_steps: 800,
                num_workers: 1,
                ..Default::default()
            },
            seed,
        }
    }

    fn quick_cfg() -> GaConfig {
        GaConfig {
            num_generations: 6,
            population_size: 12,
            max_parts: 4,
            ..Default::default()
        }
    }

    #[test]
    fn ga_finds_a_validated_solution() {
        let report = run_ga(&context(1), &quick_cfg());
        let best = report.best.expect("validated best");
        assert!(best.solution.valid);
        assert!(best.fitness.is_finite());
        assert!(best.solution.validate().is_ok());
        assert_eq!(best.solution.tech.len(), best.k());
        assert!(best
            .solution
            .tech
            .iter()
            .all(|t| ["7nm", "10nm", "45nm"].contains(&t.as_str())));
    }

    #[test]
    fn best_cost_never_regresses_across_generations() {
        let report = run_ga(&context(1), &quick_cfg());
        for pair in report.history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    #[test]
    fn same_seed_is_deterministic() {
        let a = run_ga(&context(7), &quick_cfg());
        let b = run_ga(&context(7), &quick_cfg());
        let (a, b) = (a.best.unwrap(), b.best.unwrap());
        assert_eq!(a.fitness, b.fitness);
        assert_eq!(a.solution.part, b.solution.part);
        assert_eq!(a.solution.tech, b.solution.tech);
    }

    #[test]
    fn canonical_mode_still_converges() {
        let cfg = GaConfig {
            canonical: true,
            ..quick_cfg()
        };
        let report = run_ga(&context(3), &cfg);
        let best = report.best.expect("validated best");
        assert!(best.solution.valid);
        assert!(best.solution.validate().is_ok());
        for pair in report.history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }
}

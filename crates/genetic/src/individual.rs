use crate::GaConfig;
use part_core::{PartGeometry, Solution};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// One member of the population: a solution plus its cached fitness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Individual {
    pub solution: Solution,
    /// Oracle cost; infinity until evaluated or when infeasible.
    pub fitness: f64,
}

impl Individual {
    pub fn new(solution: Solution) -> Self {
        Self {
            solution,
            fitness: f64::INFINITY,
        }
    }

    pub fn k(&self) -> usize {
        self.solution.num_parts()
    }
}

/// Rewrite a solution into canonical form: partition IDs renumbered in
/// order of first appearance over the vertex scan, tech and geometry
/// permuted alongside. Symmetric individuals collapse to one
/// representation.
pub fn canonicalize(solution: &mut Solution) {
    solution.renumber_dense();
}

/// Memoization key: the canonical partition-class representation joined
/// with the (correspondingly permuted) tech tuple.
pub fn canonical_key(solution: &Solution) -> String {
    let mut canonical = solution.clone();
    canonical.renumber_dense();
    let parts: Vec<String> = canonical.part.iter().map(|p| p.to_string()).collect();
    format!("{}|{}", parts.join(","), canonical.tech.join(","))
}

/// Repair a solution in place so it satisfies every structural invariant:
/// dense partition IDs starting at 0, `|tech| == |geometry| == k`, every
/// tech drawn from `available`, and `k` clamped into the configured
/// range. Repairing an already-valid solution is a no-op.
pub fn repair(
    solution: &mut Solution,
    available: &[String],
    cfg: &GaConfig,
    rng: &mut ChaCha8Rng,
) {
    let max_parts = cfg.max_parts.max(1).min(solution.part.len().max(1));
    let min_parts = cfg.min_parts.clamp(1, max_parts);

    // Collapse out-of-range IDs into partition 0 before renumbering.
    for p in solution.part.iter_mut() {
        if *p >= max_parts {
            *p = 0;
        }
    }
    solution.renumber_dense();

    // Spawn partitions out of partition 0 until the floor is met.
    while solution.num_parts() < min_parts && solution.part.len() > solution.num_parts() {
        let k = solution.num_parts();
        let members: Vec<usize> = solution
            .part
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p == 0)
            .map(|(v, _)| v)
            .collect();
        if members.len() < 2 {
            break;
        }
        for &v in members.iter().take(members.len() / 2) {
            solution.part[v] = k;
        }
        let inherited = solution.tech.first().cloned();
        let tech = inherited
            .filter(|t| available.contains(t))
            .or_else(|| available.choose(rng).cloned())
            .unwrap_or_default();
        solution.tech.push(tech);
        solution.geometry.push(PartGeometry::default());
    }

    // Arity and membership of the tech tuple.
    let k = solution.num_parts();
    solution.tech.truncate(k);
    while solution.tech.len() < k {
        solution
            .tech
            .push(available.choose(rng).cloned().unwrap_or_default());
    }
    for t in solution.tech.iter_mut() {
        if !available.contains(t) {
            *t = available.choose(rng).cloned().unwrap_or_default();
        }
    }
    solution.geometry.resize(k, PartGeometry::default());
}

/// Initial-population helper: greedy balanced assignment, heaviest block
/// first into the lightest partition.
pub fn balanced_partition(areas: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..areas.len()).collect();
    order.sort_by(|&a, &b| areas[b].total_cmp(&areas[a]).then(a.cmp(&b)));
    let mut bin = vec![0.0f64; k.max(1)];
    let mut part = vec![0usize; areas.len()];
    for &v in &order {
        let lightest = (0..bin.len())
            .min_by(|&a, &b| bin[a].total_cmp(&bin[b]).then(a.cmp(&b)))
            .unwrap_or(0);
        part[v] = lightest;
        bin[lightest] += areas[v];
    }
    part
}

/// Random tech tuple over the available node list.
pub fn random_techs(k: usize, available: &[String], rng: &mut ChaCha8Rng) -> Vec<String> {
    (0..k)
        .map(|_| {
            available
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| "7nm".to_string())
        })
        .collect()
}

/// Reassign roughly `frac` of the vertices to random partitions.
pub fn scramble_vertices(solution: &mut Solution, frac: f64, rng: &mut ChaCha8Rng) {
    let k = solution.num_parts();
    if k == 0 {
        return;
    }
    let n = solution.part.len();
    let count = ((n as f64 * frac).ceil() as usize).clamp(1, n);
    for _ in 0..count {
        let v = rng.gen_range(0..n);
        solution.part[v] = rng.gen_range(0..k);
    }
}

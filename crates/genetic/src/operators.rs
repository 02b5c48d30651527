use crate::{GaConfig, Individual};
use part_core::{PartGeometry, Solution};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Fraction of vertices reassigned by the partition mutation.
const VERTEX_MUTATION_FRAC: f64 = 0.05;
/// Fraction of tech entries re-rolled by the tech mutation.
const TECH_MUTATION_FRAC: f64 = 1.0 / 3.0;

/// Produce one child from two parents. Three operators:
/// (a) one-point partition crossover, tech from the fitter parent;
/// (b) uniform tech crossover over the fitter parent's partition;
/// (c) hybrid: structure from one random parent, techs blended uniformly.
pub fn crossover(a: &Individual, b: &Individual, rng: &mut ChaCha8Rng) -> Solution {
    let (fit, other) = if a.fitness <= b.fitness { (a, b) } else { (b, a) };
    match rng.gen_range(0..3) {
        0 => {
            let n = fit.solution.part.len();
            let point = if n > 1 { rng.gen_range(1..n) } else { 0 };
            let mut part = fit.solution.part[..point].to_vec();
            part.extend_from_slice(&other.solution.part[point..]);
            Solution {
                part,
                tech: fit.solution.tech.clone(),
                geometry: fit.solution.geometry.clone(),
                cost: f64::INFINITY,
                valid: false,
            }
        }
        1 => {
            let mut tech = fit.solution.tech.clone();
            for (i, t) in tech.iter_mut().enumerate() {
                if rng.gen_bool(0.5) {
                    if let Some(ot) = other.solution.tech.get(i) {
                        *t = ot.clone();
                    }
                }
            }
            Solution {
                part: fit.solution.part.clone(),
                tech,
                geometry: fit.solution.geometry.clone(),
                cost: f64::INFINITY,
                valid: false,
            }
        }
        _ => {
            let donor = if rng.gen_bool(0.5) { a } else { b };
            let co_donor = if std::ptr::eq(donor, a) { b } else { a };
            let mut tech = donor.solution.tech.clone();
            for (i, t) in tech.iter_mut().enumerate() {
                if rng.gen_bool(0.5) {
                    if let Some(ot) = co_donor.solution.tech.get(i) {
                        *t = ot.clone();
                    }
                }
            }
            Solution {
                part: donor.solution.part.clone(),
                tech,
                geometry: donor.solution.geometry.clone(),
                cost: f64::INFINITY,
                valid: false,
            }
        }
    }
}

/// Mutate a solution in place. Three operators:
/// (a) reassign ~5% of the vertices to random partitions;
/// (b) re-roll ~1/3 of the tech assignments;
/// (c) structural: merge two partitions, or split one.
pub fn mutate(
    solution: &mut Solution,
    available: &[String],
    cfg: &GaConfig,
    rng: &mut ChaCha8Rng,
) {
    match rng.gen_range(0..3) {
        0 => {
            crate::individual::scramble_vertices(solution, VERTEX_MUTATION_FRAC, rng);
        }
        1 => {
            let k = solution.tech.len();
            if k > 0 && !available.is_empty() {
                let rolls = ((k as f64 * TECH_MUTATION_FRAC).ceil() as usize).clamp(1, k);
                for _ in 0..rolls {
                    let i = rng.gen_range(0..k);
                    if let Some(t) = available.choose(rng) {
                        solution.tech[i] = t.clone();
                    }
                }
            }
        }
        _ => {
            let k = solution.num_parts();
            if k > cfg.min_parts && (k >= cfg.max_parts || rng.gen_bool(0.5)) {
                merge_partitions(solution, rng);
            } else if k < cfg.max_parts {
                split_partition(solution, available, rng);
            }
        }
    }
}

fn merge_partitions(solution: &mut Solution, rng: &mut ChaCha8Rng) {
    let k = solution.num_parts();
    if k < 2 {
        return;
    }
    let a = rng.gen_range(0..k);
    let mut b = rng.gen_range(0..k - 1);
    if b >= a {
        b += 1;
    }
    for p in solution.part.iter_mut() {
        if *p == b {
            *p = a;
        }
    }
    // Dense renumbering (and tech/geometry shrink) is repair's job.
}

fn split_partition(solution: &mut Solution, available: &[String], rng: &mut ChaCha8Rng) {
    let k = solution.num_parts();
    if k == 0 {
        return;
    }
    let victim = rng.gen_range(0..k);
    let members: Vec<usize> = solution
        .part
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p == victim)
        .map(|(v, _)| v)
        .collect();
    if members.len() < 2 {
        return;
    }
    // Roughly half the vertices found a new partition; its tech is
    // inherited or sampled, at even odds.
    let moved = members.len() / 2;
    for &v in members.iter().take(moved) {
        solution.part[v] = k;
    }
    let tech = if rng.gen_bool(0.5) {
        solution.tech.get(victim).cloned()
    } else {
        None
    };
    solution.tech.push(
        tech.or_else(|| available.choose(rng).cloned())
            .unwrap_or_default(),
    );
    solution.geometry.push(PartGeometry::default());
}

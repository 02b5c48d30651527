use crate::{Bundle, ChipletNetlist, Floorplan, SequencePair};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Annealing schedule and objective weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FloorplanConfig {
    pub max_steps: usize,
    pub initial_temperature: f64,
    /// Geometric cooling factor applied between temperature plateaus.
    pub cooling_rate: f64,
    pub temperature_floor: f64,
    /// Moves attempted at each temperature.
    pub steps_per_temperature: usize,
    pub area_weight: f64,
    pub wirelength_weight: f64,
    /// Penalty per mm of reach overrun.
    pub reach_penalty: f64,
    /// Discrete soft-block aspect-ratio choices.
    pub aspect_ratios: Vec<f64>,
    /// Independent annealing starts reduced to the best feasible result.
    pub num_workers: usize,
    pub seed: u64,
    /// Bounding envelope inherited from the parent, when any.
    pub max_width: Option<f64>,
    pub max_height: Option<f64>,
}

impl Default for FloorplanConfig {
    fn default() -> Self {
        Self {
            max_steps: 20_000,
            initial_temperature: 1_000.0,
            cooling_rate: 0.95,
            temperature_floor: 1.0e-3,
            steps_per_temperature: 50,
            area_weight: 1.0,
            wirelength_weight: 0.1,
            reach_penalty: 1.0e6,
            aspect_ratios: vec![0.25, 1.0 / 3.0, 0.5, 2.0 / 3.0, 1.0, 1.5, 2.0, 3.0, 4.0],
            num_workers: 4,
            seed: 1,
            max_width: None,
            max_height: None,
        }
    }
}

struct Candidate {
    pair: SequencePair,
    ar_choice: Vec<usize>,
}

impl Candidate {
    fn shapes(&self, netlist: &ChipletNetlist, ars: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let n = netlist.len();
        let mut w = Vec::with_capacity(n);
        let mut h = Vec::with_capacity(n);
        for i in 0..n {
            let ar = ars[self.ar_choice[i]];
            w.push((netlist.areas[i] * ar).sqrt());
            h.push((netlist.areas[i] / ar).sqrt());
        }
        (w, h)
    }
}

fn wirelength_and_violation(
    bundles: &[Bundle],
    x: &[f64],
    y: &[f64],
    w: &[f64],
    h: &[f64],
) -> (f64, f64) {
    let mut wl = 0.0;
    let mut violation = 0.0;
    for b in bundles {
        let cx_a = x[b.a] + w[b.a] / 2.0;
        let cy_a = y[b.a] + h[b.a] / 2.0;
        let cx_b = x[b.b] + w[b.b] / 2.0;
        let cy_b = y[b.b] + h[b.b] / 2.0;
        wl += b.bandwidth * ((cx_a - cx_b).abs() + (cy_a - cy_b).abs());
        // Reach is an edge-to-edge budget: the IO cells sit on the die
        // boundary, so abutting chiplets have zero span.
        let gap = rect_gap(
            (x[b.a], y[b.a], w[b.a], h[b.a]),
            (x[b.b], y[b.b], w[b.b], h[b.b]),
        );
        if gap > b.reach {
            violation += gap - b.reach;
        }
    }
    (wl, violation)
}

/// Manhattan gap between two axis-aligned rectangles `(x, y, w, h)`;
/// zero if they touch or overlap.
pub fn rect_gap(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> f64 {
    let gx = (a.0.max(b.0) - (a.0 + a.2).min(b.0 + b.2)).max(0.0);
    let gy = (a.1.max(b.1) - (a.1 + a.3).min(b.1 + b.3)).max(0.0);
    gx + gy
}

fn score(
    candidate: &Candidate,
    netlist: &ChipletNetlist,
    cfg: &FloorplanConfig,
) -> (f64, bool, Floorplan) {
    let (w, h) = candidate.shapes(netlist, &cfg.aspect_ratios);
    let (x, y, bw, bh) = candidate.pair.decode(&w, &h);
    let (wl, violation) = wirelength_and_violation(&netlist.bundles, &x, &y, &w, &h);
    let mut objective =
        cfg.area_weight * bw * bh + cfg.wirelength_weight * wl + cfg.reach_penalty * violation;
    let mut fits_envelope = true;
    if let Some(mw) = cfg.max_width {
        if bw > mw {
            fits_envelope = false;
            objective += cfg.reach_penalty * (bw - mw);
        }
    }
    if let Some(mh) = cfg.max_height {
        if bh > mh {
            fits_envelope = false;
            objective += cfg.reach_penalty * (bh - mh);
        }
    }
    let feasible = violation == 0.0 && fits_envelope;
    let plan = Floorplan {
        aspect_ratios: candidate
            .ar_choice
            .iter()
            .map(|&i| cfg.aspect_ratios[i])
            .collect(),
        widths: w,
        heights: h,
        x,
        y,
        bbox_width: bw,
        bbox_height: bh,
        feasible,
        objective,
    };
    (objective, feasible, plan)
}

fn anneal_once(netlist: &ChipletNetlist, cfg: &FloorplanConfig, rng: &mut ChaCha8Rng) -> Floorplan {
    let n = netlist.len();
    let ar_one = cfg
        .aspect_ratios
        .iter()
        .position(|&r| (r - 1.0).abs() < 1e-12)
        .unwrap_or(0);
    let mut current = Candidate {
        pair: SequencePair::identity(n),
        ar_choice: vec![ar_one; n],
    };
    let (mut cur_obj, _, mut best_plan) = score(&current, netlist, cfg);
    let mut best_obj = cur_obj;

    let mut temperature = cfg.initial_temperature;
    let mut steps = 0usize;
    while steps < cfg.max_steps && temperature > cfg.temperature_floor {
        for _ in 0..cfg.steps_per_temperature {
            steps += 1;
            if steps > cfg.max_steps {
                break;
            }
            let mut next = Candidate {
                pair: current.pair.clone(),
                ar_choice: current.ar_choice.clone(),
            };
            match if n >= 2 { rng.gen_range(0..4) } else { 3 } {
                0 => {
                    let (i, j) = two_distinct(rng, n);
                    next.pair.pos.swap(i, j);
                }
                1 => {
                    let (i, j) = two_distinct(rng, n);
                    next.pair.neg.swap(i, j);
                }
                2 => {
                    let (i, j) = two_distinct(rng, n);
                    next.pair.pos.swap(i, j);
                    let (i, j) = two_distinct(rng, n);
                    next.pair.neg.swap(i, j);
                }
                _ => {
                    let i = rng.gen_range(0..n);
                    next.ar_choice[i] = rng.gen_range(0..cfg.aspect_ratios.len());
                }
            }
            let (obj, _, plan) = score(&next, netlist, cfg);
            let delta = obj - cur_obj;
            let accept = delta <= 0.0 || rng.gen::<f64>() < (-delta / temperature).exp();
            if accept {
                current = next;
                cur_obj = obj;
                if obj < best_obj {
                    best_obj = obj;
                    best_plan = plan;
                }
            }
        }
        temperature *= cfg.cooling_rate;
    }
    best_plan
}

fn two_distinct(rng: &mut ChaCha8Rng, n: usize) -> (usize, usize) {
    let i = rng.gen_range(0..n);
    let mut j = rng.gen_range(0..n - 1);
    if j >= i {
        j += 1;
    }
    (i, j)
}

/// Run `num_workers` independent annealing starts and keep the best.
///
/// Each worker owns its RNG stream, derived from the base seed and the
/// worker index, so the reduction is deterministic: feasibility first,
/// then objective, ties broken by worker index.
pub fn solve(netlist: &ChipletNetlist, cfg: &FloorplanConfig) -> Floorplan {
    if netlist.is_empty() || netlist.validate().is_err() {
        let broken = !netlist.is_empty();
        if broken {
            tracing::warn!("malformed chiplet netlist; reporting infeasible");
        }
        return Floorplan {
            aspect_ratios: Vec::new(),
            widths: Vec::new(),
            heights: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            bbox_width: 0.0,
            bbox_height: 0.0,
            feasible: !broken,
            objective: if broken { f64::INFINITY } else { 0.0 },
        };
    }
    let mut cfg_owned;
    let cfg = if cfg.aspect_ratios.is_empty() {
        cfg_owned = cfg.clone();
        cfg_owned.aspect_ratios = vec![1.0];
        &cfg_owned
    } else {
        cfg
    };
    let workers = cfg.num_workers.max(1);
    let mut results: Vec<(usize, Floorplan)> = (0..workers)
        .into_par_iter()
        .map(|w| {
            let mut rng = ChaCha8Rng::seed_from_u64(
                cfg.seed
                    .wrapping_add(0x9e37_79b9_7f4a_7c15u64.wrapping_mul(w as u64)),
            );
            (w, anneal_once(netlist, cfg, &mut rng))
        })
        .collect();
    results.sort_by(|(wa, a), (wb, b)| {
        b.feasible
            .cmp(&a.feasible)
            .then(a.objective.total_cmp(&b.objective))
            .then(wa.cmp(wb))
    });
    let best = results.remove(0).1;
    debug!(
        feasible = best.feasible,
        objective = best.objective,
        "floorplan reduced over {} workers",
        workers
    );
    best
}

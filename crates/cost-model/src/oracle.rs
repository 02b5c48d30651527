use crate::{scaled_part_areas, ChipArena, ChipNode, CostError, PadBucket};
use part_core::{Block, Hypergraph, Solution};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tech_lib::{power_scale_factor, Assembly, IoCell, Layer, Test, WaferProcess};
use tracing::{debug, warn};

/// Oracle tuning knobs that are not part of any library file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleParams {
    /// Technology node of the package carrier; defaults to the first
    /// partition's node.
    pub root_tech: Option<String>,
    /// Production quantity NRE is amortized over.
    pub quantity: f64,
    /// Mask-cost scale for shared reticles.
    pub reticle_share: f64,
    /// Core supply voltage used for power-pad sizing, V.
    pub core_voltage: f64,
    /// Reach-free pad budget per chiplet (scan/JTAG access, spares).
    pub test_pads_per_chiplet: usize,
    /// Black-box cost applied to every generated chiplet, replacing its
    /// computed silicon-plus-test cost.
    pub bb_cost_per_chiplet: Option<f64>,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            root_tech: None,
            quantity: 100_000.0,
            reticle_share: 1.0,
            core_voltage: 0.8,
            test_pads_per_chiplet: 50,
            bb_cost_per_chiplet: None,
        }
    }
}

/// Everything the report prints about one candidate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evaluation {
    /// Total scalar cost (manufacturing + NRE); infinite when infeasible.
    pub cost: f64,
    /// Floorplan feasible and every derived value well-defined.
    pub valid: bool,
    pub total_area_mm2: f64,
    pub part_areas_mm2: Vec<f64>,
    pub total_power_w: f64,
    /// Per-partition manufactured yield.
    pub part_yields: Vec<f64>,
    /// Yield of the assembled package.
    pub assembled_yield: f64,
    pub silicon_cost: f64,
    pub assembly_cost: f64,
    pub test_cost: f64,
    pub nre_cost: f64,
}

impl Evaluation {
    /// The verdict for a candidate that cannot be scored.
    pub fn invalid() -> Self {
        Self {
            cost: f64::INFINITY,
            valid: false,
            total_area_mm2: 0.0,
            part_areas_mm2: Vec::new(),
            total_power_w: 0.0,
            part_yields: Vec::new(),
            assembled_yield: 0.0,
            silicon_cost: 0.0,
            assembly_cost: 0.0,
            test_cost: 0.0,
            nre_cost: 0.0,
        }
    }
}

/// The cost oracle: owns the netlist, the block table, and latched copies
/// of every library, and scores candidates.
pub struct CostOracle {
    graph: Hypergraph,
    blocks: Vec<Block>,
    wafers: Vec<WaferProcess>,
    layers: Vec<Layer>,
    ios: Vec<IoCell>,
    assembly: Assembly,
    test: Test,
    params: OracleParams,
}

/// Concurrent invocations serialize on this lock; the underlying caches
/// are not thread-safe.
pub type SharedOracle = Arc<Mutex<CostOracle>>;

impl CostOracle {
    pub fn new(
        graph: Hypergraph,
        blocks: Vec<Block>,
        wafers: Vec<WaferProcess>,
        layers: Vec<Layer>,
        ios: Vec<IoCell>,
        assembly: Assembly,
        test: Test,
        params: OracleParams,
    ) -> Self {
        Self {
            graph,
            blocks,
            wafers,
            layers,
            ios,
            assembly,
            test,
            params,
        }
    }

    /// Wrap in the coarse lock shared by parallel callers.
    pub fn into_shared(self) -> SharedOracle {
        Arc::new(Mutex::new(self))
    }

    pub fn graph(&self) -> &Hypergraph {
        &self.graph
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    fn wafer_for(&self, tech: &str) -> Result<&WaferProcess, CostError> {
        self.wafers
            .iter()
            .find(|w| w.name == tech)
            .ok_or_else(|| CostError::UnknownTech(tech.to_string()))
    }

    /// Stackup convention: a node's layers are named after the node,
    /// either exactly or as `<node>_<layer>`.
    fn stackup_for(&self, tech: &str) -> Vec<Layer> {
        let prefix = format!("{tech}_");
        self.layers
            .iter()
            .filter(|l| l.name == tech || l.name.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn io_for(&self, tag: &str) -> Result<&IoCell, CostError> {
        self.ios
            .iter()
            .find(|c| c.tag == tag)
            .ok_or_else(|| CostError::UnknownIoType(tag.to_string()))
    }

    /// Score one candidate. `floorplan_feasible` is the verdict of the
    /// floorplanner that produced `solution.geometry`.
    pub fn evaluate(&self, solution: &Solution, floorplan_feasible: bool) -> Evaluation {
        match self.try_evaluate(solution, floorplan_feasible) {
            Ok(eval) => eval,
            Err(err) => {
                debug!(%err, "candidate rejected by cost oracle");
                Evaluation::invalid()
            }
        }
    }

    fn try_evaluate(
        &self,
        solution: &Solution,
        floorplan_feasible: bool,
    ) -> Result<Evaluation, CostError> {
        let k = solution.num_parts();
        if solution.part.len() != self.graph.num_vertices()
            || solution.geometry.len() != k
            || k == 0
            || solution.part.iter().any(|&p| p >= k)
        {
            warn!(
                parts = k,
                vertices = solution.part.len(),
                "oracle entered with inconsistent solution arity"
            );
            return Ok(Evaluation::invalid());
        }

        let part_areas = scaled_part_areas(&self.blocks, solution);
        let mut part_power = vec![0.0; k];
        let mut part_fracs = vec![[0.0f64; 3]; k];
        for (v, block) in self.blocks.iter().enumerate() {
            let p = solution.part[v];
            part_power[p] += block.power_w * power_scale_factor(&block.tech, &solution.tech[p]);
            let s = block.area_mm2;
            part_fracs[p][0] += block.memory_frac * s;
            part_fracs[p][1] += block.logic_frac * s;
            part_fracs[p][2] += block.analog_frac * s;
        }
        for fr in part_fracs.iter_mut() {
            let sum: f64 = fr.iter().sum();
            if sum > 0.0 {
                for x in fr.iter_mut() {
                    *x /= sum;
                }
            } else {
                fr[1] = 1.0;
            }
        }

        // Cross-partition IO analysis.
        let mut buckets: Vec<BTreeMap<u64, (f64, usize)>> = vec![BTreeMap::new(); k];
        let mut io_area = vec![0.0; k];
        // Per part, per IO type: summed crossing bandwidth (in + out).
        let mut conn_bw: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new(); k];
        for e in 0..self.graph.num_hyperedges() {
            let pins = self.graph.vertices_of(e)?;
            let mut parts: Vec<usize> = pins.iter().map(|&v| solution.part[v]).collect();
            parts.sort_unstable();
            parts.dedup();
            if parts.len() < 2 {
                continue;
            }
            let cell = self.io_for(self.graph.io_type(e))?;
            let bw = self.graph.hyperedge_weight(e).first().copied().unwrap_or(0.0);
            let per_cell_bw = cell.bandwidth_gbps.unwrap_or(1.0).max(1e-9);
            let units = (bw / per_cell_bw).ceil().max(1.0);
            let pads = units as usize * cell.wire_count.unwrap_or(1) as usize;
            // The loader resolves every net's reach against the IO library;
            // zero means genuinely unreachable, not unset.
            let reach = self.graph.reach(e);
            let driver = solution.part[pins[0]];
            for &p in &parts {
                let entry = buckets[p].entry(reach.to_bits()).or_insert((reach, 0));
                entry.1 += pads;
                let cell_area = if p == driver {
                    cell.tx_area_mm2.unwrap_or(0.0)
                } else {
                    cell.rx_area_mm2.unwrap_or(0.0)
                };
                io_area[p] += units * cell_area;
                *conn_bw[p].entry(cell.tag.clone()).or_insert(0.0) += bw;
            }
        }
        // IO power: per-type scaling applied once, after summing connections.
        let mut io_power = vec![0.0; k];
        for p in 0..k {
            for (tag, bw) in &conn_bw[p] {
                let cell = self.io_for(tag)?;
                io_power[p] += bw
                    * cell.energy_per_bit_pj.unwrap_or(0.0)
                    * cell.direction_factor()
                    * 1.0e-3;
            }
        }

        // Assemble the chip tree.
        let mut arena = ChipArena::new();
        let (root, leaf_ids) = if k == 1 {
            let mut die = self.make_die(0, solution, &part_areas, &part_power, &part_fracs)?;
            die.signal_buckets = buckets[0]
                .values()
                .map(|&(reach_mm, pads)| PadBucket { reach_mm, pads })
                .collect();
            die.io_power_w = io_power[0];
            die.io_cell_area_mm2 = io_area[0];
            let id = arena.add_root(die)?;
            (id, vec![id])
        } else {
            let root_tech = self
                .params
                .root_tech
                .clone()
                .unwrap_or_else(|| solution.tech[0].clone());
            let carrier = ChipNode::new(
                "package",
                self.wafer_for(&root_tech)?.clone(),
                self.assembly.clone(),
                self.test.clone(),
                Vec::new(),
            );
            let root = arena.add_root(carrier)?;
            let mut ids = Vec::with_capacity(k);
            for p in 0..k {
                let mut die = self.make_die(p, solution, &part_areas, &part_power, &part_fracs)?;
                die.signal_buckets = buckets[p]
                    .values()
                    .map(|&(reach_mm, pads)| PadBucket { reach_mm, pads })
                    .collect();
                die.io_power_w = io_power[p];
                die.io_cell_area_mm2 = io_area[p];
                ids.push(arena.add_child(root, die)?);
            }
            (root, ids)
        };

        arena.initialize(root)?;
        arena.make_static();

        let root_d = arena
            .node(root)?
            .derived
            .ok_or(CostError::IllDefined("root derived"))?;
        let mut part_yields = Vec::with_capacity(k);
        let mut silicon_cost = 0.0;
        for &id in &leaf_ids {
            let d = arena
                .node(id)?
                .derived
                .ok_or(CostError::IllDefined("leaf derived"))?;
            part_yields.push(d.true_yield);
            silicon_cost += d.self_cost;
        }

        let cost = root_d.total_cost + root_d.nre_cost;
        let valid = floorplan_feasible && cost.is_finite();
        Ok(Evaluation {
            cost: if valid { cost } else { f64::INFINITY },
            valid,
            total_area_mm2: root_d.area_mm2,
            part_areas_mm2: part_areas,
            total_power_w: root_d.total_power_w,
            part_yields,
            assembled_yield: root_d.chip_yield,
            silicon_cost,
            assembly_cost: root_d.assembly_cost,
            test_cost: root_d.assembly_test_cost,
            nre_cost: root_d.nre_cost,
        })
    }

    fn make_die(
        &self,
        p: usize,
        solution: &Solution,
        part_areas: &[f64],
        part_power: &[f64],
        part_fracs: &[[f64; 3]],
    ) -> Result<ChipNode, CostError> {
        let tech = &solution.tech[p];
        let stackup = self.stackup_for(tech);
        if stackup.is_empty() {
            // A node without layers cannot be costed.
            return Err(CostError::UnknownTech(tech.clone()));
        }
        let mut die = ChipNode::new(
            format!("chiplet_{p}"),
            self.wafer_for(tech)?.clone(),
            self.assembly.clone(),
            self.test.clone(),
            stackup,
        );
        die.bb_cost = self.params.bb_cost_per_chiplet;
        die.core_area_mm2 = part_areas[p];
        die.own_power_w = part_power[p];
        die.aspect_ratio = solution.geometry[p].aspect_ratio;
        die.x_mm = solution.geometry[p].x;
        die.y_mm = solution.geometry[p].y;
        die.core_voltage = self.params.core_voltage;
        die.test_pads = self.params.test_pads_per_chiplet;
        die.reticle_share = self.params.reticle_share;
        die.quantity = self.params.quantity;
        die.memory_frac = part_fracs[p][0];
        die.logic_frac = part_fracs[p][1];
        die.analog_frac = part_fracs[p][2];
        Ok(die)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use part_core::PartGeometry;
    use tech_lib::builtin::reference_library;

    fn blocks(n: usize, area: f64) -> Vec<Block> {
        (0..n)
            .map(|i| Block {
                name: format!("b{i}"),
                area_mm2: area,
                power_w: 0.2,
                tech: "7nm".to_string(),
                memory_frac: 0.2,
                logic_frac: 0.7,
                analog_frac: 0.1,
            })
            .collect()
    }

    fn chain_graph(n: usize, reach: f64) -> Hypergraph {
        let edges: Vec<Vec<usize>> = (0..n - 1).map(|i| vec![i, i + 1]).collect();
        let m = edges.len();
        Hypergraph::new(
            edges,
            vec![vec![4.0, 0.2]; n],
            vec![vec![64.0]; m],
            vec![reach; m],
            vec![0.05; m],
            vec!["UCIe_standard".to_string(); m],
        )
        .unwrap()
    }

    fn oracle(n: usize, reach: f64) -> CostOracle {
        let lib = reference_library();
        CostOracle::new(
            chain_graph(n, reach),
            blocks(n, 4.0),
            lib.wafers,
            lib.layers,
            lib.ios,
            lib.assemblies.into_iter().next().unwrap(),
            lib.tests.into_iter().next().unwrap(),
            OracleParams::default(),
        )
    }

    fn solution(part: Vec<usize>, techs: &[&str]) -> Solution {
        let k = techs.len();
        Solution {
            part,
            tech: techs.iter().map(|t| t.to_string()).collect(),
            geometry: (0..k)
                .map(|p| PartGeometry {
                    aspect_ratio: 1.0,
                    x: p as f64 * 5.0,
                    y: 0.0,
                })
                .collect(),
            cost: f64::INFINITY,
            valid: false,
        }
    }

    #[test]
    fn single_chip_has_no_assembly() {
        let o = oracle(8, 2.0);
        let eval = o.evaluate(&solution(vec![0; 8], &["7nm"]), true);
        assert!(eval.valid);
        assert!(eval.cost.is_finite());
        assert_eq!(eval.assembly_cost, 0.0);
        assert_eq!(eval.test_cost, 0.0);
        assert_eq!(eval.part_areas_mm2.len(), 1);
    }

    #[test]
    fn two_way_split_carries_assembly_cost() {
        let o = oracle(8, 2.0);
        let eval = o.evaluate(
            &solution(vec![0, 0, 0, 0, 1, 1, 1, 1], &["7nm", "7nm"]),
            true,
        );
        assert!(eval.valid);
        assert!(eval.assembly_cost > 0.0);
        assert!(eval.test_cost > 0.0);
        assert_eq!(eval.part_areas_mm2.len(), 2);
        for y in &eval.part_yields {
            assert!((0.0..=1.0).contains(y));
        }
        assert!((0.0..=1.0).contains(&eval.assembled_yield));
        // The package bounds its chiplets.
        let summed: f64 = eval.part_areas_mm2.iter().sum();
        assert!(summed <= eval.total_area_mm2 + 1e-6);
    }

    #[test]
    fn one_chiplet_per_block_maximizes_bonds() {
        let o = oracle(8, 2.0);
        let each_own = o.evaluate(
            &solution((0..8).collect(), &["7nm"; 8]),
            true,
        );
        let two_way = o.evaluate(
            &solution(vec![0, 0, 0, 0, 1, 1, 1, 1], &["7nm", "7nm"]),
            true,
        );
        assert!(each_own.valid);
        // More dies to place and bond than any coarser split.
        assert!(each_own.assembly_cost > two_way.assembly_cost);
        assert_eq!(each_own.part_areas_mm2.len(), 8);
    }

    #[test]
    fn infeasible_floorplan_scores_infinity() {
        let o = oracle(8, 2.0);
        let eval = o.evaluate(&solution(vec![0; 8], &["7nm"]), false);
        assert!(!eval.valid);
        assert!(eval.cost.is_infinite());
    }

    #[test]
    fn zero_reach_rejects_cut_candidates() {
        let o = oracle(8, 0.0);
        // Cut nets exist, their reach is 0 < die separation: ReachInfeasible.
        let eval = o.evaluate(
            &solution(vec![0, 0, 0, 0, 1, 1, 1, 1], &["7nm", "7nm"]),
            true,
        );
        assert!(!eval.valid);
        assert!(eval.cost.is_infinite());
        // The uncut candidate is unaffected.
        let whole = o.evaluate(&solution(vec![0; 8], &["7nm"]), true);
        assert!(whole.valid);
    }

    #[test]
    fn arity_mismatch_is_detected_not_fatal() {
        let o = oracle(8, 2.0);
        // Two partitions used, but only one tech entry.
        let eval = o.evaluate(&solution(vec![0, 0, 0, 0, 1, 1, 1, 1], &["7nm"]), true);
        assert!(!eval.valid);
        assert!(eval.cost.is_infinite());
    }

    #[test]
    fn coarser_node_changes_cost() {
        let o = oracle(8, 2.0);
        let part = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let all_7 = o.evaluate(&solution(part.clone(), &["7nm", "7nm"]), true);
        let mixed = o.evaluate(&solution(part, &["7nm", "45nm"]), true);
        assert!(all_7.valid && mixed.valid);
        assert!((all_7.cost - mixed.cost).abs() > 1e-9);
        // 45nm inflates the second partition's silicon.
        assert!(mixed.part_areas_mm2[1] > all_7.part_areas_mm2[1]);
    }

    fn oracle_with_bb(n: usize, bb: f64) -> CostOracle {
        let lib = reference_library();
        CostOracle::new(
            chain_graph(n, 2.0),
            blocks(n, 4.0),
            lib.wafers,
            lib.layers,
            lib.ios,
            lib.assemblies.into_iter().next().unwrap(),
            lib.tests.into_iter().next().unwrap(),
            OracleParams {
                bb_cost_per_chiplet: Some(bb),
                ..Default::default()
            },
        )
    }

    #[test]
    fn bb_cost_accounting_is_linear_in_k() {
        // With bb_cost C on every chiplet, the silicon term is exactly
        // k·C; assembly, test, and NRE come on top.
        let sol = solution(vec![0, 0, 0, 0, 1, 1, 1, 1], &["7nm", "7nm"]);
        let eval = oracle_with_bb(8, 7.5).evaluate(&sol, true);
        assert!(eval.valid);
        assert!((eval.silicon_cost - 2.0 * 7.5).abs() < 1e-9);
        assert!(eval.cost > eval.silicon_cost);
    }

    #[test]
    fn cost_is_monotone_in_bb_cost() {
        let sol = solution(vec![0, 0, 0, 0, 1, 1, 1, 1], &["7nm", "7nm"]);
        let cheap = oracle_with_bb(8, 5.0).evaluate(&sol, true);
        let dear = oracle_with_bb(8, 50.0).evaluate(&sol, true);
        assert!(cheap.valid && dear.valid);
        assert!(dear.cost > cheap.cost);
    }

    #[test]
    fn unknown_tech_invalidates_the_candidate() {
        let o = oracle(8, 2.0);
        let eval = o.evaluate(
            &solution(vec![0, 0, 0, 0, 1, 1, 1, 1], &["7nm", "3nm"]),
            true,
        );
        assert!(!eval.valid);
        assert!(eval.cost.is_infinite());
    }
}

use crate::{dies_per_wafer, size_pad_grid, CostError, PadBucket};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tech_lib::{Assembly, Layer, Test, WaferProcess};
use tracing::debug;

/// Index into the chip arena.
pub type ChipId = usize;

/// Collections larger than this are summed through rayon.
const PAR_THRESHOLD: usize = 4;

/// One chip record: a bare die, or a stack composed of child chips.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChipNode {
    pub label: String,
    pub wafer: WaferProcess,
    pub assembly: Assembly,
    pub test: Test,
    /// Ordered layer stackup, device layers first.
    pub stackup: Vec<Layer>,
    pub children: Vec<ChipId>,
    /// Non-owning back-reference; bonding pitch and die separation are
    /// inherited from here.
    pub parent: Option<ChipId>,
    /// Silicon core area in mm² (excludes IO cells and pad overhead).
    pub core_area_mm2: f64,
    /// Width over height.
    pub aspect_ratio: f64,
    /// Placement within the parent, lower-left corner.
    pub x_mm: f64,
    pub y_mm: f64,
    /// Buried dies are embedded in the substrate and do not add to the
    /// stacked bounding box.
    pub buried: bool,
    pub core_voltage: f64,
    /// Compute power of the blocks on this chip, W.
    pub own_power_w: f64,
    /// Power of the chiplet-crossing IO on this chip, W.
    pub io_power_w: f64,
    /// Area of the IO cells, mm².
    pub io_cell_area_mm2: f64,
    /// Signal pads grouped by net reach.
    pub signal_buckets: Vec<PadBucket>,
    /// Reach-free pads (test access, spares).
    pub test_pads: usize,
    // Black-box overrides.
    pub bb_area_mm2: Option<f64>,
    pub bb_cost: Option<f64>,
    pub bb_quality: Option<f64>,
    pub bb_power_w: Option<f64>,
    // NRE sharing.
    pub reticle_share: f64,
    pub quantity: f64,
    pub memory_frac: f64,
    pub logic_frac: f64,
    pub analog_frac: f64,
    /// Filled by [`ChipArena::initialize`].
    pub derived: Option<Derived>,
}

impl ChipNode {
    /// A bare die with everything zeroed; callers fill what they need.
    pub fn new(
        label: impl Into<String>,
        wafer: WaferProcess,
        assembly: Assembly,
        test: Test,
        stackup: Vec<Layer>,
    ) -> Self {
        Self {
            label: label.into(),
            wafer,
            assembly,
            test,
            stackup,
            children: Vec::new(),
            parent: None,
            core_area_mm2: 0.0,
            aspect_ratio: 1.0,
            x_mm: 0.0,
            y_mm: 0.0,
            buried: false,
            core_voltage: 0.8,
            own_power_w: 0.0,
            io_power_w: 0.0,
            io_cell_area_mm2: 0.0,
            signal_buckets: Vec::new(),
            test_pads: 0,
            bb_area_mm2: None,
            bb_cost: None,
            bb_quality: None,
            bb_power_w: None,
            reticle_share: 1.0,
            quantity: 100_000.0,
            memory_frac: 0.0,
            logic_frac: 1.0,
            analog_frac: 0.0,
            derived: None,
        }
    }
}

/// Values computed by the bottom-up initialize pass.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Derived {
    pub width_mm: f64,
    pub height_mm: f64,
    pub area_mm2: f64,
    pub pad_grid_area_mm2: f64,
    pub required_pads: usize,
    pub gates: f64,
    /// Manufactured yield before any testing.
    pub true_yield: f64,
    pub self_test_yield: f64,
    pub self_quality: f64,
    /// Yield of the assembled stack (leaf: equals self quality).
    pub chip_yield: f64,
    /// Goodness of this chip as seen by its parent.
    pub quality: f64,
    pub dies_per_wafer: usize,
    pub self_cost: f64,
    pub assembly_cost: f64,
    pub assembly_test_cost: f64,
    pub total_cost: f64,
    pub nre_cost: f64,
    pub total_power_w: f64,
}

/// Flat arena owning every chip record of one tree.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChipArena {
    nodes: Vec<ChipNode>,
    #[serde(default)]
    static_latched: bool,
}

impl ChipArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root (parentless) chip.
    pub fn add_root(&mut self, node: ChipNode) -> Result<ChipId, CostError> {
        if self.static_latched {
            return Err(CostError::StaticMutation);
        }
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    /// Append a chip as the last child of `parent`.
    pub fn add_child(&mut self, parent: ChipId, mut node: ChipNode) -> Result<ChipId, CostError> {
        if self.static_latched {
            return Err(CostError::StaticMutation);
        }
        if parent >= self.nodes.len() {
            return Err(CostError::InvalidChipId(parent));
        }
        node.parent = Some(parent);
        self.nodes.push(node);
        let id = self.nodes.len() - 1;
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Latch the arena read-only.
    pub fn make_static(&mut self) {
        self.static_latched = true;
    }

    /// Whether the latch has been set.
    pub fn is_static(&self) -> bool {
        self.static_latched
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ChipId) -> Result<&ChipNode, CostError> {
        self.nodes.get(id).ok_or(CostError::InvalidChipId(id))
    }

    pub fn node_mut(&mut self, id: ChipId) -> Result<&mut ChipNode, CostError> {
        if self.static_latched {
            return Err(CostError::StaticMutation);
        }
        self.nodes.get_mut(id).ok_or(CostError::InvalidChipId(id))
    }

    fn post_order(&self, root: ChipId) -> Vec<ChipId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                for &c in &self.nodes[id].children {
                    stack.push((c, false));
                }
            }
        }
        order
    }

    /// Bottom-up pass computing every derived value under `root`.
    ///
    /// Fails on structural problems (bad ids, reach-infeasible pad grids,
    /// ill-defined yields). A zero-yield or unmanufacturable chip is not a
    /// failure: its cost becomes `f64::INFINITY` and the caller decides.
    pub fn initialize(&mut self, root: ChipId) -> Result<(), CostError> {
        if root >= self.nodes.len() {
            return Err(CostError::InvalidChipId(root));
        }
        for id in self.post_order(root) {
            let derived = self.compute_node(id)?;
            if !(0.0..=1.0).contains(&derived.true_yield)
                || !(0.0..=1.0).contains(&derived.chip_yield)
                || !(0.0..=1.0).contains(&derived.quality)
            {
                return Err(CostError::IllDefined("yield outside [0,1]"));
            }
            self.nodes[id].derived = Some(derived);
        }
        debug!(
            root,
            cost = self.nodes[root].derived.map(|d| d.total_cost),
            "chip tree initialized"
        );
        Ok(())
    }

    fn child_derived(&self, id: ChipId) -> Vec<(ChipId, Derived)> {
        self.nodes[id]
            .children
            .iter()
            .map(|&c| (c, self.nodes[c].derived.unwrap_or_default()))
            .collect()
    }

    fn compute_node(&self, id: ChipId) -> Result<Derived, CostError> {
        let node = &self.nodes[id];
        let children = self.child_derived(id);

        let mut d = Derived::default();

        // Gates live in the active layers of the core.
        d.gates = node.core_area_mm2
            * node
                .stackup
                .iter()
                .filter(|l| l.active.unwrap_or(false))
                .map(|l| l.gates_per_mm2.unwrap_or(0.0))
                .sum::<f64>();

        // Power composes bottom-up.
        let child_power = sum_over(&children, |c| c.total_power_w);
        let self_power = node
            .bb_power_w
            .unwrap_or(node.own_power_w + node.io_power_w);
        d.total_power_w = self_power + child_power;
        if !d.total_power_w.is_finite() || d.total_power_w < 0.0 {
            return Err(CostError::IllDefined("total power"));
        }

        // Bonding pitch and separation inherit from the parent assembly.
        let bonding = node
            .parent
            .map(|p| &self.nodes[p].assembly)
            .unwrap_or(&node.assembly);
        let pitch = bonding.bonding_pitch_mm.unwrap_or(0.0);
        let separation = bonding.die_separation_mm.unwrap_or(0.0);

        let power_per_pad = bonding.power_per_pad(node.core_voltage);
        let power_pads = if power_per_pad > 0.0 {
            (d.total_power_w / power_per_pad).ceil() as usize
        } else {
            0
        };
        let signal_pads: usize = node.signal_buckets.iter().map(|b| b.pads).sum();
        d.required_pads = signal_pads + power_pads + node.test_pads;

        d.pad_grid_area_mm2 = if pitch > 0.0 && d.required_pads > 0 {
            size_pad_grid(
                &node.signal_buckets,
                power_pads + node.test_pads,
                node.aspect_ratio,
                pitch,
                separation,
            )?
            .area_mm2
        } else {
            0.0
        };

        // Area: the largest of core+IO, pad grid, and stacked children.
        let core_plus_io = node.core_area_mm2 + node.io_cell_area_mm2;
        let stacked = self.stacked_bounding_area(id, &children);
        d.area_mm2 = node
            .bb_area_mm2
            .unwrap_or_else(|| core_plus_io.max(d.pad_grid_area_mm2).max(stacked));
        if !d.area_mm2.is_finite() || d.area_mm2 < 0.0 {
            return Err(CostError::IllDefined("area"));
        }
        let ar = if node.aspect_ratio > 0.0 {
            node.aspect_ratio
        } else {
            1.0
        };
        d.width_mm = (d.area_mm2 * ar).sqrt();
        d.height_mm = (d.area_mm2 / ar).sqrt();

        // Yields.
        d.true_yield = node
            .stackup
            .iter()
            .map(|l| l.layer_yield(d.area_mm2))
            .product::<f64>()
            .clamp(0.0, 1.0);
        d.self_test_yield = Test::test_yield(&node.test.self_phase, d.true_yield);
        d.self_quality = node
            .bb_quality
            .unwrap_or_else(|| Test::quality(&node.test.self_phase, d.true_yield))
            .clamp(0.0, 1.0);

        let wafer_yield = node.wafer.wafer_process_yield.unwrap_or(1.0);
        let n_chips = children.len();
        let assembly_test_yield;
        if n_chips == 0 {
            d.chip_yield = d.self_quality;
            d.quality = d.self_quality;
            assembly_test_yield = 1.0;
        } else {
            let n_bonds: usize = children.iter().map(|(_, c)| c.required_pads).sum();
            let child_quality = product_over(&children, |c| c.quality);
            let assembly_yield = node.assembly.assembly_yield(n_chips, n_bonds, d.area_mm2);
            d.chip_yield = (d.self_quality * child_quality * assembly_yield * wafer_yield)
                .clamp(0.0, 1.0);
            assembly_test_yield = Test::test_yield(&node.test.assembly_phase, d.chip_yield);
            d.quality = Test::quality(&node.test.assembly_phase, d.chip_yield);
        }

        // Reticle gate: a die larger than the reticle cannot be stepped.
        let rx = node.wafer.reticle_x_mm.unwrap_or(f64::INFINITY);
        let ry = node.wafer.reticle_y_mm.unwrap_or(f64::INFINITY);
        let fits_reticle = (d.width_mm <= rx && d.height_mm <= ry)
            || (d.width_mm <= ry && d.height_mm <= rx);

        d.dies_per_wafer = dies_per_wafer(&node.wafer, d.width_mm, d.height_mm);

        // Self cost: layer-aware silicon plus self test, amortized by the
        // self-test yield. bb_cost short-circuits the whole term.
        d.self_cost = if let Some(bb) = node.bb_cost {
            bb
        } else if node.stackup.is_empty() && node.core_area_mm2 == 0.0 {
            // Pure carrier (package substrate) with no silicon of its own.
            0.0
        } else if d.true_yield <= 0.0
            || d.self_test_yield <= 0.0
            || d.dies_per_wafer == 0
            || !fits_reticle
        {
            f64::INFINITY
        } else {
            let usable_d = node.wafer.usable_diameter_mm()?;
            let wafer_area = std::f64::consts::PI * (usable_d / 2.0).powi(2);
            let silicon: f64 = node
                .stackup
                .iter()
                .map(|l| l.cost_per_mm2.unwrap_or(0.0) * wafer_area)
                .sum::<f64>()
                / d.dies_per_wafer as f64;
            let test = node.test.test_cost(&node.test.self_phase, d.gates);
            (silicon + test) / d.self_test_yield
        };

        // Assembly of children onto this chip.
        if n_chips > 0 {
            let pnp_ops =
                div_ceil(n_chips, node.assembly.picknplace_group.unwrap_or(1).max(1) as usize);
            let bond_ops =
                div_ceil(n_chips, node.assembly.bonding_group.unwrap_or(1).max(1) as usize);
            d.assembly_cost = pnp_ops as f64
                * node.assembly.picknplace_time_s.unwrap_or(0.0)
                * node.assembly.picknplace_cost_per_second()?
                + bond_ops as f64
                    * node.assembly.bonding_time_s.unwrap_or(0.0)
                    * node.assembly.bonding_cost_per_second()?
                + node.assembly.materials_cost_per_mm2.unwrap_or(0.0) * d.area_mm2;
            let stack_gates = d.gates + sum_over(&children, |c| c.gates);
            d.assembly_test_cost = node
                .test
                .test_cost(&node.test.assembly_phase, stack_gates);
        }

        let child_cost = sum_over(&children, |c| c.total_cost);
        d.total_cost = (d.self_cost + child_cost + d.assembly_cost + d.assembly_test_cost)
            / assembly_test_yield.max(f64::MIN_POSITIVE);
        if d.total_cost.is_nan() {
            return Err(CostError::IllDefined("total cost"));
        }

        // NRE: design plus reticle-shared masks, amortized over quantity.
        let design = node.wafer.nre_design_cost_per_mm2(
            node.memory_frac,
            node.logic_frac,
            node.analog_frac,
        ) * node.core_area_mm2;
        let masks: f64 = node
            .stackup
            .iter()
            .map(|l| l.mask_cost.unwrap_or(0.0))
            .sum::<f64>()
            * node.reticle_share;
        let child_nre = sum_over(&children, |c| c.nre_cost);
        d.nre_cost = (design + masks) / node.quantity.max(1.0) + child_nre;

        Ok(d)
    }

    fn stacked_bounding_area(&self, id: ChipId, children: &[(ChipId, Derived)]) -> f64 {
        if children.is_empty() {
            return 0.0;
        }
        let separation = self.nodes[id].assembly.die_separation_mm.unwrap_or(0.0);
        let edge = self.nodes[id].assembly.edge_exclusion_mm.unwrap_or(0.0);
        let mut x0 = f64::INFINITY;
        let mut y0 = f64::INFINITY;
        let mut x1 = f64::NEG_INFINITY;
        let mut y1 = f64::NEG_INFINITY;
        let mut any = false;
        for (cid, cd) in children {
            let c = &self.nodes[*cid];
            if c.buried {
                continue;
            }
            any = true;
            x0 = x0.min(c.x_mm - separation / 2.0);
            y0 = y0.min(c.y_mm - separation / 2.0);
            x1 = x1.max(c.x_mm + cd.width_mm + separation / 2.0);
            y1 = y1.max(c.y_mm + cd.height_mm + separation / 2.0);
        }
        if !any {
            return 0.0;
        }
        ((x1 - x0) + 2.0 * edge) * ((y1 - y0) + 2.0 * edge)
    }
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

fn sum_over(children: &[(ChipId, Derived)], f: impl Fn(&Derived) -> f64 + Sync) -> f64 {
    if children.len() > PAR_THRESHOLD {
        children.par_iter().map(|(_, c)| f(c)).sum()
    } else {
        children.iter().map(|(_, c)| f(c)).sum()
    }
}

fn product_over(children: &[(ChipId, Derived)], f: impl Fn(&Derived) -> f64 + Sync) -> f64 {
    if children.len() > PAR_THRESHOLD {
        children.par_iter().map(|(_, c)| f(c)).product()
    } else {
        children.iter().map(|(_, c)| f(c)).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tech_lib::TestPhase;

    fn wafer() -> WaferProcess {
        let mut w = WaferProcess::new("7nm");
        w.set_wafer_diameter(300.0).unwrap();
        w.set_edge_exclusion(3.0).unwrap();
        w.set_wafer_process_yield(0.98).unwrap();
        w.set_dicing_distance(0.1).unwrap();
        w.set_reticle_x(26.0).unwrap();
        w.set_reticle_y(33.0).unwrap();
        w.set_wafer_fill_grid(false).unwrap();
        w.set_nre_front_end_cost_per_mm2_memory(1000.0).unwrap();
        w.set_nre_front_end_cost_per_mm2_logic(3000.0).unwrap();
        w.set_nre_front_end_cost_per_mm2_analog(5000.0).unwrap();
        w.set_nre_back_end_cost_per_mm2_memory(500.0).unwrap();
        w.set_nre_back_end_cost_per_mm2_logic(2000.0).unwrap();
        w.set_nre_back_end_cost_per_mm2_analog(4000.0).unwrap();
        w
    }

    fn assembly() -> Assembly {
        let mut a = Assembly::new("organic");
        a.set_materials_cost_per_mm2(0.01).unwrap();
        a.set_picknplace_machine_cost(1_000_000.0).unwrap();
        a.set_picknplace_machine_lifetime_years(5.0).unwrap();
        a.set_picknplace_machine_uptime(0.9).unwrap();
        a.set_picknplace_technician_yearly_cost(100_000.0).unwrap();
        a.set_picknplace_time_s(10.0).unwrap();
        a.set_picknplace_group(1).unwrap();
        a.set_bonding_machine_cost(2_000_000.0).unwrap();
        a.set_bonding_machine_lifetime_years(5.0).unwrap();
        a.set_bonding_machine_uptime(0.9).unwrap();
        a.set_bonding_technician_yearly_cost(100_000.0).unwrap();
        a.set_bonding_time_s(20.0).unwrap();
        a.set_bonding_group(1).unwrap();
        a.set_die_separation(0.25).unwrap();
        a.set_edge_exclusion(0.1).unwrap();
        a.set_max_pad_current_density(100.0).unwrap();
        a.set_bonding_pitch(0.11).unwrap();
        a.set_alignment_yield(0.999).unwrap();
        a.set_bonding_yield(0.9999).unwrap();
        a.set_dielectric_bond_defect_density(0.0001).unwrap();
        a
    }

    fn test_proc() -> Test {
        let phase = TestPhase {
            defect_coverage: Some(0.9),
            test_reuse: Some(1.0),
            scan_chain_length: Some(1000.0),
            scan_chain_count: Some(10.0),
            pattern_count: None,
            failure_dist: "normal".to_string(),
        };
        let mut t = Test::new("KGD");
        t.set_time_per_test_cycle(1e-9).unwrap();
        t.set_cost_per_second(0.01).unwrap();
        t.set_samples_per_input(1.0).unwrap();
        t.set_self_phase(phase.clone()).unwrap();
        t.set_assembly_phase(phase).unwrap();
        t
    }

    fn layer() -> Layer {
        let mut l = Layer::new("7nm_base");
        l.set_active(true).unwrap();
        l.set_cost_per_mm2(0.02).unwrap();
        l.set_defect_density(0.001).unwrap();
        l.set_critical_area_fraction(0.5).unwrap();
        l.set_clustering_factor(2.0).unwrap();
        l.set_gates_per_mm2(50.0e6).unwrap();
        l.set_mask_cost(1_000_000.0).unwrap();
        l
    }

    fn leaf(area: f64) -> ChipNode {
        let mut n = ChipNode::new("die", wafer(), assembly(), test_proc(), vec![layer()]);
        n.core_area_mm2 = area;
        n.own_power_w = area * 0.1;
        n
    }

    #[test]
    fn single_die_costs_and_yields() {
        let mut arena = ChipArena::new();
        let root = arena.add_root(leaf(50.0)).unwrap();
        arena.initialize(root).unwrap();
        let d = arena.node(root).unwrap().derived.unwrap();
        assert!(d.true_yield > 0.0 && d.true_yield < 1.0);
        assert!(d.self_cost.is_finite() && d.self_cost > 0.0);
        // Leaf: no assembly terms.
        assert_eq!(d.assembly_cost, 0.0);
        assert_eq!(d.assembly_test_cost, 0.0);
        assert!(d.total_cost >= d.self_cost);
        assert!(d.nre_cost > 0.0);
    }

    #[test]
    fn stack_cost_includes_children_and_assembly() {
        let mut arena = ChipArena::new();
        let mut carrier = ChipNode::new("pkg", wafer(), assembly(), test_proc(), vec![]);
        carrier.quantity = 100_000.0;
        let root = arena.add_root(carrier).unwrap();
        let mut total_child_cost = 0.0;
        for i in 0..2 {
            let mut c = leaf(30.0);
            c.x_mm = i as f64 * 8.0;
            arena.add_child(root, c).unwrap();
        }
        arena.initialize(root).unwrap();
        for &c in &arena.node(root).unwrap().children.clone() {
            total_child_cost += arena.node(c).unwrap().derived.unwrap().total_cost;
        }
        let d = arena.node(root).unwrap().derived.unwrap();
        assert!(d.assembly_cost > 0.0);
        assert!(d.total_cost > total_child_cost + d.assembly_cost);
        assert!((0.0..=1.0).contains(&d.chip_yield));
    }

    #[test]
    fn bb_cost_replaces_self_cost() {
        let mut arena = ChipArena::new();
        let mut n = leaf(50.0);
        n.bb_cost = Some(12.5);
        let root = arena.add_root(n).unwrap();
        arena.initialize(root).unwrap();
        let d = arena.node(root).unwrap().derived.unwrap();
        assert_eq!(d.self_cost, 12.5);
    }

    #[test]
    fn zero_yield_layer_gives_infinite_cost() {
        let mut bad = layer();
        // Latch-free rebuild with absurd defect density: yield underflows to 0.
        bad.set_defect_density(1.0e200).unwrap();
        let mut arena = ChipArena::new();
        let mut n = ChipNode::new("die", wafer(), assembly(), test_proc(), vec![bad]);
        n.core_area_mm2 = 50.0;
        let root = arena.add_root(n).unwrap();
        arena.initialize(root).unwrap();
        let d = arena.node(root).unwrap().derived.unwrap();
        assert_eq!(d.true_yield, 0.0);
        assert!(d.self_cost.is_infinite());
        assert!(d.total_cost.is_infinite());
    }

    #[test]
    fn reticle_overflow_is_unmanufacturable() {
        let mut arena = ChipArena::new();
        let root = arena.add_root(leaf(5000.0)).unwrap();
        arena.initialize(root).unwrap();
        let d = arena.node(root).unwrap().derived.unwrap();
        assert!(d.self_cost.is_infinite());
    }

    #[test]
    fn latch_blocks_structure_edits() {
        let mut arena = ChipArena::new();
        let root = arena.add_root(leaf(10.0)).unwrap();
        arena.make_static();
        assert!(matches!(
            arena.add_child(root, leaf(1.0)),
            Err(CostError::StaticMutation)
        ));
        assert!(matches!(arena.node_mut(root), Err(CostError::StaticMutation)));
    }

    #[test]
    fn power_composes_bottom_up() {
        let mut arena = ChipArena::new();
        let carrier = ChipNode::new("pkg", wafer(), assembly(), test_proc(), vec![]);
        let root = arena.add_root(carrier).unwrap();
        for _ in 0..3 {
            arena.add_child(root, leaf(10.0)).unwrap();
        }
        arena.initialize(root).unwrap();
        let d = arena.node(root).unwrap().derived.unwrap();
        assert!((d.total_power_w - 3.0).abs() < 1e-9);
    }
}

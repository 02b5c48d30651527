//! A small built-in reference library.
//!
//! Mirrors the shape of the shipped XML libraries with three nodes
//! (7nm/10nm/45nm), three IO types, one assembly process, and one test
//! process. Used by examples, smoke tests, and as a fallback when a
//! caller wants a working stack without files on disk.

use crate::{Assembly, IoCell, Layer, Test, TestPhase, WaferProcess};

/// One bundle of every entity kind, all fully defined and latched.
#[derive(Clone, Debug)]
pub struct ReferenceLibrary {
    pub wafers: Vec<WaferProcess>,
    pub layers: Vec<Layer>,
    pub ios: Vec<IoCell>,
    pub assemblies: Vec<Assembly>,
    pub tests: Vec<Test>,
}

fn wafer(name: &str, yield_: f64, nre_scale: f64) -> WaferProcess {
    let mut w = WaferProcess::new(name);
    w.set_wafer_diameter(300.0).expect("fresh entity");
    w.set_edge_exclusion(3.0).expect("fresh entity");
    w.set_wafer_process_yield(yield_).expect("fresh entity");
    w.set_dicing_distance(0.1).expect("fresh entity");
    w.set_reticle_x(26.0).expect("fresh entity");
    w.set_reticle_y(33.0).expect("fresh entity");
    w.set_wafer_fill_grid(false).expect("fresh entity");
    w.set_nre_front_end_cost_per_mm2_memory(1_000.0 * nre_scale)
        .expect("fresh entity");
    w.set_nre_front_end_cost_per_mm2_logic(3_000.0 * nre_scale)
        .expect("fresh entity");
    w.set_nre_front_end_cost_per_mm2_analog(5_000.0 * nre_scale)
        .expect("fresh entity");
    w.set_nre_back_end_cost_per_mm2_memory(500.0 * nre_scale)
        .expect("fresh entity");
    w.set_nre_back_end_cost_per_mm2_logic(2_000.0 * nre_scale)
        .expect("fresh entity");
    w.set_nre_back_end_cost_per_mm2_analog(4_000.0 * nre_scale)
        .expect("fresh entity");
    w
}

fn layer(name: &str, cost: f64, d0: f64, gates: f64, mask: f64) -> Layer {
    let mut l = Layer::new(name);
    l.set_active(true).expect("fresh entity");
    l.set_cost_per_mm2(cost).expect("fresh entity");
    l.set_defect_density(d0).expect("fresh entity");
    l.set_critical_area_fraction(0.5).expect("fresh entity");
    l.set_clustering_factor(2.0).expect("fresh entity");
    l.set_gates_per_mm2(gates).expect("fresh entity");
    l.set_mask_cost(mask).expect("fresh entity");
    l
}

fn io(tag: &str, bw: f64, wires: u32, epb: f64, reach: f64, bidir: bool) -> IoCell {
    let mut c = IoCell::new(tag);
    c.set_rx_area(0.005).expect("fresh entity");
    c.set_tx_area(0.005).expect("fresh entity");
    c.set_shoreline(0.05).expect("fresh entity");
    c.set_bandwidth(bw).expect("fresh entity");
    c.set_wire_count(wires).expect("fresh entity");
    c.set_bidirectional(bidir).expect("fresh entity");
    c.set_energy_per_bit(epb).expect("fresh entity");
    c.set_reach(reach).expect("fresh entity");
    c
}

/// Build, latch, and return the reference library.
pub fn reference_library() -> ReferenceLibrary {
    let mut wafers = vec![
        wafer("7nm", 0.98, 1.0),
        wafer("10nm", 0.985, 0.6),
        wafer("45nm", 0.995, 0.15),
    ];
    let mut layers = vec![
        layer("7nm", 0.09, 0.002, 90.0e6, 2_000_000.0),
        layer("10nm", 0.06, 0.0015, 55.0e6, 1_200_000.0),
        layer("45nm", 0.02, 0.0008, 8.0e6, 300_000.0),
    ];
    let mut ios = vec![
        io("UCIe_standard", 32.0, 16, 0.5, 2.0, true),
        io("UCIe_advanced", 64.0, 32, 0.25, 1.0, true),
        io("GPIO", 4.0, 1, 2.0, 10.0, false),
    ];

    let mut assembly = Assembly::new("silicon_45");
    assembly.set_materials_cost_per_mm2(0.01).expect("fresh entity");
    assembly
        .set_picknplace_machine_cost(1_000_000.0)
        .expect("fresh entity");
    assembly
        .set_picknplace_machine_lifetime_years(5.0)
        .expect("fresh entity");
    assembly
        .set_picknplace_machine_uptime(0.9)
        .expect("fresh entity");
    assembly
        .set_picknplace_technician_yearly_cost(100_000.0)
        .expect("fresh entity");
    assembly.set_picknplace_time_s(10.0).expect("fresh entity");
    assembly.set_picknplace_group(1).expect("fresh entity");
    assembly
        .set_bonding_machine_cost(2_000_000.0)
        .expect("fresh entity");
    assembly
        .set_bonding_machine_lifetime_years(5.0)
        .expect("fresh entity");
    assembly.set_bonding_machine_uptime(0.9).expect("fresh entity");
    assembly
        .set_bonding_technician_yearly_cost(100_000.0)
        .expect("fresh entity");
    assembly.set_bonding_time_s(20.0).expect("fresh entity");
    assembly.set_bonding_group(1).expect("fresh entity");
    assembly.set_die_separation(0.25).expect("fresh entity");
    assembly.set_edge_exclusion(0.1).expect("fresh entity");
    assembly.set_max_pad_current_density(100.0).expect("fresh entity");
    assembly.set_bonding_pitch(0.11).expect("fresh entity");
    assembly.set_alignment_yield(0.999).expect("fresh entity");
    assembly.set_bonding_yield(0.9999).expect("fresh entity");
    assembly
        .set_dielectric_bond_defect_density(0.0001)
        .expect("fresh entity");

    let phase = TestPhase {
        defect_coverage: Some(0.9),
        test_reuse: Some(1.0),
        scan_chain_length: Some(1_000.0),
        scan_chain_count: Some(10.0),
        pattern_count: None,
        failure_dist: "normal".to_string(),
    };
    let mut test = Test::new("KGD");
    test.set_time_per_test_cycle(1.0e-9).expect("fresh entity");
    test.set_cost_per_second(0.01).expect("fresh entity");
    test.set_samples_per_input(1.0).expect("fresh entity");
    test.set_self_phase(phase.clone()).expect("fresh entity");
    test.set_assembly_phase(phase).expect("fresh entity");

    for w in &mut wafers {
        debug_assert!(w.fully_defined());
        w.make_static();
    }
    for l in &mut layers {
        debug_assert!(l.fully_defined());
        l.make_static();
    }
    for c in &mut ios {
        debug_assert!(c.fully_defined());
        c.make_static();
    }
    debug_assert!(assembly.fully_defined());
    assembly.make_static();
    debug_assert!(test.fully_defined());
    test.make_static();

    tracing::debug!("reference library constructed and latched");
    ReferenceLibrary {
        wafers,
        layers,
        ios,
        assemblies: vec![assembly],
        tests: vec![test],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_defined_and_latched() {
        let lib = reference_library();
        assert!(lib.wafers.iter().all(|w| w.fully_defined() && w.is_static()));
        assert!(lib.layers.iter().all(|l| l.fully_defined() && l.is_static()));
        assert!(lib.ios.iter().all(|c| c.fully_defined() && c.is_static()));
        assert!(lib.assemblies[0].fully_defined() && lib.assemblies[0].is_static());
        assert!(lib.tests[0].fully_defined() && lib.tests[0].is_static());
    }
}

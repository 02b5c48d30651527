use criterion::{criterion_group, criterion_main, Criterion};
use cost_model::{CostOracle, OracleParams};
use floorplan::FloorplanConfig;
use part_core::{Block, Hypergraph, PartGeometry, Solution};
use refine::{fm_refine, RefineConfig};
use tech_lib::builtin::reference_library;

fn ring(n: usize) -> Hypergraph {
    let edges: Vec<Vec<usize>> = (0..n).map(|i| vec![i, (i + 1) % n]).collect();
    Hypergraph::new(
        edges,
        vec![vec![4.0, 0.2]; n],
        vec![vec![16.0]; n],
        vec![2.0; n],
        vec![0.05; n],
        vec!["UCIe_standard".to_string(); n],
    )
    .unwrap()
}

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

fn bench_fm(c: &mut Criterion) {
    let n = 32;
    let graph = ring(n);
    let lib = reference_library();
    let oracle = CostOracle::new(
        graph.clone(),
        blocks(n),
        lib.wafers,
        lib.layers,
        lib.ios,
        lib.assemblies.into_iter().next().unwrap(),
        lib.tests.into_iter().next().unwrap(),
        OracleParams::default(),
    )
    .into_shared();
    let fp_cfg = FloorplanConfig {
        max_steps: 1_000,
        num_workers: 1,
        ..Default::default()
    };
    let cfg = RefineConfig::default();
    c.bench_function("fm_refine_ring_32", |b| {
        b.iter(|| {
            let mut sol = Solution {
                part: (0..n).map(|v| v % 4).collect(),
                tech: (0..4).map(|_| "7nm".to_string()).collect(),
                geometry: vec![PartGeometry::default(); 4],
                cost: f64::INFINITY,
                valid: false,
            };
            fm_refine(&graph, &blocks(n), &oracle, &fp_cfg, &cfg, &mut sol);
            sol
        })
    });
}

criterion_group!(benches, bench_fm);
criterion_main!(benches);

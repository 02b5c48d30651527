use part_core::{Block, Hypergraph, PartitionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tech_lib::area_scale_factor;

/// A bundle of nets between two chiplets.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Lower chiplet index.
    pub a: usize,
    /// Higher chiplet index.
    pub b: usize,
    /// Summed bandwidth of the contributing nets, Gbps.
    pub bandwidth: f64,
    /// Tightest reach among the contributing nets, mm.
    pub reach: f64,
}

/// The chiplet-level netlist the floorplanner places: one node per
/// partition with a minimum area, one weighted bundle per connected
/// partition pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChipletNetlist {
    /// Minimum silicon area per chiplet, mm².
    pub areas: Vec<f64>,
    pub bundles: Vec<Bundle>,
}

impl ChipletNetlist {
    /// Project a block-level hypergraph under a partition assignment.
    ///
    /// Block areas are rescaled from each block's home node to its
    /// partition's assigned node. Multi-pin nets contribute a bundle to
    /// every partition pair they span.
    pub fn project(
        graph: &Hypergraph,
        blocks: &[Block],
        part: &[usize],
        techs: &[String],
    ) -> Result<Self, PartitionError> {
        let k = techs.len();
        let mut areas = vec![0.0; k];
        for (v, block) in blocks.iter().enumerate() {
            let p = *part.get(v).ok_or(PartitionError::InvalidId {
                kind: "vertex",
                id: v,
                len: part.len(),
            })?;
            if p >= k {
                return Err(PartitionError::InvalidId {
                    kind: "vertex",
                    id: p,
                    len: k,
                });
            }
            areas[p] += block.area_mm2
                * area_scale_factor(
                    &block.tech,
                    &techs[p],
                    block.memory_frac,
                    block.logic_frac,
                    block.analog_frac,
                );
        }

        let mut map: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();
        for e in 0..graph.num_hyperedges() {
            let mut parts: Vec<usize> = graph
                .vertices_of(e)?
                .iter()
                .map(|&v| part[v])
                .collect();
            parts.sort_unstable();
            parts.dedup();
            if parts.len() < 2 {
                continue;
            }
            let bw = graph.hyperedge_weight(e).first().copied().unwrap_or(0.0);
            let reach = graph.reach(e);
            for i in 0..parts.len() {
                for j in i + 1..parts.len() {
                    let entry = map
                        .entry((parts[i], parts[j]))
                        .or_insert((0.0, f64::INFINITY));
                    entry.0 += bw;
                    entry.1 = entry.1.min(reach);
                }
            }
        }
        let bundles = map
            .into_iter()
            .map(|((a, b), (bandwidth, reach))| Bundle {
                a,
                b,
                bandwidth,
                reach,
            })
            .collect();
        Ok(Self { areas, bundles })
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Every bundle endpoint must name a chiplet.
    pub fn validate(&self) -> Result<(), crate::FloorplanError> {
        for b in &self.bundles {
            for idx in [b.a, b.b] {
                if idx >= self.areas.len() {
                    return Err(crate::FloorplanError::InvalidChiplet(idx));
                }
            }
        }
        Ok(())
    }
}

use crate::PartitionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An IP block: one vertex of the netlist hypergraph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    /// Block name as given in the blocks file.
    pub name: String,
    /// Silicon area in mm² at the block's home node (> 0).
    pub area_mm2: f64,
    /// Power draw in W (>= 0).
    pub power_w: f64,
    /// Home technology node label, e.g. "7nm".
    pub tech: String,
    /// Fraction of the block that is memory.
    pub memory_frac: f64,
    /// Fraction of the block that is logic.
    pub logic_frac: f64,
    /// Fraction of the block that is analog.
    pub analog_frac: f64,
}

impl Block {
    /// Check the memory/logic/analog split sums to one within tolerance.
    pub fn fractions_consistent(&self) -> bool {
        let sum = self.memory_frac + self.logic_frac + self.analog_frac;
        (sum - 1.0).abs() < 1e-6
            && self.memory_frac >= 0.0
            && self.logic_frac >= 0.0
            && self.analog_frac >= 0.0
    }
}

/// An inter-block net: one hyperedge of the netlist hypergraph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Net {
    /// Vertex IDs connected by this net.
    pub vertices: Vec<usize>,
    /// Weight vector (first entry is bandwidth in Gbps).
    pub weights: Vec<f64>,
    /// IO cell type driving this net, e.g. "UCIe_standard".
    pub io_type: String,
    /// Maximum Manhattan span in mm for the net's IO type.
    pub reach: f64,
    /// IO shoreline size consumed per crossing, in mm.
    pub io_size: f64,
}

/// CSR hypergraph over blocks and nets.
///
/// Both directions are stored: hyperedge → vertices and vertex → hyperedges.
/// Construction deduplicates repeated pins so a vertex appears at most once
/// per hyperedge, keeping the two tables consistent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hypergraph {
    num_vertices: usize,
    num_hyperedges: usize,
    weight_dim: usize,
    // edge -> vertices
    eptr: Vec<usize>,
    eind: Vec<usize>,
    // vertex -> edges
    vptr: Vec<usize>,
    vind: Vec<usize>,
    vertex_weights: Vec<Vec<f64>>,
    hyperedge_weights: Vec<Vec<f64>>,
    reaches: Vec<f64>,
    io_sizes: Vec<f64>,
    io_types: Vec<String>,
}

impl Hypergraph {
    /// Build from a list of [`Net`]s; the common path for netlist loaders.
    pub fn from_nets(
        vertex_weights: Vec<Vec<f64>>,
        nets: Vec<Net>,
    ) -> Result<Self, PartitionError> {
        let mut hyperedges = Vec::with_capacity(nets.len());
        let mut hyperedge_weights = Vec::with_capacity(nets.len());
        let mut reaches = Vec::with_capacity(nets.len());
        let mut io_sizes = Vec::with_capacity(nets.len());
        let mut io_types = Vec::with_capacity(nets.len());
        for net in nets {
            hyperedges.push(net.vertices);
            hyperedge_weights.push(net.weights);
            reaches.push(net.reach);
            io_sizes.push(net.io_size);
            io_types.push(net.io_type);
        }
        Self::new(
            hyperedges,
            vertex_weights,
            hyperedge_weights,
            reaches,
            io_sizes,
            io_types,
        )
    }

    /// Build both CSR tables from hyperedge vertex lists and weights.
    pub fn new(
        hyperedges: Vec<Vec<usize>>,
        vertex_weights: Vec<Vec<f64>>,
        hyperedge_weights: Vec<Vec<f64>>,
        reaches: Vec<f64>,
        io_sizes: Vec<f64>,
        io_types: Vec<String>,
    ) -> Result<Self, PartitionError> {
        let num_vertices = vertex_weights.len();
        let num_hyperedges = hyperedges.len();
        let weight_dim = vertex_weights.first().map(|w| w.len()).unwrap_or(0);
        for w in &vertex_weights {
            if w.len() != weight_dim {
                return Err(PartitionError::WeightDimMismatch {
                    expected: weight_dim,
                    got: w.len(),
                });
            }
        }

        let mut eptr = Vec::with_capacity(num_hyperedges + 1);
        let mut eind = Vec::new();
        eptr.push(0);
        for edge in &hyperedges {
            // Dedup pins; a vertex appears at most once per hyperedge.
            let mut seen = BTreeSet::new();
            for &v in edge {
                if v >= num_vertices {
                    return Err(PartitionError::InvalidId {
                        kind: "vertex",
                        id: v,
                        len: num_vertices,
                    });
                }
                if seen.insert(v) {
                    eind.push(v);
                }
            }
            eptr.push(eind.len());
        }

        let mut degree = vec![0usize; num_vertices];
        for &v in &eind {
            degree[v] += 1;
        }
        let mut vptr = Vec::with_capacity(num_vertices + 1);
        vptr.push(0);
        for v in 0..num_vertices {
            vptr.push(vptr[v] + degree[v]);
        }
        let mut cursor = vptr.clone();
        let mut vind = vec![0usize; eind.len()];
        for e in 0..num_hyperedges {
            for idx in eptr[e]..eptr[e + 1] {
                let v = eind[idx];
                vind[cursor[v]] = e;
                cursor[v] += 1;
            }
        }

        Ok(Self {
            num_vertices,
            num_hyperedges,
            weight_dim,
            eptr,
            eind,
            vptr,
            vind,
            vertex_weights,
            hyperedge_weights,
            reaches,
            io_sizes,
            io_types,
        })
    }

    /// Number of vertices (blocks).
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Number of hyperedges (nets).
    pub fn num_hyperedges(&self) -> usize {
        self.num_hyperedges
    }

    /// Dimensionality of the vertex weight vectors.
    pub fn weight_dim(&self) -> usize {
        self.weight_dim
    }

    /// Vertices spanned by hyperedge `e`.
    pub fn vertices_of(&self, e: usize) -> Result<&[usize], PartitionError> {
        if e >= self.num_hyperedges {
            return Err(PartitionError::InvalidId {
                kind: "hyperedge",
                id: e,
                len: self.num_hyperedges,
            });
        }
        Ok(&self.eind[self.eptr[e]..self.eptr[e + 1]])
    }

    pub(crate) fn edge_pins(&self, e: usize) -> &[usize] {
        &self.eind[self.eptr[e]..self.eptr[e + 1]]
    }

    /// Hyperedges incident to vertex `v`.
    pub fn edges_of(&self, v: usize) -> Result<&[usize], PartitionError> {
        if v >= self.num_vertices {
            return Err(PartitionError::InvalidId {
                kind: "vertex",
                id: v,
                len: self.num_vertices,
            });
        }
        Ok(&self.vind[self.vptr[v]..self.vptr[v + 1]])
    }

    /// Weight vector of vertex `v`.
    pub fn vertex_weight(&self, v: usize) -> &[f64] {
        &self.vertex_weights[v]
    }

    /// Weight vector of hyperedge `e`.
    pub fn hyperedge_weight(&self, e: usize) -> &[f64] {
        &self.hyperedge_weights[e]
    }

    /// Reach of hyperedge `e` in mm.
    pub fn reach(&self, e: usize) -> f64 {
        self.reaches[e]
    }

    /// IO shoreline size of hyperedge `e` in mm.
    pub fn io_size(&self, e: usize) -> f64 {
        self.io_sizes[e]
    }

    /// IO type tag of hyperedge `e`.
    pub fn io_type(&self, e: usize) -> &str {
        &self.io_types[e]
    }

    /// Component-wise sum of all vertex weights.
    pub fn total_vertex_weights(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.weight_dim];
        for w in &self.vertex_weights {
            for (t, x) in total.iter_mut().zip(w) {
                *t += x;
            }
        }
        total
    }

    /// Per-partition balance bounds for a k-way partition.
    ///
    /// Upper bound is `total/k · (1 + factor)`, lower bound
    /// `total/k · (1 - factor)` clamped at zero, per weight dimension.
    pub fn balance_bounds(&self, num_parts: usize, factor: f64) -> (Vec<f64>, Vec<f64>) {
        let total = self.total_vertex_weights();
        let k = num_parts.max(1) as f64;
        let upper = total.iter().map(|t| t / k * (1.0 + factor)).collect();
        let lower = total
            .iter()
            .map(|t| (t / k * (1.0 - factor)).max(0.0))
            .collect();
        (upper, lower)
    }
}

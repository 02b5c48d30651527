use crate::{Hypergraph, PartitionError};
use serde::{Deserialize, Serialize};

/// Placement data for one chiplet (partition) in the parent floorplan.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartGeometry {
    /// Width over height.
    pub aspect_ratio: f64,
    /// Lower-left x coordinate in mm.
    pub x: f64,
    /// Lower-left y coordinate in mm.
    pub y: f64,
}

impl Default for PartGeometry {
    fn default() -> Self {
        Self {
            aspect_ratio: 1.0,
            x: 0.0,
            y: 0.0,
        }
    }
}

/// A candidate chiplet assignment: one partition ID per block, one
/// technology node per partition, plus per-partition geometry and the
/// cached oracle verdict.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Solution {
    /// Partition ID per vertex, dense in `[0, num_parts)`.
    pub part: Vec<usize>,
    /// Technology node label per partition.
    pub tech: Vec<String>,
    /// Aspect ratio and placement per partition.
    pub geometry: Vec<PartGeometry>,
    /// Oracle cost; `f64::INFINITY` when infeasible.
    pub cost: f64,
    /// Whether the floorplan was feasible at evaluation time.
    pub valid: bool,
}

impl Solution {
    /// A constant (single-chiplet) solution over `num_vertices` blocks.
    pub fn trivial(num_vertices: usize, tech: &str) -> Self {
        Self {
            part: vec![0; num_vertices],
            tech: vec![tech.to_string()],
            geometry: vec![PartGeometry::default()],
            cost: f64::INFINITY,
            valid: false,
        }
    }

    /// Number of partitions (`|tech|`).
    pub fn num_parts(&self) -> usize {
        self.tech.len()
    }

    /// Check the §3 invariants: dense IDs covering `{0..k}`, and
    /// `|tech| == |geometry| == k`.
    pub fn validate(&self) -> Result<(), PartitionError> {
        let k = self.tech.len();
        if self.geometry.len() != k {
            return Err(PartitionError::ArityMismatch(format!(
                "{} geometry entries for {} partitions",
                self.geometry.len(),
                k
            )));
        }
        let mut used = vec![false; k];
        for &p in &self.part {
            if p >= k {
                return Err(PartitionError::InvalidId {
                    kind: "vertex",
                    id: p,
                    len: k,
                });
            }
            used[p] = true;
        }
        if !self.part.is_empty() && used.iter().any(|u| !u) {
            return Err(PartitionError::ArityMismatch(
                "unused partition id".to_string(),
            ));
        }
        Ok(())
    }

    /// Renumber partition IDs densely in order of first appearance and
    /// permute `tech`/`geometry` alongside. A no-op on valid solutions.
    pub fn renumber_dense(&mut self) {
        let old_k = self.tech.len();
        let mut remap = vec![usize::MAX; old_k.max(1)];
        let mut next = 0usize;
        for p in self.part.iter_mut() {
            if *p >= remap.len() {
                remap.resize(*p + 1, usize::MAX);
            }
            if remap[*p] == usize::MAX {
                remap[*p] = next;
                next += 1;
            }
            *p = remap[*p];
        }
        let new_k = next.max(1);
        let mut tech = vec![String::new(); new_k];
        let mut geometry = vec![PartGeometry::default(); new_k];
        for (old, &new) in remap.iter().enumerate() {
            if new != usize::MAX {
                if let Some(t) = self.tech.get(old) {
                    tech[new] = t.clone();
                }
                if let Some(g) = self.geometry.get(old) {
                    geometry[new] = *g;
                }
            }
        }
        // Vertices may never have referenced a partition; keep arity anyway.
        for t in tech.iter_mut() {
            if t.is_empty() {
                *t = self.tech.first().cloned().unwrap_or_default();
            }
        }
        self.tech = tech;
        self.geometry = geometry;
    }

    /// Component-wise weight of every partition.
    pub fn part_weights(&self, graph: &Hypergraph) -> Vec<Vec<f64>> {
        let mut weights = vec![vec![0.0; graph.weight_dim()]; self.num_parts()];
        for (v, &p) in self.part.iter().enumerate() {
            for (acc, w) in weights[p].iter_mut().zip(graph.vertex_weight(v)) {
                *acc += w;
            }
        }
        weights
    }

    /// Check every partition against the balance bounds.
    pub fn check_balance(
        &self,
        graph: &Hypergraph,
        upper: &[f64],
        lower: &[f64],
    ) -> Result<(), PartitionError> {
        for (part, weights) in self.part_weights(graph).iter().enumerate() {
            for (dim, &w) in weights.iter().enumerate() {
                if w > upper[dim] + 1e-9 || w < lower[dim] - 1e-9 {
                    return Err(PartitionError::BalanceInfeasible { part, dim });
                }
            }
        }
        Ok(())
    }

    /// Number of hyperedges spanning more than one partition.
    pub fn cut_size(&self, graph: &Hypergraph) -> usize {
        (0..graph.num_hyperedges())
            .filter(|&e| {
                let verts = graph.edge_pins(e);
                verts.split_first().map_or(false, |(first, rest)| {
                    rest.iter().any(|&v| self.part[v] != self.part[*first])
                })
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph() -> Hypergraph {
        Hypergraph::new(
            vec![vec![0, 1], vec![1, 2], vec![2, 3]],
            vec![vec![2.0], vec![1.0], vec![1.0], vec![2.0]],
            vec![vec![1.0]; 3],
            vec![1.0; 3],
            vec![0.0; 3],
            vec!["GPIO".into(); 3],
        )
        .unwrap()
    }

    #[test]
    fn validate_catches_gaps() {
        let mut s = Solution::trivial(4, "7nm");
        s.part = vec![0, 0, 2, 2];
        s.tech = vec!["7nm".into(); 3];
        s.geometry = vec![PartGeometry::default(); 3];
        assert!(s.validate().is_err());
        s.renumber_dense();
        assert_eq!(s.part, vec![0, 0, 1, 1]);
        assert_eq!(s.num_parts(), 2);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn renumber_preserves_tech_binding() {
        let mut s = Solution {
            part: vec![1, 1, 0],
            tech: vec!["45nm".into(), "7nm".into()],
            geometry: vec![PartGeometry::default(); 2],
            cost: 0.0,
            valid: true,
        };
        s.renumber_dense();
        // Partition that held vertices 0,1 keeps its 7nm node.
        assert_eq!(s.part, vec![0, 0, 1]);
        assert_eq!(s.tech, vec!["7nm".to_string(), "45nm".to_string()]);
    }

    #[test]
    fn balance_check_flags_lopsided_partitions() {
        let g = graph();
        let s = Solution {
            part: vec![0, 0, 0, 1],
            tech: vec!["7nm".into(), "7nm".into()],
            geometry: vec![PartGeometry::default(); 2],
            cost: 0.0,
            valid: true,
        };
        let (upper, lower) = g.balance_bounds(2, 0.1);
        assert!(matches!(
            s.check_balance(&g, &upper, &lower),
            Err(PartitionError::BalanceInfeasible { part: 0, dim: 0 })
        ));
        let balanced = Solution {
            part: vec![0, 1, 0, 1],
            ..s
        };
        assert!(balanced.check_balance(&g, &upper, &lower).is_ok());
    }

    #[test]
    fn cut_and_weights() {
        let g = graph();
        let s = Solution {
            part: vec![0, 0, 1, 1],
            tech: vec!["7nm".into(), "7nm".into()],
            geometry: vec![PartGeometry::default(); 2],
            cost: 0.0,
            valid: true,
        };
        assert_eq!(s.cut_size(&g), 1);
        let w = s.part_weights(&g);
        assert_eq!(w[0][0], 3.0);
        assert_eq!(w[1][0], 3.0);
    }

    proptest! {
        #[test]
        fn renumber_is_idempotent(parts in proptest::collection::vec(0usize..6, 1..40)) {
            let k = parts.iter().copied().max().unwrap_or(0) + 1;
            let mut s = Solution {
                part: parts,
                tech: vec!["7nm".to_string(); k],
                geometry: vec![PartGeometry::default(); k],
                cost: 0.0,
                valid: true,
            };
            s.renumber_dense();
            prop_assert!(s.validate().is_ok());
            let once = s.clone();
            s.renumber_dense();
            prop_assert_eq!(once.part, s.part);
            prop_assert_eq!(once.tech, s.tech);
        }
    }
}

use floorplan::rect_gap;
use part_core::Hypergraph;

/// Reach-aware cut-cost model.
///
/// A cut net costs its weight times 1 when every pair of spanned
/// partitions sits within the net's reach (edge-to-edge), and times
/// `long_range_factor` otherwise. Rectangles come from the latest
/// floorplan; until one exists every net counts as short-range.
pub struct CutModel<'a> {
    graph: &'a Hypergraph,
    long_range_factor: f64,
    rects: Option<Vec<(f64, f64, f64, f64)>>,
}

impl<'a> CutModel<'a> {
    pub fn new(graph: &'a Hypergraph, long_range_factor: f64) -> Self {
        Self {
            graph,
            long_range_factor,
            rects: None,
        }
    }

    /// Install fresh per-partition placement rectangles from a floorplan.
    pub fn set_rects(&mut self, rects: Vec<(f64, f64, f64, f64)>) {
        self.rects = Some(rects);
    }

    fn reach_multiplier(&self, e: usize, parts: &[usize]) -> f64 {
        let Some(rects) = &self.rects else {
            return 1.0;
        };
        let reach = self.graph.reach(e);
        for (i, &a) in parts.iter().enumerate() {
            for &b in &parts[i + 1..] {
                if rect_gap(rects[a], rects[b]) > reach {
                    return self.long_range_factor;
                }
            }
        }
        1.0
    }

    /// Cost contribution of edge `e` under `part`.
    pub fn edge_cost(&self, e: usize, part: &[usize]) -> f64 {
        let pins = match self.graph.vertices_of(e) {
            Ok(p) => p,
            Err(_) => return 0.0,
        };
        let mut parts: Vec<usize> = pins.iter().map(|&v| part[v]).collect();
        parts.sort_unstable();
        parts.dedup();
        if parts.len() < 2 {
            return 0.0;
        }
        let w = self.graph.hyperedge_weight(e).first().copied().unwrap_or(1.0);
        w * self.reach_multiplier(e, &parts)
    }

    /// Total cut cost of a partition.
    pub fn total_cost(&self, part: &[usize]) -> f64 {
        (0..self.graph.num_hyperedges())
            .map(|e| self.edge_cost(e, part))
            .sum()
    }

    /// Gain of moving `v` to partition `to`: cost before minus after over
    /// the incident edges only.
    pub fn move_gain(&self, part: &mut Vec<usize>, v: usize, to: usize) -> f64 {
        let from = part[v];
        if from == to {
            return 0.0;
        }
        let edges: Vec<usize> = match self.graph.edges_of(v) {
            Ok(es) => es.to_vec(),
            Err(_) => return 0.0,
        };
        let before: f64 = edges.iter().map(|&e| self.edge_cost(e, part)).sum();
        part[v] = to;
        let after: f64 = edges.iter().map(|&e| self.edge_cost(e, part)).sum();
        part[v] = from;
        before - after
    }

    /// Gain of swapping `u` and `v` (in different partitions).
    pub fn swap_gain(&self, part: &mut Vec<usize>, u: usize, v: usize) -> f64 {
        let (pu, pv) = (part[u], part[v]);
        if pu == pv {
            return 0.0;
        }
        let mut edges: Vec<usize> = Vec::new();
        for &w in &[u, v] {
            if let Ok(es) = self.graph.edges_of(w) {
                edges.extend_from_slice(es);
            }
        }
        edges.sort_unstable();
        edges.dedup();
        let before: f64 = edges.iter().map(|&e| self.edge_cost(e, part)).sum();
        part[u] = pv;
        part[v] = pu;
        let after: f64 = edges.iter().map(|&e| self.edge_cost(e, part)).sum();
        part[u] = pu;
        part[v] = pv;
        before - after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Hypergraph {
        // 0-1, 1-2, 2-3 chain, unit weights, reach 1.0
        Hypergraph::new(
            vec![vec![0, 1], vec![1, 2], vec![2, 3]],
            vec![vec![1.0]; 4],
            vec![vec![2.0], vec![3.0], vec![4.0]],
            vec![1.0; 3],
            vec![0.0; 3],
            vec!["GPIO".to_string(); 3],
        )
        .unwrap()
    }

    #[test]
    fn uncut_edges_cost_nothing() {
        let g = graph();
        let model = CutModel::new(&g, 4.0);
        assert_eq!(model.total_cost(&[0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn move_gain_matches_total_delta() {
        let g = graph();
        let model = CutModel::new(&g, 4.0);
        let mut part = vec![0, 0, 1, 1];
        let before = model.total_cost(&part);
        let gain = model.move_gain(&mut part, 2, 0);
        part[2] = 0;
        let after = model.total_cost(&part);
        assert!((gain - (before - after)).abs() < 1e-12);
    }

    #[test]
    fn long_range_multiplier_applies_beyond_reach() {
        let g = graph();
        let mut model = CutModel::new(&g, 4.0);
        let part = vec![0, 0, 1, 1];
        let short = model.total_cost(&part);
        // 3mm of clearance between the two partitions: reach 1.0 exceeded.
        model.set_rects(vec![(0.0, 0.0, 2.0, 2.0), (5.0, 0.0, 2.0, 2.0)]);
        let long = model.total_cost(&part);
        assert!((long - 4.0 * short).abs() < 1e-12);
        // Abutting placements are short-range again.
        model.set_rects(vec![(0.0, 0.0, 2.0, 2.0), (2.0, 0.0, 2.0, 2.0)]);
        assert!((model.total_cost(&part) - short).abs() < 1e-12);
    }

    #[test]
    fn swap_gain_matches_total_delta() {
        let g = graph();
        let model = CutModel::new(&g, 4.0);
        let mut part = vec![0, 1, 0, 1];
        let before = model.total_cost(&part);
        let gain = model.swap_gain(&mut part, 1, 2);
        part.swap(1, 2);
        let after = model.total_cost(&part);
        assert!((gain - (before - after)).abs() < 1e-12);
    }

    proptest::proptest! {
        #[test]
        fn gains_agree_with_recomputation(
            parts in proptest::collection::vec(0usize..3, 4),
            v in 0usize..4,
            to in 0usize..3,
        ) {
            let g = graph();
            let model = CutModel::new(&g, 4.0);
            let mut part = parts;
            let before = model.total_cost(&part);
            let gain = model.move_gain(&mut part, v, to);
            let from = part[v];
            part[v] = to;
            let after = model.total_cost(&part);
            part[v] = from;
            proptest::prop_assert!((gain - (before - after)).abs() < 1e-9);
        }
    }
}

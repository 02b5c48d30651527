use serde::{Deserialize, Serialize};

/// A sequence pair: two permutations over chiplet indices.
///
/// If `i` precedes `j` in both permutations, `i` is west of `j`; if `i`
/// follows `j` in the positive sequence but precedes it in the negative
/// one, `i` is south of `j`. Decoding is a longest-path computation over
/// the implied horizontal and vertical constraint graphs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePair {
    pub pos: Vec<usize>,
    pub neg: Vec<usize>,
}

impl SequencePair {
    /// Identity pair over `n` chiplets.
    pub fn identity(n: usize) -> Self {
        Self {
            pos: (0..n).collect(),
            neg: (0..n).collect(),
        }
    }

    /// Decode into lower-left coordinates and the bounding box.
    ///
    /// `widths`/`heights` give each chiplet's current soft-block shape.
    /// Returns `(x, y, bbox_width, bbox_height)`.
    pub fn decode(&self, widths: &[f64], heights: &[f64]) -> (Vec<f64>, Vec<f64>, f64, f64) {
        let n = self.pos.len();
        let mut pos_rank = vec![0usize; n];
        let mut neg_rank = vec![0usize; n];
        for (r, &c) in self.pos.iter().enumerate() {
            pos_rank[c] = r;
        }
        for (r, &c) in self.neg.iter().enumerate() {
            neg_rank[c] = r;
        }

        // Longest path: process chiplets in negative-sequence order, which
        // topologically orders both constraint graphs.
        let mut x = vec![0.0f64; n];
        let mut y = vec![0.0f64; n];
        for idx in 0..n {
            let j = self.neg[idx];
            for &i in &self.neg[..idx] {
                if pos_rank[i] < pos_rank[j] {
                    // i west of j
                    x[j] = x[j].max(x[i] + widths[i]);
                } else {
                    // i south of j
                    y[j] = y[j].max(y[i] + heights[i]);
                }
            }
        }
        let mut bw = 0.0f64;
        let mut bh = 0.0f64;
        for i in 0..n {
            bw = bw.max(x[i] + widths[i]);
            bh = bh.max(y[i] + heights[i]);
        }
        (x, y, bw, bh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identity_places_in_a_row() {
        let sp = SequencePair::identity(3);
        let w = [2.0, 3.0, 1.0];
        let h = [1.0, 1.0, 1.0];
        let (x, y, bw, bh) = sp.decode(&w, &h);
        assert_eq!(x, vec![0.0, 2.0, 5.0]);
        assert_eq!(y, vec![0.0, 0.0, 0.0]);
        assert_eq!(bw, 6.0);
        assert_eq!(bh, 1.0);
    }

    #[test]
    fn reversed_pos_stacks_vertically() {
        let sp = SequencePair {
            pos: vec![2, 1, 0],
            neg: vec![0, 1, 2],
        };
        let w = [1.0; 3];
        let h = [2.0, 3.0, 1.0];
        let (x, y, bw, bh) = sp.decode(&w, &h);
        assert_eq!(x, vec![0.0; 3]);
        assert_eq!(y, vec![0.0, 2.0, 5.0]);
        assert_eq!(bw, 1.0);
        assert_eq!(bh, 6.0);
    }

    proptest! {
        #[test]
        fn decoded_placements_never_overlap(
            seed in 0u64..1000,
            n in 2usize..8,
        ) {
            use rand::seq::SliceRandom;
            use rand::SeedableRng;
            let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
            let mut sp = SequencePair::identity(n);
            sp.pos.shuffle(&mut rng);
            sp.neg.shuffle(&mut rng);
            let widths: Vec<f64> = (0..n).map(|i| 1.0 + (i as f64) * 0.5).collect();
            let heights: Vec<f64> = (0..n).map(|i| 2.0 - (i as f64) * 0.1).collect();
            let (x, y, _, _) = sp.decode(&widths, &heights);
            for i in 0..n {
                for j in i + 1..n {
                    let sep_x = x[i] + widths[i] <= x[j] + 1e-9
                        || x[j] + widths[j] <= x[i] + 1e-9;
                    let sep_y = y[i] + heights[i] <= y[j] + 1e-9
                        || y[j] + heights[j] <= y[i] + 1e-9;
                    prop_assert!(sep_x || sep_y, "chiplets {} and {} overlap", i, j);
                }
            }
        }
    }
}

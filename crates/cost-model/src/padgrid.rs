use crate::CostError;
use serde::{Deserialize, Serialize};

/// Signal pads grouped by the reach of the nets they serve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PadBucket {
    /// Reach of the nets in this bucket, mm.
    pub reach_mm: f64,
    /// Pads required by this bucket.
    pub pads: usize,
}

/// Result of sizing the bond-pad grid under a chiplet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PadGrid {
    /// Grid columns.
    pub grid_x: usize,
    /// Grid rows.
    pub grid_y: usize,
    /// Total grid area, `grid_x · grid_y · pitch²`, in mm².
    pub area_mm2: f64,
}

/// Pads reachable from the edge of a `gx × gy` grid when every pad must
/// sit within `depth` rows/columns of the boundary.
fn edge_reachable(gx: usize, gy: usize, depth: usize) -> usize {
    if depth == 0 {
        return 0;
    }
    let d2 = depth * 2;
    if gx <= d2 || gy <= d2 {
        return gx * gy;
    }
    gx * gy - (gx - d2) * (gy - d2)
}

/// Size the minimum pad grid of aspect ratio `aspect` hosting all buckets.
///
/// Buckets are sorted by ascending reach; for each prefix the grid must
/// hold the accumulated pad count inside the band of cells within
/// `reach − die_separation` of the chip edge. When the band is too small
/// the grid is enlarged one pitch unit at a time along its shorter
/// dimension, which widens the band faster than growing the longer one.
///
/// `power_and_test_pads` have no reach constraint and only contribute to
/// the total count.
pub fn size_pad_grid(
    buckets: &[PadBucket],
    power_and_test_pads: usize,
    aspect: f64,
    bonding_pitch_mm: f64,
    die_separation_mm: f64,
) -> Result<PadGrid, CostError> {
    let mut sorted: Vec<PadBucket> = buckets.iter().copied().filter(|b| b.pads > 0).collect();
    sorted.sort_by(|a, b| a.reach_mm.total_cmp(&b.reach_mm));
    for b in &sorted {
        if b.reach_mm - die_separation_mm < 0.0 {
            return Err(CostError::ReachInfeasible {
                reach: b.reach_mm,
                separation: die_separation_mm,
            });
        }
    }

    let signal_pads: usize = sorted.iter().map(|b| b.pads).sum();
    let total_pads = signal_pads + power_and_test_pads;
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    };
    let pitch = bonding_pitch_mm.max(1e-9);

    // Smallest aspect-R rectangle holding the total count.
    let gy = ((total_pads as f64) / aspect).sqrt().ceil().max(1.0) as usize;
    let gx = ((total_pads as f64) / gy as f64).ceil().max(1.0) as usize;
    let (mut gx, mut gy) = (gx, gy);

    // Enlarge until every reach prefix fits in its edge band.
    loop {
        let mut ok = true;
        let mut accumulated = 0usize;
        for b in &sorted {
            accumulated += b.pads;
            // The outermost ring sits on the edge and is always reachable.
            let depth = (((b.reach_mm - die_separation_mm) / pitch).floor()).max(1.0) as usize;
            if edge_reachable(gx, gy, depth) < accumulated {
                ok = false;
                break;
            }
        }
        if ok && gx * gy >= total_pads {
            break;
        }
        // Growing the short dimension widens the constraint band.
        if gx <= gy {
            gx += 1;
        } else {
            gy += 1;
        }
    }

    Ok(PadGrid {
        grid_x: gx,
        grid_y: gy,
        area_mm2: gx as f64 * gy as f64 * pitch * pitch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn grid_always_hosts_every_pad(
            signal in 0usize..500,
            extra in 0usize..200,
            reach in 0.3f64..5.0,
        ) {
            let buckets = [PadBucket { reach_mm: reach, pads: signal }];
            let grid = size_pad_grid(&buckets, extra, 1.0, 0.1, 0.25).unwrap();
            prop_assert!(grid.grid_x * grid.grid_y >= signal + extra);
        }
    }

    #[test]
    fn zero_reach_with_separation_fails() {
        let buckets = [PadBucket {
            reach_mm: 0.0,
            pads: 8,
        }];
        let err = size_pad_grid(&buckets, 0, 1.0, 0.1, 0.25).unwrap_err();
        assert!(matches!(err, CostError::ReachInfeasible { .. }));
    }

    #[test]
    fn unconstrained_pads_fill_minimum_rectangle() {
        let grid = size_pad_grid(&[], 100, 1.0, 0.1, 0.0).unwrap();
        assert!(grid.grid_x * grid.grid_y >= 100);
        // Square-ish at aspect 1.
        assert!(grid.grid_x.abs_diff(grid.grid_y) <= 1);
        let expected_area = grid.grid_x as f64 * grid.grid_y as f64 * 0.01;
        assert!((grid.area_mm2 - expected_area).abs() < 1e-12);
    }

    #[test]
    fn tight_reach_forces_larger_grid() {
        let loose = size_pad_grid(
            &[PadBucket {
                reach_mm: 10.0,
                pads: 400,
            }],
            0,
            1.0,
            0.1,
            0.0,
        )
        .unwrap();
        let tight = size_pad_grid(
            &[PadBucket {
                reach_mm: 0.25,
                pads: 400,
            }],
            0,
            1.0,
            0.1,
            0.0,
        )
        .unwrap();
        // Only two rows of cells are reachable at 0.25mm reach and 0.1mm
        // pitch, so the perimeter must stretch.
        assert!(tight.area_mm2 > loose.area_mm2);
    }

    #[test]
    fn buckets_checked_cumulatively() {
        // The short-reach bucket alone fits, but the long-reach bucket's
        // pads accumulate on top of it.
        let grid = size_pad_grid(
            &[
                PadBucket {
                    reach_mm: 0.3,
                    pads: 50,
                },
                PadBucket {
                    reach_mm: 2.0,
                    pads: 500,
                },
            ],
            0,
            1.0,
            0.1,
            0.0,
        )
        .unwrap();
        assert!(grid.grid_x * grid.grid_y >= 550);
    }
}

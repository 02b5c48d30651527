//! Cross-node area and power scaling.
//!
//! Blocks are characterized at a home node; when the optimizer assigns a
//! chiplet to a different node, areas and powers are rescaled through a
//! relative-density table normalized to 7 nm. Memory scales worse than
//! logic, analog barely scales at all.

/// Relative die area of known nodes, normalized to 7 nm.
const NODE_AREA_TABLE: &[(&str, f64)] = &[
    ("3nm", 0.64),
    ("5nm", 0.81),
    ("7nm", 1.0),
    ("10nm", 1.54),
    ("12nm", 1.77),
    ("14nm", 2.0),
    ("16nm", 2.2),
    ("22nm", 3.0),
    ("28nm", 3.6),
    ("40nm", 5.4),
    ("45nm", 6.0),
    ("65nm", 9.0),
    ("90nm", 12.0),
    ("130nm", 18.0),
];

/// Relative area of `node` versus 7 nm.
///
/// Unknown labels fall back to quadratic scaling of the parsed nanometer
/// figure; unparseable labels scale as 7 nm.
pub fn relative_node_area(node: &str) -> f64 {
    if let Some(&(_, rel)) = NODE_AREA_TABLE.iter().find(|(n, _)| *n == node) {
        return rel;
    }
    match node.trim_end_matches("nm").parse::<f64>() {
        Ok(nm) if nm > 0.0 => (nm / 7.0).powi(2),
        _ => 1.0,
    }
}

/// Area multiplier when moving a block from `from` to `to`, blended over
/// its memory/logic/analog content.
pub fn area_scale_factor(
    from: &str,
    to: &str,
    memory_frac: f64,
    logic_frac: f64,
    analog_frac: f64,
) -> f64 {
    if from == to {
        return 1.0;
    }
    let s = relative_node_area(to) / relative_node_area(from);
    logic_frac * s + memory_frac * s.powf(0.9) + analog_frac * s.powf(0.5)
}

/// Power multiplier when moving a block from `from` to `to`.
pub fn power_scale_factor(from: &str, to: &str) -> f64 {
    if from == to {
        return 1.0;
    }
    (relative_node_area(to) / relative_node_area(from)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_on_same_node() {
        assert_eq!(area_scale_factor("7nm", "7nm", 0.3, 0.6, 0.1), 1.0);
        assert_eq!(power_scale_factor("45nm", "45nm"), 1.0);
    }

    #[test]
    fn older_node_grows_area() {
        let s = area_scale_factor("7nm", "45nm", 0.0, 1.0, 0.0);
        assert!((s - 6.0).abs() < 1e-12);
        // Analog-heavy content grows less.
        let s_ana = area_scale_factor("7nm", "45nm", 0.0, 0.0, 1.0);
        assert!(s_ana < s);
    }

    #[test]
    fn unknown_node_falls_back_to_quadratic() {
        let rel = relative_node_area("20nm");
        assert!((rel - (20.0f64 / 7.0).powi(2)).abs() < 1e-12);
        assert_eq!(relative_node_area("weird"), 1.0);
    }

    #[test]
    fn scaling_round_trip_cancels() {
        let down = area_scale_factor("45nm", "7nm", 0.0, 1.0, 0.0);
        let up = area_scale_factor("7nm", "45nm", 0.0, 1.0, 0.0);
        assert!((down * up - 1.0).abs() < 1e-9);
    }
}

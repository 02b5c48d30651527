use crate::{guarded_setters, is_nonneg, is_pos, is_unit};
use serde::{Deserialize, Serialize};

/// One metal/device layer of a stackup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Active layers carry devices and contribute gates; routing layers
    /// only contribute cost and defects.
    pub active: Option<bool>,
    pub cost_per_mm2: Option<f64>,
    /// Defect density in defects per mm².
    pub defect_density: Option<f64>,
    /// Fraction of the layer area that is yield-critical.
    pub critical_area_fraction: Option<f64>,
    /// Negative-binomial clustering factor (alpha).
    pub clustering_factor: Option<f64>,
    pub gates_per_mm2: Option<f64>,
    pub mask_cost: Option<f64>,
    #[serde(default)]
    static_latched: bool,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    guarded_setters!(
        "Layer",
        set_active => active: bool,
        set_cost_per_mm2 => cost_per_mm2: f64,
        set_defect_density => defect_density: f64,
        set_critical_area_fraction => critical_area_fraction: f64,
        set_clustering_factor => clustering_factor: f64,
        set_gates_per_mm2 => gates_per_mm2: f64,
        set_mask_cost => mask_cost: f64,
    );

    /// All required fields present and in range.
    pub fn fully_defined(&self) -> bool {
        !self.name.is_empty()
            && self.active.is_some()
            && is_nonneg(&self.cost_per_mm2)
            && is_nonneg(&self.defect_density)
            && is_unit(&self.critical_area_fraction)
            && is_pos(&self.clustering_factor)
            && is_nonneg(&self.gates_per_mm2)
            && is_nonneg(&self.mask_cost)
    }

    /// Latch the entity read-only.
    pub fn make_static(&mut self) {
        self.static_latched = true;
    }

    /// Whether the latch has been set.
    pub fn is_static(&self) -> bool {
        self.static_latched
    }

    /// Clustered-defect (negative binomial) yield for a die of `area_mm2`.
    ///
    /// `(1 + D·A·f/alpha)^(-alpha)`; large alpha degenerates to the Poisson
    /// model `exp(-D·A·f)`.
    pub fn layer_yield(&self, area_mm2: f64) -> f64 {
        let d = self.defect_density.unwrap_or(0.0);
        let f = self.critical_area_fraction.unwrap_or(1.0);
        let alpha = self.clustering_factor.unwrap_or(2.0);
        let defects = d * area_mm2.max(0.0) * f;
        if alpha > 1e6 {
            (-defects).exp()
        } else {
            (1.0 + defects / alpha).powf(-alpha)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layer() -> Layer {
        let mut l = Layer::new("M1");
        l.set_active(true).unwrap();
        l.set_cost_per_mm2(0.05).unwrap();
        l.set_defect_density(0.002).unwrap();
        l.set_critical_area_fraction(0.6).unwrap();
        l.set_clustering_factor(2.0).unwrap();
        l.set_gates_per_mm2(90.0e6).unwrap();
        l.set_mask_cost(500_000.0).unwrap();
        l
    }

    #[test]
    fn zero_area_yields_one() {
        assert_eq!(layer().layer_yield(0.0), 1.0);
    }

    #[test]
    fn latch_blocks_writes() {
        let mut l = layer();
        assert!(l.fully_defined());
        l.make_static();
        assert!(l.set_defect_density(0.1).is_err());
        assert_eq!(l.defect_density, Some(0.002));
    }

    proptest! {
        #[test]
        fn yield_in_unit_interval(area in 0.0f64..10_000.0) {
            let y = layer().layer_yield(area);
            prop_assert!((0.0..=1.0).contains(&y));
        }

        #[test]
        fn yield_monotone_in_area(a in 0.0f64..1000.0, delta in 0.0f64..1000.0) {
            let l = layer();
            prop_assert!(l.layer_yield(a + delta) <= l.layer_yield(a) + 1e-12);
        }
    }
}

use crate::{guarded_setters, is_nonneg, is_pos, is_unit, LibraryError};
use serde::{Deserialize, Serialize};

/// A wafer fabrication process for one technology node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WaferProcess {
    /// Process name, conventionally the node label ("7nm").
    pub name: String,
    pub wafer_diameter_mm: Option<f64>,
    pub edge_exclusion_mm: Option<f64>,
    /// Systematic wafer-level yield in [0,1], independent of defects.
    pub wafer_process_yield: Option<f64>,
    /// Dicing lane width in mm, lost between adjacent dies.
    pub dicing_distance_mm: Option<f64>,
    pub reticle_x_mm: Option<f64>,
    pub reticle_y_mm: Option<f64>,
    /// Whether dies are packed on a fixed grid across the wafer.
    pub wafer_fill_grid: Option<bool>,
    // NRE design cost per mm², split by content type and design phase.
    pub nre_front_end_cost_per_mm2_memory: Option<f64>,
    pub nre_front_end_cost_per_mm2_logic: Option<f64>,
    pub nre_front_end_cost_per_mm2_analog: Option<f64>,
    pub nre_back_end_cost_per_mm2_memory: Option<f64>,
    pub nre_back_end_cost_per_mm2_logic: Option<f64>,
    pub nre_back_end_cost_per_mm2_analog: Option<f64>,
    #[serde(default)]
    static_latched: bool,
}

impl WaferProcess {
    /// New empty process with a name; fields are set afterwards.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    guarded_setters!(
        "WaferProcess",
        set_wafer_diameter => wafer_diameter_mm: f64,
        set_edge_exclusion => edge_exclusion_mm: f64,
        set_wafer_process_yield => wafer_process_yield: f64,
        set_dicing_distance => dicing_distance_mm: f64,
        set_reticle_x => reticle_x_mm: f64,
        set_reticle_y => reticle_y_mm: f64,
        set_wafer_fill_grid => wafer_fill_grid: bool,
        set_nre_front_end_cost_per_mm2_memory => nre_front_end_cost_per_mm2_memory: f64,
        set_nre_front_end_cost_per_mm2_logic => nre_front_end_cost_per_mm2_logic: f64,
        set_nre_front_end_cost_per_mm2_analog => nre_front_end_cost_per_mm2_analog: f64,
        set_nre_back_end_cost_per_mm2_memory => nre_back_end_cost_per_mm2_memory: f64,
        set_nre_back_end_cost_per_mm2_logic => nre_back_end_cost_per_mm2_logic: f64,
        set_nre_back_end_cost_per_mm2_analog => nre_back_end_cost_per_mm2_analog: f64,
    );

    /// All required fields present and in range.
    pub fn fully_defined(&self) -> bool {
        !self.name.is_empty()
            && is_pos(&self.wafer_diameter_mm)
            && is_nonneg(&self.edge_exclusion_mm)
            && is_unit(&self.wafer_process_yield)
            && is_nonneg(&self.dicing_distance_mm)
            && is_pos(&self.reticle_x_mm)
            && is_pos(&self.reticle_y_mm)
            && self.wafer_fill_grid.is_some()
            && is_nonneg(&self.nre_front_end_cost_per_mm2_memory)
            && is_nonneg(&self.nre_front_end_cost_per_mm2_logic)
            && is_nonneg(&self.nre_front_end_cost_per_mm2_analog)
            && is_nonneg(&self.nre_back_end_cost_per_mm2_memory)
            && is_nonneg(&self.nre_back_end_cost_per_mm2_logic)
            && is_nonneg(&self.nre_back_end_cost_per_mm2_analog)
    }

    /// Latch the entity read-only.
    pub fn make_static(&mut self) {
        self.static_latched = true;
    }

    /// Whether the latch has been set.
    pub fn is_static(&self) -> bool {
        self.static_latched
    }

    /// Usable wafer diameter after edge exclusion, mm.
    pub fn usable_diameter_mm(&self) -> Result<f64, LibraryError> {
        let d = self.wafer_diameter_mm.ok_or(LibraryError::MissingField {
            entity: "WaferProcess",
            field: "wafer_diameter_mm",
        })?;
        let ee = self.edge_exclusion_mm.ok_or(LibraryError::MissingField {
            entity: "WaferProcess",
            field: "edge_exclusion_mm",
        })?;
        Ok((d - 2.0 * ee).max(0.0))
    }

    /// NRE design cost per mm² for a memory/logic/analog content split.
    ///
    /// Front-end and back-end constants are summed per content type and
    /// weighted by the fractions.
    pub fn nre_design_cost_per_mm2(
        &self,
        memory_frac: f64,
        logic_frac: f64,
        analog_frac: f64,
    ) -> f64 {
        let mem = self.nre_front_end_cost_per_mm2_memory.unwrap_or(0.0)
            + self.nre_back_end_cost_per_mm2_memory.unwrap_or(0.0);
        let log = self.nre_front_end_cost_per_mm2_logic.unwrap_or(0.0)
            + self.nre_back_end_cost_per_mm2_logic.unwrap_or(0.0);
        let ana = self.nre_front_end_cost_per_mm2_analog.unwrap_or(0.0)
            + self.nre_back_end_cost_per_mm2_analog.unwrap_or(0.0);
        memory_frac * mem + logic_frac * log + analog_frac * ana
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wafer_7nm() -> WaferProcess {
        let mut w = WaferProcess::new("7nm");
        w.set_wafer_diameter(300.0).unwrap();
        w.set_edge_exclusion(3.0).unwrap();
        w.set_wafer_process_yield(0.98).unwrap();
        w.set_dicing_distance(0.1).unwrap();
        w.set_reticle_x(26.0).unwrap();
        w.set_reticle_y(33.0).unwrap();
        w.set_wafer_fill_grid(true).unwrap();
        w.set_nre_front_end_cost_per_mm2_memory(1000.0).unwrap();
        w.set_nre_front_end_cost_per_mm2_logic(3000.0).unwrap();
        w.set_nre_front_end_cost_per_mm2_analog(5000.0).unwrap();
        w.set_nre_back_end_cost_per_mm2_memory(500.0).unwrap();
        w.set_nre_back_end_cost_per_mm2_logic(2000.0).unwrap();
        w.set_nre_back_end_cost_per_mm2_analog(4000.0).unwrap();
        w
    }

    #[test]
    fn definition_and_latch() {
        let mut w = wafer_7nm();
        assert!(w.fully_defined());
        w.make_static();
        assert_eq!(
            w.set_wafer_diameter(200.0),
            Err(LibraryError::StaticMutation {
                entity: "WaferProcess",
                field: "wafer_diameter_mm",
            })
        );
        // Latched values are unchanged.
        assert_eq!(w.wafer_diameter_mm, Some(300.0));
    }

    #[test]
    fn incomplete_is_not_fully_defined() {
        let mut w = WaferProcess::new("7nm");
        w.set_wafer_diameter(300.0).unwrap();
        assert!(!w.fully_defined());
    }

    #[test]
    fn latch_then_serialize_roundtrip() {
        let mut w = wafer_7nm();
        w.make_static();
        let json = serde_json::to_string(&w).unwrap();
        let back: WaferProcess = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn nre_cost_weights_fractions() {
        let w = wafer_7nm();
        // all-logic: 3000 + 2000
        assert_eq!(w.nre_design_cost_per_mm2(0.0, 1.0, 0.0), 5000.0);
        let mixed = w.nre_design_cost_per_mm2(0.5, 0.5, 0.0);
        assert_eq!(mixed, 0.5 * 1500.0 + 0.5 * 5000.0);
    }

    #[test]
    fn usable_diameter_subtracts_both_edges() {
        let w = wafer_7nm();
        assert_eq!(w.usable_diameter_mm().unwrap(), 294.0);
    }
}

use crate::{guarded_setters, is_nonneg, is_pos};
use serde::{Deserialize, Serialize};

/// An IO cell type: the physical driver/receiver pair for one class of
/// chiplet-to-chiplet signaling (e.g. UCIe, AIB, GPIO).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IoCell {
    /// Type tag referenced by netlist `<net type=...>` attributes.
    pub tag: String,
    pub rx_area_mm2: Option<f64>,
    pub tx_area_mm2: Option<f64>,
    /// Die-edge length consumed by one cell, in mm.
    pub shoreline_mm: Option<f64>,
    /// Bandwidth of one cell in Gbps.
    pub bandwidth_gbps: Option<f64>,
    /// Signal wires per cell.
    pub wire_count: Option<u32>,
    pub bidirectional: Option<bool>,
    pub energy_per_bit_pj: Option<f64>,
    /// Maximum Manhattan span in mm.
    pub reach_mm: Option<f64>,
    #[serde(default)]
    static_latched: bool,
}

impl IoCell {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    guarded_setters!(
        "IoCell",
        set_rx_area => rx_area_mm2: f64,
        set_tx_area => tx_area_mm2: f64,
        set_shoreline => shoreline_mm: f64,
        set_bandwidth => bandwidth_gbps: f64,
        set_energy_per_bit => energy_per_bit_pj: f64,
        set_reach => reach_mm: f64,
        set_bidirectional => bidirectional: bool,
    );

    /// Latch-guarded setter.
    pub fn set_wire_count(&mut self, value: u32) -> Result<(), crate::LibraryError> {
        if self.static_latched {
            return Err(crate::LibraryError::StaticMutation {
                entity: "IoCell",
                field: "wire_count",
            });
        }
        self.wire_count = Some(value);
        Ok(())
    }

    /// All required fields present and in range.
    pub fn fully_defined(&self) -> bool {
        !self.tag.is_empty()
            && is_nonneg(&self.rx_area_mm2)
            && is_nonneg(&self.tx_area_mm2)
            && is_nonneg(&self.shoreline_mm)
            && is_pos(&self.bandwidth_gbps)
            && self.wire_count.is_some()
            && self.bidirectional.is_some()
            && is_nonneg(&self.energy_per_bit_pj)
            && is_nonneg(&self.reach_mm)
    }

    /// Latch the entity read-only.
    pub fn make_static(&mut self) {
        self.static_latched = true;
    }

    /// Whether the latch has been set.
    pub fn is_static(&self) -> bool {
        self.static_latched
    }

    /// Energy scale applied per transferred bit: bidirectional cells share
    /// their wires between directions.
    pub fn direction_factor(&self) -> f64 {
        if self.bidirectional.unwrap_or(false) {
            0.5
        } else {
            1.0
        }
    }
}

use crate::{guarded_setters, is_nonneg, is_pos, is_unit, LibraryError, SECONDS_PER_YEAR};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A die-to-substrate assembly process.
///
/// Carries two machine models (pick-and-place, bonding) with identical
/// amortization math, plus the geometric and electrical bonding
/// parameters shared by the pad-grid sizing and assembly-yield formulas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub name: String,
    pub materials_cost_per_mm2: Option<f64>,
    // Pick-and-place machine.
    pub picknplace_machine_cost: Option<f64>,
    pub picknplace_machine_lifetime_years: Option<f64>,
    /// Fraction of wall-clock time the machine is productive, in [0,1].
    pub picknplace_machine_uptime: Option<f64>,
    pub picknplace_technician_yearly_cost: Option<f64>,
    pub picknplace_time_s: Option<f64>,
    /// Dies placed per pick-and-place operation.
    pub picknplace_group: Option<u32>,
    // Bonding machine.
    pub bonding_machine_cost: Option<f64>,
    pub bonding_machine_lifetime_years: Option<f64>,
    pub bonding_machine_uptime: Option<f64>,
    pub bonding_technician_yearly_cost: Option<f64>,
    pub bonding_time_s: Option<f64>,
    /// Dies bonded per bonding operation.
    pub bonding_group: Option<u32>,
    // Geometry and electrical limits.
    pub die_separation_mm: Option<f64>,
    pub edge_exclusion_mm: Option<f64>,
    /// Maximum current density through a pad, in mA/mm².
    pub max_pad_current_density: Option<f64>,
    pub bonding_pitch_mm: Option<f64>,
    // Yield components.
    pub alignment_yield: Option<f64>,
    pub bonding_yield: Option<f64>,
    pub dielectric_bond_defect_density: Option<f64>,
    /// Black-box override for both machine cost-per-second figures.
    pub bb_cost_per_second: Option<f64>,
    #[serde(default)]
    static_latched: bool,
}

impl Assembly {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    guarded_setters!(
        "Assembly",
        set_materials_cost_per_mm2 => materials_cost_per_mm2: f64,
        set_picknplace_machine_cost => picknplace_machine_cost: f64,
        set_picknplace_machine_lifetime_years => picknplace_machine_lifetime_years: f64,
        set_picknplace_machine_uptime => picknplace_machine_uptime: f64,
        set_picknplace_technician_yearly_cost => picknplace_technician_yearly_cost: f64,
        set_picknplace_time_s => picknplace_time_s: f64,
        set_bonding_machine_cost => bonding_machine_cost: f64,
        set_bonding_machine_lifetime_years => bonding_machine_lifetime_years: f64,
        set_bonding_machine_uptime => bonding_machine_uptime: f64,
        set_bonding_technician_yearly_cost => bonding_technician_yearly_cost: f64,
        set_bonding_time_s => bonding_time_s: f64,
        set_die_separation => die_separation_mm: f64,
        set_edge_exclusion => edge_exclusion_mm: f64,
        set_max_pad_current_density => max_pad_current_density: f64,
        set_bonding_pitch => bonding_pitch_mm: f64,
        set_alignment_yield => alignment_yield: f64,
        set_bonding_yield => bonding_yield: f64,
        set_dielectric_bond_defect_density => dielectric_bond_defect_density: f64,
        set_bb_cost_per_second => bb_cost_per_second: f64,
    );

    /// Latch-guarded setter.
    pub fn set_picknplace_group(&mut self, value: u32) -> Result<(), LibraryError> {
        if self.static_latched {
            return Err(LibraryError::StaticMutation {
                entity: "Assembly",
                field: "picknplace_group",
            });
        }
        self.picknplace_group = Some(value);
        Ok(())
    }

    /// Latch-guarded setter.
    pub fn set_bonding_group(&mut self, value: u32) -> Result<(), LibraryError> {
        if self.static_latched {
            return Err(LibraryError::StaticMutation {
                entity: "Assembly",
                field: "bonding_group",
            });
        }
        self.bonding_group = Some(value);
        Ok(())
    }

    /// All required fields present and in range. `bb_cost_per_second` is
    /// optional by definition.
    pub fn fully_defined(&self) -> bool {
        !self.name.is_empty()
            && is_nonneg(&self.materials_cost_per_mm2)
            && is_nonneg(&self.picknplace_machine_cost)
            && is_pos(&self.picknplace_machine_lifetime_years)
            && is_unit(&self.picknplace_machine_uptime)
            && is_nonneg(&self.picknplace_technician_yearly_cost)
            && is_nonneg(&self.picknplace_time_s)
            && self.picknplace_group.is_some()
            && is_nonneg(&self.bonding_machine_cost)
            && is_pos(&self.bonding_machine_lifetime_years)
            && is_unit(&self.bonding_machine_uptime)
            && is_nonneg(&self.bonding_technician_yearly_cost)
            && is_nonneg(&self.bonding_time_s)
            && self.bonding_group.is_some()
            && is_nonneg(&self.die_separation_mm)
            && is_nonneg(&self.edge_exclusion_mm)
            && is_nonneg(&self.max_pad_current_density)
            && is_pos(&self.bonding_pitch_mm)
            && is_unit(&self.alignment_yield)
            && is_unit(&self.bonding_yield)
            && is_nonneg(&self.dielectric_bond_defect_density)
    }

    /// Latch the entity read-only.
    pub fn make_static(&mut self) {
        self.static_latched = true;
    }

    /// Whether the latch has been set.
    pub fn is_static(&self) -> bool {
        self.static_latched
    }

    fn machine_cost_per_second(
        &self,
        machine_cost: Option<f64>,
        lifetime_years: Option<f64>,
        technician_yearly_cost: Option<f64>,
        uptime: Option<f64>,
        field: &'static str,
    ) -> Result<f64, LibraryError> {
        if let Some(bb) = self.bb_cost_per_second {
            return Ok(bb);
        }
        let missing = |field| LibraryError::MissingField {
            entity: "Assembly",
            field,
        };
        let cost = machine_cost.ok_or_else(|| missing(field))?;
        let lifetime = lifetime_years.ok_or_else(|| missing(field))?;
        let tech = technician_yearly_cost.ok_or_else(|| missing(field))?;
        let up = uptime.ok_or_else(|| missing(field))?;
        Ok((cost / lifetime + tech) / SECONDS_PER_YEAR * up)
    }

    /// Amortized pick-and-place cost per productive second.
    pub fn picknplace_cost_per_second(&self) -> Result<f64, LibraryError> {
        self.machine_cost_per_second(
            self.picknplace_machine_cost,
            self.picknplace_machine_lifetime_years,
            self.picknplace_technician_yearly_cost,
            self.picknplace_machine_uptime,
            "picknplace_machine",
        )
    }

    /// Amortized bonding cost per productive second.
    pub fn bonding_cost_per_second(&self) -> Result<f64, LibraryError> {
        self.machine_cost_per_second(
            self.bonding_machine_cost,
            self.bonding_machine_lifetime_years,
            self.bonding_technician_yearly_cost,
            self.bonding_machine_uptime,
            "bonding_machine",
        )
    }

    /// Deliverable power through one bond pad at `core_voltage` volts:
    /// `J_max · π·(pitch/4)² · V`.
    pub fn power_per_pad(&self, core_voltage: f64) -> f64 {
        let j = self.max_pad_current_density.unwrap_or(0.0);
        let pitch = self.bonding_pitch_mm.unwrap_or(0.0);
        let pad_area = PI * (pitch / 4.0).powi(2);
        j * pad_area * core_voltage
    }

    /// Yield of assembling `n_chips` dies with `n_bonds` total bonds over
    /// `area_mm2` of dielectric bond interface.
    pub fn assembly_yield(&self, n_chips: usize, n_bonds: usize, area_mm2: f64) -> f64 {
        let align = self.alignment_yield.unwrap_or(1.0);
        let bond = self.bonding_yield.unwrap_or(1.0);
        let d0 = self.dielectric_bond_defect_density.unwrap_or(0.0);
        align.powi(n_chips as i32) * bond.powi(n_bonds as i32)
            / (1.0 + d0 * area_mm2.max(0.0))
    }

    /// Assembly time for placing and bonding `n_chips` dies, accounting for
    /// the per-operation group sizes.
    pub fn assembly_time_s(&self, n_chips: usize) -> f64 {
        let pnp_ops = div_ceil(n_chips, self.picknplace_group.unwrap_or(1).max(1) as usize);
        let bond_ops = div_ceil(n_chips, self.bonding_group.unwrap_or(1).max(1) as usize);
        pnp_ops as f64 * self.picknplace_time_s.unwrap_or(0.0)
            + bond_ops as f64 * self.bonding_time_s.unwrap_or(0.0)
    }
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

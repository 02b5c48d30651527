#![deny(warnings)]

//! Technology libraries: wafer processes, layer stackups, IO cells,
//! assembly processes, and test processes.
//!
//! Every entity follows the same lifecycle: constructed field-by-field
//! (all numerics are `Option`s, no sentinels), checked with
//! [`fully_defined`](WaferProcess::fully_defined), then latched with
//! `make_static`. Once latched, setters fail with
//! [`LibraryError::StaticMutation`]; the optimizers only ever read.

use thiserror::Error;

mod assembly;
pub mod builtin;
mod io_cell;
mod layer;
mod scaling;
mod test_process;
mod wafer;

pub use assembly::Assembly;
pub use io_cell::IoCell;
pub use layer::Layer;
pub use scaling::{area_scale_factor, power_scale_factor, relative_node_area};
pub use test_process::{Test, TestPhase};
pub use wafer::WaferProcess;

/// Seconds in one (non-leap) year, used for machine-cost amortization.
pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Errors raised by library entities.
#[derive(Debug, Error, PartialEq)]
pub enum LibraryError {
    /// A required field was never set.
    #[error("{entity}: required field `{field}` is missing")]
    MissingField {
        /// Entity type name.
        entity: &'static str,
        /// Field name.
        field: &'static str,
    },
    /// Write attempted after `make_static`.
    #[error("{entity}: `{field}` written after make_static")]
    StaticMutation {
        /// Entity type name.
        entity: &'static str,
        /// Field name.
        field: &'static str,
    },
}

/// Generates latch-guarded setters for `Option` fields.
macro_rules! guarded_setters {
    ($entity:literal, $( $setter:ident => $field:ident : $ty:ty ),+ $(,)?) => {
        $(
            /// Latch-guarded setter.
            pub fn $setter(&mut self, value: $ty) -> Result<(), crate::LibraryError> {
                if self.static_latched {
                    return Err(crate::LibraryError::StaticMutation {
                        entity: $entity,
                        field: stringify!($field),
                    });
                }
                self.$field = Some(value);
                Ok(())
            }
        )+
    };
}
pub(crate) use guarded_setters;

/// `Some(x)` with `x` in `[0, 1]`.
pub(crate) fn is_unit(x: &Option<f64>) -> bool {
    matches!(x, Some(v) if (0.0..=1.0).contains(v))
}

/// `Some(x)` with `x >= 0`.
pub(crate) fn is_nonneg(x: &Option<f64>) -> bool {
    matches!(x, Some(v) if *v >= 0.0 && v.is_finite())
}

/// `Some(x)` with `x > 0`.
pub(crate) fn is_pos(x: &Option<f64>) -> bool {
    matches!(x, Some(v) if *v > 0.0 && v.is_finite())
}

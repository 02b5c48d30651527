use thiserror::Error;

/// Errors raised while building or evaluating a chip tree.
#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    /// Pad-grid sizing impossible: a net's reach minus the die separation
    /// is negative, so no pad can ever satisfy it.
    #[error("pad grid infeasible: reach {reach} mm < die separation {separation} mm")]
    ReachInfeasible {
        /// Net reach in mm.
        reach: f64,
        /// Die separation in mm.
        separation: f64,
    },
    /// A library entity required by the evaluation is incomplete.
    #[error(transparent)]
    Library(#[from] tech_lib::LibraryError),
    /// The underlying hypergraph/partition store reported an error.
    #[error(transparent)]
    Partition(#[from] part_core::PartitionError),
    /// Chip arena index out of range.
    #[error("chip id {0} out of range")]
    InvalidChipId(usize),
    /// Mutation attempted after the arena was latched.
    #[error("chip arena mutated after make_static")]
    StaticMutation,
    /// A derived value came out negative, NaN, or infinite.
    #[error("ill-defined derived value: {0}")]
    IllDefined(&'static str),
    /// No IO cell in the library matches a net's type tag.
    #[error("unknown io type: {0}")]
    UnknownIoType(String),
    /// No wafer process in the library matches an assigned node.
    #[error("unknown technology node: {0}")]
    UnknownTech(String),
}

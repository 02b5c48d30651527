use thiserror::Error;

/// Errors raised by the hypergraph store and partition state.
#[derive(Debug, Error, PartialEq)]
pub enum PartitionError {
    /// Vertex or hyperedge index outside the stored range.
    #[error("{kind} id {id} is out of range (size {len})")]
    InvalidId {
        /// "vertex" or "hyperedge".
        kind: &'static str,
        /// Offending index.
        id: usize,
        /// Number of stored entities.
        len: usize,
    },
    /// No assignment (or move) satisfies the balance bounds.
    #[error("partition {part} violates the balance bounds in dimension {dim}")]
    BalanceInfeasible {
        /// Offending partition.
        part: usize,
        /// Offending weight dimension.
        dim: usize,
    },
    /// Weight vectors must share one dimensionality.
    #[error("weight dimension mismatch: expected {expected}, got {got}")]
    WeightDimMismatch {
        /// Dimensionality of the first weight vector seen.
        expected: usize,
        /// Dimensionality of the offending vector.
        got: usize,
    },
    /// Partition state arity broken: |tech| or |geometry| != num_parts.
    #[error("solution arity mismatch: {0}")]
    ArityMismatch(String),
}

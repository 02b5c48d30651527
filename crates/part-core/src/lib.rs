#![deny(warnings)]

//! Core domain models for chiplet partitioning.
//!
//! This crate defines the block-level hypergraph, the partition state shared
//! by every optimizer, and validation helpers that guarantee basic
//! invariants (dense partition IDs, consistent CSR tables, balance bounds).

mod error;
mod hypergraph;
mod partition;

pub use error::PartitionError;
pub use hypergraph::{Block, Hypergraph, Net};
pub use partition::{PartGeometry, Solution};

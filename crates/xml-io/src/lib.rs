#![deny(warnings)]

//! File ingestion and result serialization.
//!
//! Five library XML files (IO, layer, wafer, assembly, test), the netlist
//! XML, and the whitespace-separated blocks file come in; partition,
//! tech-assignment, and summary files go out. Parse and library errors
//! are fatal by policy: they mean a broken input, not a bad candidate.

mod library;
mod netlist;
mod results;

pub use library::{
    load_assemblies, load_io_cells, load_layers, load_tests, load_wafer_processes,
};
pub use netlist::{load_blocks, load_netlist};
pub use results::{
    read_partition_file, write_partition_file, write_summary, write_techs_file, PartSummary,
    RunSummary,
};

use thiserror::Error;

/// Errors raised while reading inputs.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(String),
    #[error("{file}: {detail}")]
    Malformed { file: String, detail: String },
    /// A library entity came out incomplete or was written after latching.
    #[error(transparent)]
    Library(#[from] tech_lib::LibraryError),
    /// The netlist references a block name the blocks file never defined.
    #[error("unknown block in netlist: {0}")]
    UnknownBlock(String),
    /// The netlist references an IO type missing from the IO library.
    #[error("unknown io type in netlist: {0}")]
    UnknownIoType(String),
}

pub(crate) fn parse_num(file: &str, attr: &str, raw: &str) -> Result<f64, ParseError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::Malformed {
            file: file.to_string(),
            detail: format!("attribute `{attr}`: not a number: {raw:?}"),
        })
}

pub(crate) fn parse_bool(file: &str, attr: &str, raw: &str) -> Result<bool, ParseError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ParseError::Malformed {
            file: file.to_string(),
            detail: format!("attribute `{attr}`: not a boolean: {other:?}"),
        }),
    }
}

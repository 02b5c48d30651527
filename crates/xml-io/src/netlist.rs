use crate::{parse_num, ParseError};
use part_core::{Block, Hypergraph, Net};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;
use tech_lib::IoCell;
use tracing::info;

/// Read the blocks file: one block per line,
/// `Name Area(mm²) Power(W) Tech memory_frac logic_frac analog_frac`.
/// Blank lines are skipped; line order defines vertex IDs.
pub fn load_blocks(path: &Path) -> Result<Vec<Block>, ParseError> {
    let file = path.display().to_string();
    let text = std::fs::read_to_string(path)?;
    let mut blocks = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(ParseError::Malformed {
                file,
                detail: format!("line {}: expected 7 fields, got {}", lineno + 1, fields.len()),
            });
        }
        let block = Block {
            name: fields[0].to_string(),
            area_mm2: parse_num(&file, "area", fields[1])?,
            power_w: parse_num(&file, "power", fields[2])?,
            tech: fields[3].to_string(),
            memory_frac: parse_num(&file, "memory_frac", fields[4])?,
            logic_frac: parse_num(&file, "logic_frac", fields[5])?,
            analog_frac: parse_num(&file, "analog_frac", fields[6])?,
        };
        if !block.fractions_consistent() {
            return Err(ParseError::Malformed {
                file,
                detail: format!(
                    "line {}: memory/logic/analog fractions of `{}` do not sum to 1",
                    lineno + 1,
                    block.name
                ),
            });
        }
        blocks.push(block);
    }
    info!(count = blocks.len(), path = %path.display(), "blocks file loaded");
    Ok(blocks)
}

/// Read the netlist XML and build the hypergraph.
///
/// Each `<net type=... block0=... block1=... bandwidth=...>` becomes a
/// two-pin hyperedge. The net's reach comes from its IO type, capped by
/// `reach_cap` (the CLI search radius); its io-size is the IO cell's
/// shoreline.
pub fn load_netlist(
    path: &Path,
    blocks: &[Block],
    ios: &[IoCell],
    reach_cap: f64,
) -> Result<Hypergraph, ParseError> {
    let file = path.display().to_string();
    let text = std::fs::read_to_string(path)?;
    let ids: HashMap<&str, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    let mut nets: Vec<Net> = Vec::new();
    let mut reader = Reader::from_str(&text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() != b"net" {
                    continue;
                }
                let mut io_type = String::new();
                let mut block0 = String::new();
                let mut block1 = String::new();
                let mut bandwidth = 0.0f64;
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| ParseError::Xml(err.to_string()))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|err| ParseError::Xml(err.to_string()))?
                        .into_owned();
                    match attr.key.as_ref() {
                        b"type" => io_type = value,
                        b"block0" => block0 = value,
                        b"block1" => block1 = value,
                        b"bandwidth" => bandwidth = parse_num(&file, "bandwidth", &value)?,
                        _ => {}
                    }
                }
                let v0 = *ids
                    .get(block0.as_str())
                    .ok_or_else(|| ParseError::UnknownBlock(block0.clone()))?;
                let v1 = *ids
                    .get(block1.as_str())
                    .ok_or_else(|| ParseError::UnknownBlock(block1.clone()))?;
                let cell = ios
                    .iter()
                    .find(|c| c.tag == io_type)
                    .ok_or_else(|| ParseError::UnknownIoType(io_type.clone()))?;
                nets.push(Net {
                    vertices: vec![v0, v1],
                    weights: vec![bandwidth],
                    io_type,
                    reach: cell.reach_mm.unwrap_or(reach_cap).min(reach_cap),
                    io_size: cell.shoreline_mm.unwrap_or(0.0),
                });
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(ParseError::Xml(err.to_string())),
        }
    }

    let vertex_weights = blocks
        .iter()
        .map(|b| vec![b.area_mm2, b.power_w])
        .collect();
    let graph = Hypergraph::from_nets(vertex_weights, nets).map_err(|err| {
        ParseError::Malformed {
            file,
            detail: err.to_string(),
        }
    })?;
    info!(
        vertices = graph.num_vertices(),
        nets = graph.num_hyperedges(),
        path = %path.display(),
        "netlist loaded"
    );
    Ok(graph)
}

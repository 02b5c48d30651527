use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// One partition's line in the summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartSummary {
    pub part: usize,
    /// Share of total block area, in percent.
    pub size_percent: f64,
    pub tech: String,
}

/// Everything the summary files carry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub num_parts: usize,
    pub cost: f64,
    pub valid: bool,
    pub parts: Vec<PartSummary>,
    /// Seconds spent per swept partition count.
    pub per_k_seconds: Vec<(usize, f64)>,
    pub total_seconds: f64,
    /// Human-readable run timestamp.
    pub timestamp: String,
}

/// Write `<base>.cpart.<k>`: one partition ID per line, vertex order.
pub fn write_partition_file(base: &Path, k: usize, part: &[usize]) -> Result<PathBuf, ParseError> {
    let path = suffixed(base, &format!("cpart.{k}"));
    let mut f = std::fs::File::create(&path)?;
    for &p in part {
        writeln!(f, "{p}")?;
    }
    info!(path = %path.display(), "partition written");
    Ok(path)
}

/// Write `<base>.techs.<k>`: one tech node per partition.
pub fn write_techs_file(base: &Path, k: usize, techs: &[String]) -> Result<PathBuf, ParseError> {
    let path = suffixed(base, &format!("techs.{k}"));
    let mut f = std::fs::File::create(&path)?;
    for t in techs {
        writeln!(f, "{t}")?;
    }
    info!(path = %path.display(), "tech assignment written");
    Ok(path)
}

/// Write `<base>.summary.txt` and its JSON twin.
pub fn write_summary(base: &Path, summary: &RunSummary) -> Result<PathBuf, ParseError> {
    let path = suffixed(base, "summary.txt");
    let mut f = std::fs::File::create(&path)?;
    writeln!(f, "timestamp: {}", summary.timestamp)?;
    writeln!(f, "partitions: {}", summary.num_parts)?;
    if summary.valid {
        writeln!(f, "cost: {:.4}", summary.cost)?;
    } else {
        writeln!(f, "cost: infeasible")?;
    }
    writeln!(f, "valid: {}", summary.valid)?;
    for p in &summary.parts {
        writeln!(
            f,
            "part {}: {:.1}% of block area, {}",
            p.part, p.size_percent, p.tech
        )?;
    }
    for (k, seconds) in &summary.per_k_seconds {
        writeln!(f, "k={k}: {seconds:.2}s")?;
    }
    writeln!(f, "total: {:.2}s", summary.total_seconds)?;

    let json_path = suffixed(base, "summary.json");
    let json = serde_json::to_string_pretty(summary).map_err(|err| ParseError::Malformed {
        file: json_path.display().to_string(),
        detail: err.to_string(),
    })?;
    std::fs::write(&json_path, json)?;
    info!(path = %path.display(), "summary written");
    Ok(path)
}

/// Read a partition file: one integer per line. Used by the evaluation
/// mode of the CLI.
pub fn read_partition_file(path: &Path) -> Result<Vec<usize>, ParseError> {
    let text = std::fs::read_to_string(path)?;
    let mut part = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id = line.parse::<usize>().map_err(|_| ParseError::Malformed {
            file: path.display().to_string(),
            detail: format!("line {}: not a partition id: {line:?}", lineno + 1),
        })?;
        part.push(id);
    }
    Ok(part)
}

fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "netlist".to_string());
    name.push('.');
    name.push_str(suffix);
    base.with_file_name(name)
}

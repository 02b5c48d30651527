#![deny(warnings)]

//! `chipletPart`: partition a block-level netlist into chiplets.
//!
//! Standard mode sweeps partition counts over one technology node;
//! `--genetic-tech-part` searches the joint (k, partition, tech) space;
//! a leading partition-file argument switches to evaluation mode.

use anyhow::{anyhow, bail, Context, Result};
use cost_model::{CostOracle, OracleParams, SharedOracle};
use floorplan::FloorplanConfig;
use genetic::{run_ga, GaConfig, GaContext};
use part_core::{Block, PartGeometry, Solution};
use partition::{run_sweep, DriverConfig};
use refine::{evaluate_with_floorplan, RefineConfig};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use xml_io::{
    load_assemblies, load_blocks, load_io_cells, load_layers, load_netlist, load_tests,
    load_wafer_processes, read_partition_file, write_partition_file, write_summary,
    write_techs_file, PartSummary, RunSummary,
};

const USAGE: &str = "usage: chipletPart [partition_file] <io_xml> <layer_xml> <wafer_xml> \
<assembly_xml> <test_xml> <netlist_xml> <blocks_txt> <reach> <separation> [tech] \
[--genetic-tech-part] [--canonical-ga] [--tech-nodes a,b,c] [--generations G] \
[--population P] [--seed S] [--mutation-rate F] [--crossover-rate F] \
[--min-partitions N] [--max-partitions N]";

#[derive(Debug, Default)]
struct Args {
    partition_file: Option<PathBuf>,
    io_xml: PathBuf,
    layer_xml: PathBuf,
    wafer_xml: PathBuf,
    assembly_xml: PathBuf,
    test_xml: PathBuf,
    netlist_xml: PathBuf,
    blocks_txt: PathBuf,
    reach: f64,
    separation: f64,
    tech: Option<String>,
    genetic: bool,
    canonical: bool,
    tech_nodes: Vec<String>,
    generations: Option<usize>,
    population: Option<usize>,
    seed: u64,
    mutation_rate: Option<f64>,
    crossover_rate: Option<f64>,
    min_partitions: Option<usize>,
    max_partitions: Option<usize>,
}

/// A partition file is a readable non-XML file whose first non-blank
/// line parses as an integer.
fn looks_like_partition_file(path: &str) -> bool {
    if path.ends_with(".xml") {
        return false;
    }
    let Ok(text) = std::fs::read_to_string(path) else {
        return false;
    };
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map_or(false, |l| l.parse::<usize>().is_ok())
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        seed: 1,
        ..Default::default()
    };
    let mut positionals: Vec<String> = Vec::new();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--genetic-tech-part" => args.genetic = true,
            "--canonical-ga" => {
                args.genetic = true;
                args.canonical = true;
            }
            "--tech-nodes" => {
                let list = it.next().ok_or_else(|| anyhow!("--tech-nodes needs a value"))?;
                args.tech_nodes = list.split(',').map(|s| s.trim().to_string()).collect();
            }
            "--generations" => args.generations = Some(parse_flag(&mut it, "--generations")?),
            "--population" => args.population = Some(parse_flag(&mut it, "--population")?),
            "--seed" => args.seed = parse_flag(&mut it, "--seed")?,
            "--mutation-rate" => args.mutation_rate = Some(parse_flag(&mut it, "--mutation-rate")?),
            "--crossover-rate" => {
                args.crossover_rate = Some(parse_flag(&mut it, "--crossover-rate")?)
            }
            "--min-partitions" => {
                args.min_partitions = Some(parse_flag(&mut it, "--min-partitions")?)
            }
            "--max-partitions" => {
                args.max_partitions = Some(parse_flag(&mut it, "--max-partitions")?)
            }
            other if other.starts_with("--") => bail!("unknown flag: {other}"),
            _ => positionals.push(arg),
        }
    }

    if !positionals.is_empty() && looks_like_partition_file(&positionals[0]) {
        args.partition_file = Some(PathBuf::from(positionals.remove(0)));
    }
    if positionals.len() < 9 {
        bail!("expected 9 positional arguments, got {}\n{USAGE}", positionals.len());
    }
    args.io_xml = PathBuf::from(&positionals[0]);
    args.layer_xml = PathBuf::from(&positionals[1]);
    args.wafer_xml = PathBuf::from(&positionals[2]);
    args.assembly_xml = PathBuf::from(&positionals[3]);
    args.test_xml = PathBuf::from(&positionals[4]);
    args.netlist_xml = PathBuf::from(&positionals[5]);
    args.blocks_txt = PathBuf::from(&positionals[6]);
    args.reach = positionals[7]
        .parse()
        .with_context(|| format!("reach: not a number: {:?}", positionals[7]))?;
    args.separation = positionals[8]
        .parse()
        .with_context(|| format!("separation: not a number: {:?}", positionals[8]))?;
    args.tech = positionals.get(9).cloned();
    Ok(args)
}

fn parse_flag<T: std::str::FromStr>(
    it: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T> {
    let raw = it.next().ok_or_else(|| anyhow!("{flag} needs a value"))?;
    raw.parse()
        .map_err(|_| anyhow!("{flag}: invalid value {raw:?}"))
}

struct Inputs {
    oracle: SharedOracle,
    blocks: Vec<Block>,
    techs_in_library: Vec<String>,
}

fn load_inputs(args: &Args) -> Result<Inputs> {
    let ios = load_io_cells(&args.io_xml)?;
    let layers = load_layers(&args.layer_xml)?;
    let wafers = load_wafer_processes(&args.wafer_xml)?;
    let assemblies = load_assemblies(&args.assembly_xml, Some(args.separation))?;
    let tests = load_tests(&args.test_xml)?;
    let blocks = load_blocks(&args.blocks_txt)?;
    let graph = load_netlist(&args.netlist_xml, &blocks, &ios, args.reach)?;

    let assembly = assemblies
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("assembly library is empty"))?;
    let test = tests
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("test library is empty"))?;
    let techs_in_library = wafers.iter().map(|w| w.name.clone()).collect();

    let oracle = CostOracle::new(
        graph,
        blocks.clone(),
        wafers,
        layers,
        ios,
        assembly,
        test,
        OracleParams::default(),
    )
    .into_shared();
    Ok(Inputs {
        oracle,
        blocks,
        techs_in_library,
    })
}

fn part_summaries(blocks: &[Block], solution: &Solution) -> Vec<PartSummary> {
    let total: f64 = blocks.iter().map(|b| b.area_mm2).sum();
    let mut areas = vec![0.0; solution.num_parts()];
    for (v, b) in blocks.iter().enumerate() {
        areas[solution.part[v]] += b.area_mm2;
    }
    areas
        .iter()
        .enumerate()
        .map(|(p, a)| PartSummary {
            part: p,
            size_percent: if total > 0.0 { a / total * 100.0 } else { 0.0 },
            tech: solution.tech[p].clone(),
        })
        .collect()
}

fn report_and_write(
    args: &Args,
    blocks: &[Block],
    best: Option<&Solution>,
    per_k_seconds: Vec<(usize, f64)>,
    total_seconds: f64,
) -> Result<()> {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    match best {
        Some(solution) => {
            let k = solution.num_parts();
            println!(
                "Best solution | k: {} | cost: {:.4} | techs: {}",
                k,
                solution.cost,
                solution.tech.join(",")
            );
            for (k_step, seconds) in &per_k_seconds {
                println!("  k={k_step}: {seconds:.2}s");
            }
            println!("  total: {total_seconds:.2}s");
            write_partition_file(&args.netlist_xml, k, &solution.part)?;
            write_techs_file(&args.netlist_xml, k, &solution.tech)?;
            write_summary(
                &args.netlist_xml,
                &RunSummary {
                    num_parts: k,
                    cost: solution.cost,
                    valid: solution.valid,
                    parts: part_summaries(blocks, solution),
                    per_k_seconds,
                    total_seconds,
                    timestamp,
                },
            )?;
        }
        None => {
            println!("No feasible solution found (every candidate was infeasible).");
            write_summary(
                &args.netlist_xml,
                &RunSummary {
                    num_parts: 0,
                    cost: f64::INFINITY,
                    valid: false,
                    parts: Vec::new(),
                    per_k_seconds,
                    total_seconds,
                    timestamp,
                },
            )?;
        }
    }
    Ok(())
}

fn run_standard(args: &Args, inputs: &Inputs) -> Result<()> {
    let tech = args
        .tech
        .clone()
        .ok_or_else(|| anyhow!("standard mode needs a technology node\n{USAGE}"))?;
    let cfg = DriverConfig {
        min_parts: args.min_partitions.unwrap_or(1),
        max_parts: args.max_partitions.unwrap_or(8),
        tech,
        seed: args.seed,
        floorplan: FloorplanConfig {
            seed: args.seed,
            ..Default::default()
        },
        ..Default::default()
    };
    let report = run_sweep(&inputs.oracle, &cfg);
    for (rank, t) in report.top.iter().enumerate() {
        info!(
            rank,
            k = t.k,
            cost = t.solution.cost,
            valid = t.solution.valid,
            "candidate"
        );
        println!(
            "#{} | k: {} | cost: {} | valid: {}",
            rank + 1,
            t.k,
            if t.solution.cost.is_finite() {
                format!("{:.4}", t.solution.cost)
            } else {
                "inf".to_string()
            },
            t.solution.valid
        );
    }
    report_and_write(
        args,
        &inputs.blocks,
        report.best.as_ref().map(|b| &b.solution),
        report.per_k_seconds,
        report.total_seconds,
    )
}

fn run_genetic(args: &Args, inputs: &Inputs) -> Result<()> {
    let mut cfg = GaConfig::from_default_yaml().unwrap_or_default();
    cfg.canonical = args.canonical;
    if let Some(g) = args.generations {
        cfg.num_generations = g;
    }
    if let Some(p) = args.population {
        cfg.population_size = p;
    }
    if let Some(m) = args.mutation_rate {
        cfg.mutation_rate = m;
    }
    if let Some(c) = args.crossover_rate {
        cfg.crossover_rate = c;
    }
    if let Some(lo) = args.min_partitions {
        cfg.min_parts = lo;
    }
    if let Some(hi) = args.max_partitions {
        cfg.max_parts = hi;
    }
    let available = if args.tech_nodes.is_empty() {
        inputs.techs_in_library.clone()
    } else {
        args.tech_nodes.clone()
    };
    let ctx = GaContext {
        oracle: inputs.oracle.clone(),
        available_techs: available,
        refine: RefineConfig::default(),
        floorplan: FloorplanConfig {
            seed: args.seed,
            ..Default::default()
        },
        seed: args.seed,
    };
    let report = run_ga(&ctx, &cfg);
    println!(
        "Genetic run | generations: {} | best-per-generation: {}",
        report.generations_run,
        report
            .history
            .iter()
            .map(|c| if c.is_finite() {
                format!("{c:.2}")
            } else {
                "inf".to_string()
            })
            .collect::<Vec<_>>()
            .join(" ")
    );
    report_and_write(
        args,
        &inputs.blocks,
        report.best.as_ref().map(|b| &b.solution),
        Vec::new(),
        report.total_seconds,
    )
}

fn run_evaluation(args: &Args, inputs: &Inputs, partition_file: &Path) -> Result<()> {
    let started = std::time::Instant::now();
    let part = read_partition_file(partition_file)?;
    let graph = {
        let guard = inputs.oracle.lock().expect("oracle lock poisoned");
        guard.graph().clone()
    };
    if part.len() != graph.num_vertices() {
        bail!(
            "partition file has {} entries for {} blocks",
            part.len(),
            graph.num_vertices()
        );
    }
    let tech = args
        .tech
        .clone()
        .ok_or_else(|| anyhow!("evaluation mode needs a technology node\n{USAGE}"))?;
    let k = part.iter().copied().max().map_or(1, |m| m + 1);
    let mut solution = Solution {
        part,
        tech: vec![tech; k],
        geometry: vec![PartGeometry::default(); k],
        cost: f64::INFINITY,
        valid: false,
    };
    solution.renumber_dense();
    let (eval, _) = evaluate_with_floorplan(
        &graph,
        &inputs.blocks,
        &inputs.oracle,
        &FloorplanConfig {
            seed: args.seed,
            ..Default::default()
        },
        &mut solution,
    );
    println!(
        "Evaluated partition | k: {} | cost: {} | valid: {}",
        solution.num_parts(),
        if eval.cost.is_finite() {
            format!("{:.4}", eval.cost)
        } else {
            "inf".to_string()
        },
        eval.valid
    );
    println!(
        "  area: {:.2} mm² | power: {:.2} W | assembled yield: {:.4}",
        eval.total_area_mm2, eval.total_power_w, eval.assembled_yield
    );
    let best = eval.valid.then_some(&solution);
    report_and_write(
        args,
        &inputs.blocks,
        best,
        Vec::new(),
        started.elapsed().as_secs_f64(),
    )
}

fn run() -> Result<()> {
    let args = parse_args()?;
    info!(netlist = %args.netlist_xml.display(), genetic = args.genetic, "starting chipletPart");
    let inputs = load_inputs(&args)?;
    if let Some(partition_file) = args.partition_file.clone() {
        run_evaluation(&args, &inputs, &partition_file)
    } else if args.genetic {
        run_genetic(&args, &inputs)
    } else {
        run_standard(&args, &inputs)
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("chipletPart: {err:#}");
            std::process::exit(1);
        }
    }
}

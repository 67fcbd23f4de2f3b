//! Opcalc CLI
//!
//! Command-line front end for Psi-matrix path enumeration:
//! - `run`: find every constraint-feasible simple path for each demand
//! - `matrix`: print the base (adjacency) Psi matrix of a graph
//! - `check`: validate graph and demand files

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use opcalc_graph::{load_demands, load_graph, Demand, GraphStore, OrientedGraph};
use opcalc_psi::{
    GrowthOptions, GrowthSummary, PathGrowthEngine, PathMatrix, PoolGeometry, RecordPool,
    Termination,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

mod config;

use config::RunConfig;

#[derive(Parser)]
#[command(name = "opcalc")]
#[command(
    author,
    version,
    about = "Enumerate multi-constrained simple paths with Psi matrices"
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find every feasible path for each demand.
    Run(RunArgs),

    /// Print the base Psi matrix of a graph.
    Matrix {
        /// Graph file (`src dst w1 ... wD` per line)
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Validate input files and print their sizes.
    Check {
        /// Graph file (`src dst w1 ... wD` per line)
        #[arg(short, long)]
        graph: PathBuf,
        /// Demand file (`src dst c1 ... cD` per line)
        #[arg(short, long)]
        demands: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Graph file (`src dst w1 ... wD` per line)
    #[arg(short, long)]
    graph: PathBuf,
    /// Demand file (`src dst c1 ... cD` per line)
    #[arg(short, long)]
    demands: PathBuf,
    /// JSON run configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Records per demand pool (default: vertex count cubed, at least 1000)
    #[arg(long)]
    pool_capacity: Option<usize>,
    /// Stop growing paths at this many hops
    #[arg(long)]
    max_hops: Option<usize>,
    /// Compute matrix cells on all cores
    #[arg(long)]
    parallel: bool,
    /// Abort a demand after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Also report direct source -> destination edges
    #[arg(long)]
    direct_edges: bool,
    /// Emit results as JSON on stdout
    #[arg(long)]
    json: bool,
    /// Print the base matrix before running
    #[arg(long)]
    show_matrix: bool,
    /// Print the path matrix after every iteration
    #[arg(long)]
    trace_matrices: bool,
}

impl RunArgs {
    fn config(&self) -> Result<RunConfig> {
        let file = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        Ok(file.with_overrides(&RunConfig {
            pool_capacity: self.pool_capacity,
            max_hops: self.max_hops,
            parallel: self.parallel,
            timeout_ms: self.timeout_ms,
            report_direct_edges: self.direct_edges,
        }))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => cmd_run(&args),
        Commands::Matrix { graph } => cmd_matrix(&graph),
        Commands::Check { graph, demands } => cmd_check(&graph, demands.as_deref()),
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// Input
// ============================================================================

fn read_graph(path: &Path) -> Result<OrientedGraph> {
    load_graph(path).with_context(|| format!("failed to load graph {}", path.display()))
}

fn read_demands(path: &Path, graph: &mut OrientedGraph) -> Result<Vec<Demand>> {
    load_demands(path, graph).with_context(|| format!("failed to load demands {}", path.display()))
}

/// Base matrix in a pool of its own, shared read-only by every demand.
fn base_matrix(graph: &OrientedGraph) -> Result<(PathMatrix, RecordPool)> {
    let geometry = PoolGeometry::for_graph(graph.vertex_count(), graph.weight_dimension())?;
    let pool = RecordPool::new(geometry);
    let base = PathMatrix::from_graph(graph, &pool).context("failed to build base matrix")?;
    Ok((base, pool))
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Serialize)]
struct DemandReport {
    demand: Demand,
    #[serde(flatten)]
    outcome: Outcome,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome {
    Completed { summary: GrowthSummary },
    Failed { error: String },
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let config = args.config()?;
    let mut graph = read_graph(&args.graph)?;
    let demands = read_demands(&args.demands, &mut graph)?;
    let (base, _base_pool) = base_matrix(&graph)?;
    let geometry = config.pool_geometry(graph.vertex_count(), graph.weight_dimension())?;
    let options = config.growth_options();

    if !args.json {
        println!(
            "{} {} ({} vertices, {} edges, {} demands)",
            "Loaded".green().bold(),
            args.graph.display(),
            graph.vertex_count(),
            graph.edge_count(),
            demands.len()
        );
        if args.show_matrix {
            println!("{base}");
        }
    }

    let mut reports = Vec::with_capacity(demands.len());
    for demand in demands {
        let trace = args.trace_matrices && !args.json;
        let result = run_demand(&base, &demand, geometry, &options, trace);
        let outcome = match result {
            Ok(summary) => Outcome::Completed { summary },
            Err(err) => Outcome::Failed {
                error: err.to_string(),
            },
        };
        if !args.json {
            print_report(&demand, &outcome);
        }
        reports.push(DemandReport { demand, outcome });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    let failed = reports
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} demands failed", reports.len());
    }
    Ok(())
}

/// Grow paths for one demand in a fresh pool, optionally printing each
/// iteration's matrix.
fn run_demand(
    base: &PathMatrix,
    demand: &Demand,
    geometry: PoolGeometry,
    options: &GrowthOptions,
    trace: bool,
) -> opcalc_psi::Result<GrowthSummary> {
    let engine = PathGrowthEngine::new(
        base,
        demand.clone(),
        RecordPool::new(geometry),
        options.clone(),
    )?;
    let mut run = engine.run();
    if trace {
        while let Some(report) = run.step()? {
            println!(
                "{} {} ({} hops)",
                "Iteration".cyan().bold(),
                report.iteration,
                report.hop_length
            );
            match run.current_matrix() {
                Some(matrix) => println!("{matrix}"),
                None => println!("  obtained a zero matrix"),
            }
        }
    }
    run.into_summary()
}

fn print_report(demand: &Demand, outcome: &Outcome) {
    println!();
    println!("{} {}", "Demand".green().bold(), demand.to_string().bold());
    match outcome {
        Outcome::Completed { summary } => {
            for path in &summary.found {
                println!("  {} {}", "→".cyan(), path);
            }
            let stop = match summary.termination {
                Termination::Saturated { hop_length } => {
                    format!("saturated after {hop_length} hops")
                }
                Termination::HopBound { hop_length } => {
                    format!("hop bound {hop_length} reached")
                }
            };
            println!(
                "  {} path(s), {} iteration(s), {}, peak records {}",
                summary.found.len().to_string().yellow(),
                summary.iterations.len(),
                stop,
                summary.peak_records
            );
        }
        Outcome::Failed { error } => {
            println!("  {} {}", "error:".red().bold(), error);
        }
    }
}

fn cmd_matrix(graph_path: &Path) -> Result<()> {
    let graph = read_graph(graph_path)?;
    let (base, _pool) = base_matrix(&graph)?;
    for (i, vertex) in graph.vertices().iter().enumerate() {
        println!("  {} {}", i.to_string().yellow(), vertex);
    }
    println!();
    println!("{base}");
    Ok(())
}

fn cmd_check(graph_path: &Path, demands_path: Option<&Path>) -> Result<()> {
    println!("{} {}", "Checking".green().bold(), graph_path.display());
    let mut graph = read_graph(graph_path)?;
    let loaded_vertices = graph.vertex_count();

    println!("  Vertices: {}", loaded_vertices);
    println!("  Edges: {}", graph.edge_count());
    println!("  Weight dimension: {}", graph.weight_dimension());

    if let Some(path) = demands_path {
        let demands = read_demands(path, &mut graph)?;
        println!("  Demands: {}", demands.len());
        let added = graph.vertex_count() - loaded_vertices;
        if added > 0 {
            println!(
                "  {} {} demand vertices have no edges",
                "info:".yellow().bold(),
                added
            );
        }
    }

    println!("{}", "Valid.".green());
    Ok(())
}

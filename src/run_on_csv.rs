use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Writer};
use tracing::info;

mod block_list;
mod bmssp;
mod dijkstra;
mod types;

use types::{Cost, NodeId};

#[derive(Parser, Debug)]
#[command(name = "run_on_csv")]
#[command(about = "Build a graph from a CSV of node_id,neighbor,weight rows and time an SSSP algorithm across sources.", long_about = None)]
struct Cli {
    /// Path to the .csv file
    #[arg(short, long)]
    csv: String,

    /// Number of runs. Picks a new (deterministic) source id per run (0, 1, 2, ...num_runs).
    #[arg(short, long)]
    num_runs: usize,

    #[arg(short, long, value_enum, default_value = "bmssp")]
    algorithm: SspAlgorithm,

    /// Output CSV of per-run timings (run, millis). If omitted, prints to stdout only.
    #[arg(short, long)]
    out: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SspAlgorithm {
    Bmssp,
    Dijkstra,
}

impl SspAlgorithm {
    fn run(&self, adj: &[Vec<(NodeId, Cost)>], start: NodeId) -> Vec<Cost> {
        match self {
            SspAlgorithm::Bmssp => bmssp::bmssp_all(adj, start),
            SspAlgorithm::Dijkstra => dijkstra::dijkstra_all(adj, start),
        }
    }
}

fn build_adjacency_list(edges: &[(NodeId, NodeId, Cost)]) -> Vec<Vec<(NodeId, Cost)>> {
    // First, determine how many nodes we have.
    let max_node = edges
        .iter()
        .map(|&(u, v, _)| u.max(v))
        .max()
        .unwrap_or(0);

    let mut adj: Vec<Vec<(NodeId, Cost)>> = vec![Vec::new(); max_node + 1];
    for &(u, v, w) in edges {
        adj[u].push((v, w));
    }
    adj
}

fn parse_csv_and_build_adjacency_list(path: &str) -> Result<Vec<Vec<(NodeId, Cost)>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true) // important: skip header line
        .from_path(path)
        .with_context(|| format!("opening {path}"))?;

    let mut edges = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let node_id: NodeId = record[0].parse()?;
        let neighbor_node_id: NodeId = record[1].parse()?;
        let weight: Cost = record[2].parse()?;
        edges.push((node_id, neighbor_node_id, weight));
    }

    Ok(build_adjacency_list(&edges))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let adj = parse_csv_and_build_adjacency_list(&cli.csv)?;
    let edges: usize = adj.iter().map(Vec::len).sum();
    info!(nodes = adj.len(), edges, "graph loaded from {}", cli.csv);

    let mut duration_millis = Vec::with_capacity(cli.num_runs);
    for src_idx in 0..cli.num_runs {
        let started = Instant::now();
        let dist = cli.algorithm.run(&adj, src_idx);
        duration_millis.push(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            run = src_idx,
            reachable = dist.iter().filter(|d| d.is_finite()).count(),
            "run finished"
        );
    }
    println!("{:?}", duration_millis);

    if let Some(out_path) = cli.out {
        let mut wtr =
            Writer::from_path(&out_path).with_context(|| format!("creating CSV {out_path}"))?;
        wtr.write_record(["run", "millis"])?;
        for (run, millis) in duration_millis.iter().enumerate() {
            wtr.write_record(&[run.to_string(), format!("{millis:.3}")])?;
        }
        wtr.flush()?;
        info!("wrote timings for {} runs to {}", duration_millis.len(), out_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_spans_to_max_node_id() {
        let edges = vec![(0, 3, 1.0), (3, 1, 2.0)];
        let adj = build_adjacency_list(&edges);
        assert_eq!(adj.len(), 4);
        assert_eq!(adj[0], vec![(3, 1.0)]);
        assert_eq!(adj[3], vec![(1, 2.0)]);
        assert!(adj[2].is_empty());
    }
}

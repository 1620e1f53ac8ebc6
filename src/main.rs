use std::io::Read;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

mod block_list;
mod bmssp;
mod dijkstra;
mod types;

use types::{Cost, NodeId};

#[derive(Parser, Debug)]
#[command(name = "bmssp")]
#[command(about = "Read a graph from stdin and run an SSSP algorithm from a source node id.", long_about = None)]
struct Cli {
    /// Algorithm to run
    #[arg(short, long, value_enum, default_value = "bmssp")]
    algorithm: SspAlgorithm,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SspAlgorithm {
    Bmssp,
    Dijkstra,
}

impl SspAlgorithm {
    fn label(&self) -> &'static str {
        match self {
            SspAlgorithm::Bmssp => "BMSSP",
            SspAlgorithm::Dijkstra => "Dijkstra",
        }
    }

    fn run(&self, adj: &[Vec<(NodeId, Cost)>], start: NodeId) -> Vec<Cost> {
        match self {
            SspAlgorithm::Bmssp => bmssp::bmssp_all(adj, start),
            SspAlgorithm::Dijkstra => dijkstra::dijkstra_all(adj, start),
        }
    }
}

/// Parse `n m`, then `m` edge triples `u v w`, then the source id. Edges with
/// an endpoint outside `[0, n)` are silently dropped.
fn parse_graph(input: &str) -> Result<(Vec<Vec<(NodeId, Cost)>>, NodeId)> {
    let mut tokens = input.split_ascii_whitespace();
    let mut next = |what: &'static str| tokens.next().with_context(|| format!("missing {what}"));

    let n: usize = next("node count")?.parse().context("parsing node count")?;
    let m: usize = next("edge count")?.parse().context("parsing edge count")?;

    let mut adj: Vec<Vec<(NodeId, Cost)>> = vec![Vec::new(); n];
    let mut dropped = 0usize;
    for i in 0..m {
        let u: usize = next("edge source")?
            .parse()
            .with_context(|| format!("parsing edge {i}"))?;
        let v: usize = next("edge target")?
            .parse()
            .with_context(|| format!("parsing edge {i}"))?;
        let w: Cost = next("edge weight")?
            .parse()
            .with_context(|| format!("parsing edge {i}"))?;
        if u < n && v < n {
            adj[u].push((v, w));
        } else {
            dropped += 1;
        }
    }
    let source: usize = next("source id")?.parse().context("parsing source id")?;

    info!(
        nodes = n,
        edges = m - dropped,
        dropped,
        "graph loaded from stdin"
    );
    Ok((adj, source))
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

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading graph from stdin")?;
    let (adj, source) = parse_graph(&input)?;

    let started = Instant::now();
    let dist = cli.algorithm.run(&adj, source);
    let elapsed = started.elapsed();

    println!(
        "{} Time: {} ms",
        cli.algorithm.label(),
        elapsed.as_secs_f64() * 1000.0
    );
    println!("--------------------");
    for (i, d) in dist.iter().enumerate() {
        if d.is_finite() {
            println!("Node {}: {}", i, d);
        } else {
            println!("Node {}: INF", i);
        }
    }

    Ok(())
}

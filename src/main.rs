use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mesh_explorer::outage::OutageScenario;
use mesh_explorer::{Explorer, FileSource, HttpSource, SnapshotSource};

/// Diagnostic CLI: load a link-state snapshot and run one query against it.
#[derive(Parser)]
#[command(name = "mesh-explorer")]
struct Cli {
    /// Link database endpoint, e.g. http://api.andrew.mesh/api/v1/ospf/linkdb
    #[arg(long, conflicts_with = "file")]
    url: Option<String>,

    /// Read the link database from a JSON file instead
    #[arg(long)]
    file: Option<PathBuf>,

    /// Snapshot age (seconds) beyond which a query re-fetches
    #[arg(long, default_value_t = 60)]
    max_age: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Neighborhood view around a router
    Neighbors {
        router: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
        #[arg(long)]
        include_egress: bool,
    },
    /// Simulate removing routers and/or links
    Outage {
        /// Comma-joined router IDs
        #[arg(long, default_value = "")]
        routers: String,
        /// Comma-joined from->to pairs
        #[arg(long, default_value = "")]
        links: String,
    },
    /// List the links between two routers
    Edges { from: String, to: String },
}

fn parse_links(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.split_once("->")
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .with_context(|| format!("link must be from->to, got: {part}"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();

    let source: Box<dyn SnapshotSource> = match (&cli.url, &cli.file) {
        (Some(url), None) => Box::new(HttpSource::new(url)),
        (None, Some(path)) => Box::new(FileSource::new(path)),
        _ => bail!("exactly one of --url or --file is required"),
    };

    let explorer = Explorer::load(source, Duration::seconds(cli.max_age)).await?;

    let output = match cli.command {
        Command::Neighbors {
            router,
            depth,
            include_egress,
        } => serde_json::to_string_pretty(
            &explorer.neighbors(&router, depth, include_egress).await?,
        )?,
        Command::Outage { routers, links } => {
            let scenario = OutageScenario {
                routers: routers
                    .split(',')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect(),
                links: parse_links(&links)?,
            };
            serde_json::to_string_pretty(&explorer.simulate_outage(&scenario).await?)?
        }
        Command::Edges { from, to } => {
            serde_json::to_string_pretty(&explorer.edges_between(&from, &to).await?)?
        }
    };

    println!("{output}");
    Ok(())
}

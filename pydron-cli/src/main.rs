//! `pydron`: loads configuration, builds a worker pool from it, parses a
//! graph literal, drives one traversal to completion, and maps the result
//! to a process exit code (spec §6 "Exit codes").
//!
//! This binary does not lower a source program into a graph — it accepts
//! the pre-built graph literal (JSON) a front end would otherwise hand the
//! traverser directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use pydron_core::config::ConfigLoader;
use pydron_core::graph::literal::{build_graph, GraphLiteral};
use pydron_core::pool::strategy::TrivialStrategy;
use pydron_core::pool::Pool;
use pydron_core::traverser::{CancellationHandle, Traverser};
use pydron_core::value::Value;
use pydron_core::worker::remote::LocalWorkerHandle;
use pydron_core::worker::Worker;

#[derive(Parser)]
#[command(name = "pydron")]
#[command(about = "Run a pydron dataflow graph to completion", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a graph literal (JSON).
    #[arg(long)]
    graph: PathBuf,

    /// Explicit configuration file path; overrides the normal search order.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON object supplying the graph's external inputs.
    #[arg(long)]
    input: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(outputs) => {
            let rendered = serde_json::to_string(&outputs).unwrap_or_else(|_| "{}".to_string());
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            error!(%message, "graph execution failed");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<HashMap<String, Value>, String> {
    let loader = match cli.config {
        Some(path) => ConfigLoader::new().with_explicit_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().await.map_err(|e| e.to_string())?;
    info!(scheduler = %config.scheduler, workers = config.workers.len(), "configuration loaded");

    let pool = Pool::new(Arc::new(TrivialStrategy));
    let worker = Arc::new(Worker::new("local"));
    pool.add_worker(Arc::new(LocalWorkerHandle::new(worker.clone()))).await.map_err(|e| e.to_string())?;

    let graph_json = tokio::fs::read_to_string(&cli.graph).await.map_err(|e| e.to_string())?;
    let literal: GraphLiteral = serde_json::from_str(&graph_json).map_err(|e| e.to_string())?;
    let graph = build_graph(&literal).map_err(|e| e.to_string())?;

    let inputs: HashMap<String, Value> = match cli.input {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| e.to_string())?,
        None => HashMap::new(),
    };

    let traverser = Traverser::with_worker(worker);
    let result = traverser.execute(graph, inputs, &CancellationHandle::new()).await.map_err(|e| e.to_string());

    pool.stop().await.map_err(|e| e.to_string())?;
    result
}

//! Demo harvesting server.
//!
//! Usage: `oai-harvest-server <corpus.json> <sets.json> <query>`
//!
//! Loads a record corpus and set definitions from JSON files, exports every
//! set, then answers one OAI-PMH query string and prints the response.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use oai_harvest_server::{HarvestingServer, InMemoryRecordStore, Record, ServerConfig, Set};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let [_, corpus, sets, query] = args.as_slice() else {
        eprintln!("usage: {} <corpus.json> <sets.json> <query>", program_name(&args));
        std::process::exit(2);
    };

    if let Err(e) = run(Path::new(corpus), Path::new(sets), query).await {
        tracing::error!(error = %e, "demo failed");
        std::process::exit(1);
    }
}

/// Name to print in usage text. `argv` may be empty when the process is
/// spawned without one.
fn program_name(args: &[String]) -> &str {
    args.first()
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(env!("CARGO_PKG_NAME"))
}

async fn run(
    corpus: &Path,
    sets: &Path,
    query: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let records: Vec<Record> = serde_json::from_str(&tokio::fs::read_to_string(corpus).await?)?;
    let sets: Vec<Set> = serde_json::from_str(&tokio::fs::read_to_string(sets).await?)?;
    tracing::info!(records = records.len(), sets = sets.len(), "loaded demo data");

    let store = Arc::new(InMemoryRecordStore::with_records(records));
    let server = HarvestingServer::new(ServerConfig::from_env(), store)?;

    for set in &sets {
        let description = Some(set.description.as_str()).filter(|d| !d.is_empty());
        server
            .registry()
            .create(&set.name, &set.definition, description)?;
    }
    let summary = server.exports().submit_all().wait().await?;
    for (set, error) in &summary.failed {
        tracing::warn!(set = %set, error = %error, "set export failed");
    }

    let response = server.handle_query(query).await?;
    println!("{}", response.to_xml());
    Ok(())
}

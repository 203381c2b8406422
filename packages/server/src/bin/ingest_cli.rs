//! Bulk restaurant ingestion CLI.
//!
//! Reads a JSON array of restaurant objects from a local file or an API
//! URL and upserts them into the graph store. Ratings are clamped to the
//! 0-5 scale; cuisine is inferred from name keywords when absent.
//!
//! Usage:
//!   ingest_cli --file restaurants.json
//!   ingest_cli --api https://example.com/api/restaurants

use anyhow::{Context, Result};
use clap::Parser;

use server_core::domains::ingest::bulk;
use server_core::graph::{GraphStore, Neo4jGraphStore};

#[derive(Parser)]
#[command(about = "Bulk-ingest restaurants into the graph store")]
struct Args {
    /// Path to a JSON file containing a restaurant array
    #[arg(long, conflicts_with = "api")]
    file: Option<std::path::PathBuf>,

    /// API URL to fetch restaurants from (GET)
    #[arg(long)]
    api: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let data: serde_json::Value = match (&args.file, &args.api) {
        (Some(path), None) => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&body).context("File is not valid JSON")?
        }
        (None, Some(url)) => {
            let response = reqwest::get(url)
                .await
                .with_context(|| format!("Failed to fetch {}", url))?;
            response
                .error_for_status()
                .context("Restaurant API returned an error")?
                .json()
                .await
                .context("Restaurant API response is not valid JSON")?
        }
        _ => anyhow::bail!("Pass exactly one of --file or --api"),
    };

    let (rows, skipped) = bulk::rows_from_json(&data);
    if skipped > 0 {
        tracing::warn!(skipped, "Skipped records without a usable name");
    }
    if rows.is_empty() {
        println!("No valid restaurant records found.");
        return Ok(());
    }

    let _ = dotenvy::dotenv();
    let store = Neo4jGraphStore::connect(
        &std::env::var("NEO4J_URI").context("NEO4J_URI must be set")?,
        &std::env::var("NEO4J_USER").context("NEO4J_USER must be set")?,
        &std::env::var("NEO4J_PASSWORD").context("NEO4J_PASSWORD must be set")?,
    )
    .await?;

    store.upsert_restaurants(&rows).await?;
    println!("Ingested {} restaurants.", rows.len());

    Ok(())
}

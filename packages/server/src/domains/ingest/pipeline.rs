//! Acquisition pipeline: discover -> upsert -> enrich.
//!
//! Triggered by the chat workflow when the graph cannot answer a question
//! about a place. Discovery returning nothing is a normal outcome for the
//! attempt, not an error - the workflow re-queries regardless.

use anyhow::{Context, Result};
use tracing::info;

use crate::domains::ingest::enrichment::{self, EnrichmentConfig, EnrichmentSummary};
use crate::graph::RestaurantRow;
use crate::kernel::ServerDeps;

/// Outcome of one acquisition run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionReport {
    /// Restaurants upserted from the directory.
    pub ingested: usize,
    /// Present when enrichment ran (it runs only for a non-empty batch).
    pub enrichment: Option<EnrichmentSummary>,
}

/// Discover restaurants in `place`, bulk-upsert them, then enrich the
/// batch. Returns after the enrichment pool has fully drained; the bulk
/// upsert always commits before any enrichment job starts.
pub async fn acquire(
    deps: &ServerDeps,
    config: &EnrichmentConfig,
    place: &str,
) -> Result<AcquisitionReport> {
    let places = deps
        .directory
        .discover(place)
        .await
        .context("Directory discovery failed")?;

    if places.is_empty() {
        info!(place = %place, "Discovery found no usable records");
        return Ok(AcquisitionReport::default());
    }

    let rows: Vec<RestaurantRow> = places
        .iter()
        .map(|p| RestaurantRow {
            name: p.name.clone(),
            city: p.city.clone(),
            country: p.country.clone(),
            place_rank: p.place_rank,
            ..Default::default()
        })
        .collect();

    deps.graph
        .upsert_restaurants(&rows)
        .await
        .context("Bulk restaurant upsert failed")?;

    info!(place = %place, count = rows.len(), "Ingested restaurants, starting enrichment");

    let names: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
    let summary = enrichment::enrich(deps, config, &names, place).await;

    Ok(AcquisitionReport {
        ingested: rows.len(),
        enrichment: Some(summary),
    })
}

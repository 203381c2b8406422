//! Bulk restaurant ingestion from a JSON array.
//!
//! Backs the `ingest_cli` binary: reads restaurant objects from a file or
//! an API response, clamps ratings to the 0-5 scale, and infers a cuisine
//! from name keywords when none is given.

use serde::Deserialize;

use crate::graph::{clamp_rating, RestaurantRow};

const CUISINE_KEYWORDS: &[&str] = &[
    "Japanese",
    "Chinese",
    "Korean",
    "Thai",
    "Indian",
    "Vietnamese",
    "Mexican",
    "American",
    "Italian",
    "French",
    "Turkish",
    "Greek",
    "Spanish",
    "Mediterranean",
    "Lebanese",
    "Middle Eastern",
    "Asian",
    "Barbecue",
];

#[derive(Debug, Deserialize)]
struct BulkRestaurant {
    name: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    cuisine: Option<String>,
}

/// Guess a cuisine from free text; `None` when no keyword matches.
pub fn guess_cuisine(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    CUISINE_KEYWORDS
        .iter()
        .find(|kw| lower.contains(&kw.to_lowercase()))
        .map(|kw| kw.to_string())
}

/// Convert a JSON array of restaurant objects into upsert rows.
///
/// Items without a non-empty `name` are skipped; the number skipped is
/// returned alongside the rows.
pub fn rows_from_json(data: &serde_json::Value) -> (Vec<RestaurantRow>, usize) {
    let items = match data.as_array() {
        Some(items) => items,
        None => return (Vec::new(), 0),
    };

    let mut skipped = 0;
    let rows = items
        .iter()
        .filter_map(|item| {
            let parsed: BulkRestaurant = match serde_json::from_value::<BulkRestaurant>(item.clone()) {
                Ok(parsed) if !parsed.name.is_empty() => parsed,
                _ => {
                    skipped += 1;
                    return None;
                }
            };

            let cuisine = parsed
                .cuisine
                .filter(|c| !c.is_empty())
                .or_else(|| guess_cuisine(&parsed.name));

            Some(RestaurantRow {
                name: parsed.name,
                rating: parsed.rating.map(clamp_rating),
                cuisine,
                ..Default::default()
            })
        })
        .collect();

    (rows, skipped)
}

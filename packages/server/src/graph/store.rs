//! Graph store abstraction.
//!
//! The knowledge base is a property graph of `Restaurant` nodes with
//! `MenuItem` and `Review` nodes attached through `servedIn` / `isAbout`
//! relationships. All writes are merge-or-create upserts keyed by name, so
//! repeated ingestion converges instead of duplicating.
//!
//! Menu items and reviews are deduplicated per restaurant: the identity key
//! is `(restaurant, dish)` / `(restaurant, text)`, never the content alone.
//! Two restaurants serving a dish with the same name stay two nodes.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A restaurant row for upsert.
///
/// Optional attributes never clear existing data: `None` (and empty
/// strings for `city`/`country`) leave whatever an earlier run wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestaurantRow {
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub place_rank: Option<i64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub cuisine: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItemRow {
    pub dish: String,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub text: String,
    pub score: Option<f64>,
}

/// Restaurant ratings live on a 0-5 scale; out-of-range input is clamped
/// at write time. Review scores are deliberately NOT clamped.
pub fn clamp_rating(rating: f64) -> f64 {
    rating.clamp(0.0, 5.0)
}

/// Key-upsert graph persistence with merge-style dedup semantics.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Bulk-upsert restaurants, all-or-nothing per batch.
    async fn upsert_restaurants(&self, rows: &[RestaurantRow]) -> Result<()>;

    /// Upsert menu items under `restaurant` (relationship `servedIn`).
    async fn upsert_menu_items(&self, restaurant: &str, rows: &[MenuItemRow]) -> Result<()>;

    /// Upsert reviews under `restaurant` (relationship `isAbout`).
    async fn upsert_reviews(&self, restaurant: &str, rows: &[ReviewRow]) -> Result<()>;

    /// Run a read query, returning each result row as a JSON object.
    async fn run_query(&self, statement: &str) -> Result<Vec<serde_json::Value>>;

    /// Describe the live schema (labels, relationship types, property
    /// keys) for the text-to-query chain.
    async fn refresh_schema(&self) -> Result<String>;

    /// Count nodes carrying `label`.
    async fn count_by_label(&self, label: &str) -> Result<i64>;
}

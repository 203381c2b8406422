//! In-memory graph store.
//!
//! HashMap-backed [`GraphStore`] with the same merge semantics as the
//! Neo4j implementation. Used by tests and keyless local runs.
//!
//! `run_query` does not interpret Cypher; it answers label-targeted MATCH
//! statements (the only shape the chat chain emits) by returning every row
//! stored under the label the statement mentions.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::store::{clamp_rating, GraphStore, MenuItemRow, RestaurantRow, ReviewRow};

#[derive(Default)]
struct Inner {
    restaurants: HashMap<String, RestaurantRow>,
    // keyed (restaurant, dish) / (restaurant, text) - per-entity dedup
    menu_items: HashMap<(String, String), MenuItemRow>,
    reviews: HashMap<(String, String), ReviewRow>,
}

#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored restaurants, for assertions.
    pub fn restaurants(&self) -> Vec<RestaurantRow> {
        let inner = self.inner.read().unwrap();
        let mut rows: Vec<_> = inner.restaurants.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// Snapshot of menu items under `restaurant`.
    pub fn menu_items(&self, restaurant: &str) -> Vec<MenuItemRow> {
        let inner = self.inner.read().unwrap();
        let mut rows: Vec<_> = inner
            .menu_items
            .iter()
            .filter(|((r, _), _)| r == restaurant)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| a.dish.cmp(&b.dish));
        rows
    }

    /// Snapshot of reviews under `restaurant`.
    pub fn reviews(&self, restaurant: &str) -> Vec<ReviewRow> {
        let inner = self.inner.read().unwrap();
        let mut rows: Vec<_> = inner
            .reviews
            .iter()
            .filter(|((r, _), _)| r == restaurant)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| a.text.cmp(&b.text));
        rows
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_restaurants(&self, rows: &[RestaurantRow]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        for row in rows {
            let entry = inner
                .restaurants
                .entry(row.name.clone())
                .or_insert_with(|| RestaurantRow {
                    name: row.name.clone(),
                    ..Default::default()
                });

            if !row.city.is_empty() {
                entry.city = row.city.clone();
            }
            if !row.country.is_empty() {
                entry.country = row.country.clone();
            }
            if let Some(rank) = row.place_rank {
                entry.place_rank = Some(rank);
            }
            if let Some(rating) = row.rating {
                entry.rating = Some(clamp_rating(rating));
            }
            if let Some(cuisine) = &row.cuisine {
                entry.cuisine = Some(cuisine.clone());
            }
        }
        Ok(())
    }

    async fn upsert_menu_items(&self, restaurant: &str, rows: &[MenuItemRow]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        for row in rows {
            let entry = inner
                .menu_items
                .entry((restaurant.to_string(), row.dish.clone()))
                .or_insert_with(|| MenuItemRow {
                    dish: row.dish.clone(),
                    price: None,
                });
            if row.price.is_some() {
                entry.price = row.price;
            }
        }
        Ok(())
    }

    async fn upsert_reviews(&self, restaurant: &str, rows: &[ReviewRow]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        for row in rows {
            let entry = inner
                .reviews
                .entry((restaurant.to_string(), row.text.clone()))
                .or_insert_with(|| ReviewRow {
                    text: row.text.clone(),
                    score: None,
                });
            if row.score.is_some() {
                entry.score = row.score;
            }
        }
        Ok(())
    }

    async fn run_query(&self, statement: &str) -> Result<Vec<serde_json::Value>> {
        let inner = self.inner.read().unwrap();

        let rows = if statement.contains("MenuItem") {
            inner
                .menu_items
                .iter()
                .map(|((restaurant, _), row)| {
                    serde_json::json!({
                        "restaurant": restaurant,
                        "dish": row.dish,
                        "price": row.price,
                    })
                })
                .collect()
        } else if statement.contains("Review") {
            inner
                .reviews
                .iter()
                .map(|((restaurant, _), row)| {
                    serde_json::json!({
                        "restaurant": restaurant,
                        "text": row.text,
                        "score": row.score,
                    })
                })
                .collect()
        } else if statement.contains("Restaurant") {
            inner
                .restaurants
                .values()
                .map(|row| serde_json::to_value(row).unwrap_or_default())
                .collect()
        } else {
            Vec::new()
        };

        Ok(rows)
    }

    async fn refresh_schema(&self) -> Result<String> {
        Ok(
            "Node labels: Restaurant, MenuItem, Review\nRelationship types: servedIn, isAbout\n\
             Property keys: name, city, country, place_rank, rating, cuisine, dish, price, text, score"
                .to_string(),
        )
    }

    async fn count_by_label(&self, label: &str) -> Result<i64> {
        let inner = self.inner.read().unwrap();
        let count = match label {
            "Restaurant" => inner.restaurants.len(),
            "MenuItem" => inner.menu_items.len(),
            "Review" => inner.reviews.len(),
            _ => 0,
        };
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(name: &str, city: &str) -> RestaurantRow {
        RestaurantRow {
            name: name.to_string(),
            city: city.to_string(),
            country: "Polska".to_string(),
            place_rank: Some(30),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent() {
        let store = MemoryGraphStore::new();

        store
            .upsert_restaurants(&[place("Studencka", "Warszawa")])
            .await
            .unwrap();
        store
            .upsert_restaurants(&[place("Studencka", "Warszawa")])
            .await
            .unwrap();

        assert_eq!(store.count_by_label("Restaurant").await.unwrap(), 1);
        assert_eq!(store.restaurants()[0].city, "Warszawa");
    }

    #[tokio::test]
    async fn latest_attributes_win_but_absent_ones_do_not_clear() {
        let store = MemoryGraphStore::new();

        store
            .upsert_restaurants(&[RestaurantRow {
                name: "Studencka".to_string(),
                city: "Warszawa".to_string(),
                rating: Some(4.0),
                ..Default::default()
            }])
            .await
            .unwrap();

        // Second run from the bulk-ingest path: no city, new rating.
        store
            .upsert_restaurants(&[RestaurantRow {
                name: "Studencka".to_string(),
                rating: Some(4.5),
                ..Default::default()
            }])
            .await
            .unwrap();

        let row = &store.restaurants()[0];
        assert_eq!(row.city, "Warszawa");
        assert_eq!(row.rating, Some(4.5));
    }

    #[tokio::test]
    async fn rating_is_clamped_on_write() {
        let store = MemoryGraphStore::new();

        for (name, rating) in [("A", -1.0), ("B", 7.0), ("C", 3.2)] {
            store
                .upsert_restaurants(&[RestaurantRow {
                    name: name.to_string(),
                    rating: Some(rating),
                    ..Default::default()
                }])
                .await
                .unwrap();
        }

        let rows = store.restaurants();
        assert_eq!(rows[0].rating, Some(0.0));
        assert_eq!(rows[1].rating, Some(5.0));
        assert_eq!(rows[2].rating, Some(3.2));
    }

    #[tokio::test]
    async fn menu_items_dedup_per_restaurant() {
        let store = MemoryGraphStore::new();
        let rows = vec![MenuItemRow {
            dish: "Pierogi".to_string(),
            price: Some(25.0),
        }];

        store.upsert_menu_items("Studencka", &rows).await.unwrap();
        store.upsert_menu_items("Zapiecek", &rows).await.unwrap();
        store.upsert_menu_items("Studencka", &rows).await.unwrap();

        // Same dish under two restaurants stays two nodes.
        assert_eq!(store.count_by_label("MenuItem").await.unwrap(), 2);
        assert_eq!(store.menu_items("Studencka").len(), 1);
    }

    #[tokio::test]
    async fn absent_price_keeps_previous_value() {
        let store = MemoryGraphStore::new();

        store
            .upsert_menu_items(
                "Studencka",
                &[MenuItemRow {
                    dish: "Pierogi".to_string(),
                    price: Some(25.0),
                }],
            )
            .await
            .unwrap();
        store
            .upsert_menu_items(
                "Studencka",
                &[MenuItemRow {
                    dish: "Pierogi".to_string(),
                    price: None,
                }],
            )
            .await
            .unwrap();

        assert_eq!(store.menu_items("Studencka")[0].price, Some(25.0));
    }

    #[tokio::test]
    async fn review_scores_are_not_clamped() {
        let store = MemoryGraphStore::new();

        store
            .upsert_reviews(
                "Studencka",
                &[ReviewRow {
                    text: "Great pierogi".to_string(),
                    score: Some(7.0),
                }],
            )
            .await
            .unwrap();

        assert_eq!(store.reviews("Studencka")[0].score, Some(7.0));
    }

    #[tokio::test]
    async fn run_query_answers_by_label() {
        let store = MemoryGraphStore::new();
        store
            .upsert_restaurants(&[place("Studencka", "Warszawa")])
            .await
            .unwrap();

        let rows = store
            .run_query("MATCH (r:Restaurant) RETURN r")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Studencka");

        assert!(store
            .run_query("MATCH (x:Unknown) RETURN x")
            .await
            .unwrap()
            .is_empty());
    }
}

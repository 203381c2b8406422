//! Neo4j-backed graph store.
//!
//! Cypher MERGE statements keyed by name give the upsert semantics; each
//! bulk call runs inside one transaction. Optional values travel as empty
//! strings and are applied through `CASE`-guarded `FOREACH` blocks so a
//! missing value never clears an existing property.

use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::{debug, info};

use super::store::{clamp_rating, GraphStore, MenuItemRow, RestaurantRow, ReviewRow};

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect to a Neo4j instance over bolt.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        info!(uri = %uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    async fn label_values(&self, statement: &str, column: &str) -> Result<Vec<String>> {
        let mut stream = self.graph.execute(query(statement)).await?;
        let mut values = Vec::new();
        while let Some(row) = stream.next().await? {
            if let Ok(value) = row.get::<String>(column) {
                values.push(value);
            }
        }
        Ok(values)
    }
}

fn opt_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_i64(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

const UPSERT_RESTAURANT: &str = "
    MERGE (r:Restaurant {name: $name})
    FOREACH (_ IN CASE WHEN $city = '' THEN [] ELSE [1] END |
        SET r.city = $city)
    FOREACH (_ IN CASE WHEN $country = '' THEN [] ELSE [1] END |
        SET r.country = $country)
    FOREACH (_ IN CASE WHEN $place_rank = '' THEN [] ELSE [1] END |
        SET r.place_rank = toInteger($place_rank))
    FOREACH (_ IN CASE WHEN $rating = '' THEN [] ELSE [1] END |
        SET r.rating = toFloat($rating))
    FOREACH (_ IN CASE WHEN $cuisine = '' THEN [] ELSE [1] END |
        SET r.cuisine = $cuisine)
";

const UPSERT_MENU_ITEM: &str = "
    MERGE (r:Restaurant {name: $restaurant})
    MERGE (m:MenuItem {name: $dish, restaurant: $restaurant})
    FOREACH (_ IN CASE WHEN $price = '' THEN [] ELSE [1] END |
        SET m.price = toFloat($price))
    MERGE (m)-[:servedIn]->(r)
";

const UPSERT_REVIEW: &str = "
    MERGE (r:Restaurant {name: $restaurant})
    MERGE (v:Review {text: $text, restaurant: $restaurant})
    FOREACH (_ IN CASE WHEN $score = '' THEN [] ELSE [1] END |
        SET v.score = toFloat($score))
    MERGE (v)-[:isAbout]->(r)
";

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn upsert_restaurants(&self, rows: &[RestaurantRow]) -> Result<()> {
        let mut txn = self.graph.start_txn().await?;
        for row in rows {
            txn.run(
                query(UPSERT_RESTAURANT)
                    .param("name", row.name.as_str())
                    .param("city", row.city.as_str())
                    .param("country", row.country.as_str())
                    .param("place_rank", opt_i64(row.place_rank))
                    .param("rating", opt_f64(row.rating.map(clamp_rating)))
                    .param("cuisine", row.cuisine.clone().unwrap_or_default()),
            )
            .await?;
        }
        txn.commit().await?;

        info!(count = rows.len(), "Upserted restaurants");
        Ok(())
    }

    async fn upsert_menu_items(&self, restaurant: &str, rows: &[MenuItemRow]) -> Result<()> {
        let mut txn = self.graph.start_txn().await?;
        for row in rows {
            txn.run(
                query(UPSERT_MENU_ITEM)
                    .param("restaurant", restaurant)
                    .param("dish", row.dish.as_str())
                    .param("price", opt_f64(row.price)),
            )
            .await?;
        }
        txn.commit().await?;

        info!(restaurant = %restaurant, count = rows.len(), "Upserted menu items");
        Ok(())
    }

    async fn upsert_reviews(&self, restaurant: &str, rows: &[ReviewRow]) -> Result<()> {
        let mut txn = self.graph.start_txn().await?;
        for row in rows {
            txn.run(
                query(UPSERT_REVIEW)
                    .param("restaurant", restaurant)
                    .param("text", row.text.as_str())
                    .param("score", opt_f64(row.score)),
            )
            .await?;
        }
        txn.commit().await?;

        info!(restaurant = %restaurant, count = rows.len(), "Upserted reviews");
        Ok(())
    }

    async fn run_query(&self, statement: &str) -> Result<Vec<serde_json::Value>> {
        debug!(statement = %statement, "Running graph query");

        let mut stream = self
            .graph
            .execute(query(statement))
            .await
            .context("Graph query failed")?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            match row.to::<serde_json::Value>() {
                Ok(value) => rows.push(value),
                Err(e) => debug!(error = %e, "Skipping unconvertible row"),
            }
        }
        Ok(rows)
    }

    async fn refresh_schema(&self) -> Result<String> {
        let labels = self
            .label_values("CALL db.labels() YIELD label RETURN label", "label")
            .await?;
        let relationships = self
            .label_values(
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType",
                "relationshipType",
            )
            .await?;
        let properties = self
            .label_values(
                "CALL db.propertyKeys() YIELD propertyKey RETURN propertyKey",
                "propertyKey",
            )
            .await?;

        Ok(format!(
            "Node labels: {}\nRelationship types: {}\nProperty keys: {}",
            labels.join(", "),
            relationships.join(", "),
            properties.join(", ")
        ))
    }

    async fn count_by_label(&self, label: &str) -> Result<i64> {
        let statement = format!("MATCH (n:`{}`) RETURN count(n) AS count", label);
        let mut stream = self.graph.execute(query(&statement)).await?;

        match stream.next().await? {
            Some(row) => Ok(row.get::<i64>("count").unwrap_or(0)),
            None => Ok(0),
        }
    }
}

//! OpenStreetMap Nominatim client for place discovery.
//!
//! Queries the public Nominatim search API for restaurant-like places in a
//! given area and normalizes the raw records into flat rows the rest of the
//! system can upsert. Nominatim rejects requests without a real User-Agent,
//! so the client always sends a browser one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/50.0.2661.102 Safari/537.36";

/// How many raw records to request per discovery query.
const RESULT_LIMIT: usize = 8;

/// A place record after normalization.
///
/// `name` is always non-empty: resolution falls back through
/// `display_name` and the address `amenity` before settling on a
/// placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPlace {
    pub name: String,
    pub city: String,
    pub country: String,
    pub place_rank: Option<i64>,
}

/// Raw Nominatim record, `format=jsonv2`.
#[derive(Debug, Deserialize)]
struct RawPlace {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<RawAddress>,
    #[serde(default)]
    place_rank: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAddress {
    #[serde(default)]
    amenity: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Directory of places, searchable by area name.
#[async_trait]
pub trait PlaceDirectory: Send + Sync {
    /// Find restaurant-like places in `place`.
    ///
    /// Zero usable records is an empty vec, not an error — the caller
    /// decides whether that is terminal.
    async fn discover(&self, place: &str) -> Result<Vec<NormalizedPlace>>;
}

/// Nominatim-backed [`PlaceDirectory`].
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests, self-hosted mirrors).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn search_url(&self, place: &str) -> String {
        let query = urlencoding::encode(&format!("{} restaurant", place)).into_owned();
        format!(
            "{}?addressdetails=1&format=jsonv2&limit={}&q={}",
            self.base_url, RESULT_LIMIT, query
        )
    }
}

#[async_trait]
impl PlaceDirectory for NominatimClient {
    async fn discover(&self, place: &str) -> Result<Vec<NormalizedPlace>> {
        let url = self.search_url(place);
        tracing::debug!(url = %url, "Nominatim search");

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .context("Failed to send Nominatim search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Nominatim API error {}: {}", status, body);
        }

        let raw: Vec<RawPlace> = response
            .json()
            .await
            .context("Failed to parse Nominatim response")?;

        let places = normalize_all(raw);
        tracing::info!(place = %place, count = places.len(), "Nominatim discovery finished");

        Ok(places)
    }
}

fn normalize_all(raw: Vec<RawPlace>) -> Vec<NormalizedPlace> {
    raw.into_iter()
        .map(normalize)
        .filter(|p| !p.name.is_empty())
        .collect()
}

fn normalize(item: RawPlace) -> NormalizedPlace {
    let address = item.address.unwrap_or_default();

    let name = item
        .name
        .filter(|n| !n.is_empty())
        .or_else(|| item.display_name.filter(|n| !n.is_empty()))
        .or_else(|| address.amenity.clone().filter(|n| !n.is_empty()))
        .unwrap_or_else(|| "Unknown Restaurant".to_string());

    NormalizedPlace {
        name,
        city: address.city.unwrap_or_default(),
        country: address.country.unwrap_or_default(),
        place_rank: item.place_rank,
    }
}

/// Scripted [`PlaceDirectory`] for tests.
#[derive(Default)]
pub struct MockPlaceDirectory {
    results: std::sync::Mutex<std::collections::HashMap<String, Vec<NormalizedPlace>>>,
    calls: std::sync::Mutex<Vec<String>>,
}

impl MockPlaceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_places(self, place: &str, places: Vec<NormalizedPlace>) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(place.to_string(), places);
        self
    }

    /// Places queried so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaceDirectory for MockPlaceDirectory {
    async fn discover(&self, place: &str) -> Result<Vec<NormalizedPlace>> {
        self.calls.lock().unwrap().push(place.to_string());
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(place)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> RawPlace {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn prefers_explicit_name() {
        let place = normalize(raw(serde_json::json!({
            "name": "Restauracja Studencka",
            "display_name": "Restauracja Studencka, Warszawa, Polska",
            "address": {"city": "Warszawa", "country": "Polska"},
            "place_rank": 30
        })));

        assert_eq!(place.name, "Restauracja Studencka");
        assert_eq!(place.city, "Warszawa");
        assert_eq!(place.country, "Polska");
        assert_eq!(place.place_rank, Some(30));
    }

    #[test]
    fn falls_back_to_display_name_then_amenity() {
        let place = normalize(raw(serde_json::json!({
            "name": "",
            "display_name": "Pierogarnia, Kraków",
            "address": {}
        })));
        assert_eq!(place.name, "Pierogarnia, Kraków");

        let place = normalize(raw(serde_json::json!({
            "address": {"amenity": "Bar Mleczny"}
        })));
        assert_eq!(place.name, "Bar Mleczny");
    }

    #[test]
    fn placeholder_when_nothing_usable() {
        let place = normalize(raw(serde_json::json!({"address": {}})));
        assert_eq!(place.name, "Unknown Restaurant");
    }

    #[test]
    fn missing_address_fields_become_empty() {
        let place = normalize(raw(serde_json::json!({"name": "Sushi Zen"})));
        assert_eq!(place.city, "");
        assert_eq!(place.country, "");
        assert_eq!(place.place_rank, None);
    }

    #[test]
    fn search_url_encodes_query() {
        let client = NominatimClient::new()
            .unwrap()
            .with_base_url("http://localhost:9999/search");
        let url = client.search_url("Nowy Sącz");

        assert!(url.starts_with("http://localhost:9999/search?"));
        assert!(url.contains("addressdetails=1"));
        assert!(url.contains("format=jsonv2"));
        assert!(url.contains("limit=8"));
        assert!(url.contains("q=Nowy%20S%C4%85cz%20restaurant"));
    }

    #[tokio::test]
    async fn mock_directory_replays_and_records() {
        let mock = MockPlaceDirectory::new().with_places(
            "Warszawa",
            vec![NormalizedPlace {
                name: "Restauracja Studencka".to_string(),
                city: "Warszawa".to_string(),
                country: "Polska".to_string(),
                place_rank: Some(30),
            }],
        );

        let places = mock.discover("Warszawa").await.unwrap();
        assert_eq!(places.len(), 1);
        assert!(mock.discover("Radom").await.unwrap().is_empty());
        assert_eq!(mock.calls(), vec!["Warszawa", "Radom"]);
    }
}

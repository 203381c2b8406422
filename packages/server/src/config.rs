use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub openai_api_key: String,
    pub tavily_api_key: Option<String>,
    pub port: u16,
    pub audit_dir: String,
    pub nominatim_base_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            neo4j_uri: env::var("NEO4J_URI").context("NEO4J_URI must be set")?,
            neo4j_user: env::var("NEO4J_USER").context("NEO4J_USER must be set")?,
            neo4j_password: env::var("NEO4J_PASSWORD").context("NEO4J_PASSWORD must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            tavily_api_key: env::var("TAVILY_API_KEY").ok(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            audit_dir: env::var("AUDIT_DIR").unwrap_or_else(|_| "./audit".to_string()),
            nominatim_base_url: env::var("NOMINATIM_BASE_URL").ok(),
        })
    }
}

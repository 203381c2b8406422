// Main entry point for the Platewise API server

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nominatim_client::NominatimClient;
use server_core::domains::chat::AuditTrail;
use server_core::domains::ingest::EnrichmentConfig;
use server_core::graph::Neo4jGraphStore;
use server_core::kernel::{
    BaseSearchService, HttpPageFetcher, NoopSearchService, OpenAIClient, ServerDeps, TavilyClient,
};
use server_core::server::build_app;
use server_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Platewise API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to the graph store
    tracing::info!("Connecting to Neo4j...");
    let graph = Neo4jGraphStore::connect(
        &config.neo4j_uri,
        &config.neo4j_user,
        &config.neo4j_password,
    )
    .await
    .context("Failed to connect to graph store")?;
    tracing::info!("Graph store connected");

    // Assemble dependencies
    let search: Arc<dyn BaseSearchService> = match config.tavily_api_key.clone() {
        Some(api_key) => Arc::new(TavilyClient::new(api_key)?),
        None => {
            tracing::warn!("TAVILY_API_KEY not set - enrichment search is disabled");
            Arc::new(NoopSearchService)
        }
    };

    let mut directory = NominatimClient::new()?;
    if let Some(base_url) = config.nominatim_base_url.clone() {
        directory = directory.with_base_url(base_url);
    }

    let deps = ServerDeps::new(
        Arc::new(graph),
        Arc::new(OpenAIClient::new(config.openai_api_key.clone())),
        search,
        Arc::new(HttpPageFetcher::new()),
        Arc::new(directory),
        Arc::new(AuditTrail::new(config.audit_dir.clone())),
    );

    // Build application
    let app = build_app(deps, EnrichmentConfig::default());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Chat endpoint: http://localhost:{}/api/v1/chat/message", config.port);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

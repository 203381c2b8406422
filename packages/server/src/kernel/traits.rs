// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (what to prompt for, what to do with results) lives in
// the domain modules that consume them.
//
// Naming convention: Base* for trait names (e.g., BaseCompletion)

use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Completion Trait (Infrastructure - Generic LLM capabilities)
// =============================================================================

/// Large-language-model completion service.
///
/// Two modes: free-text (`complete`) and schema-constrained
/// (`complete_structured`, returning raw JSON conforming to the schema).
/// Use [`super::structured::extract`] for the typed variant.
#[async_trait]
pub trait BaseCompletion: Send + Sync {
    /// Complete against `instructions`, with `input` as the user payload
    /// (which may be a large text blob). Returns the raw text response.
    async fn complete(&self, instructions: &str, input: &str) -> Result<String>;

    /// Complete with a JSON schema constraint. Returns a raw JSON string
    /// conforming to `schema`; parse with serde_json in calling code.
    async fn complete_structured(
        &self,
        instructions: &str,
        input: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String>;
}

// =============================================================================
// Web Search Trait (Infrastructure)
// =============================================================================

/// A single ranked result from a web search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait BaseSearchService: Send + Sync {
    /// Search the web, returning up to `max_results` ranked results.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

// =============================================================================
// Page Fetcher Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BasePageFetcher: Send + Sync {
    /// Fetch the body of `url` as text, bounded to the implementation's
    /// payload limit.
    async fn fetch(&self, url: &str) -> Result<String>;
}

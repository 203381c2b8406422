// TestDependencies - mock implementations for testing
//
// Scripted stand-ins for the completion, search, and page-fetch services.
// Responses are keyed by a substring of the call's instructions/query so a
// single mock can serve the several distinct prompts one turn makes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::traits::{BaseCompletion, BasePageFetcher, BaseSearchService, SearchResult};

// =============================================================================
// Mock Completion
// =============================================================================

/// A completion call observed by [`MockCompletion`].
#[derive(Debug, Clone)]
pub struct CompletionCall {
    pub instructions: String,
    pub input: String,
    pub structured: bool,
}

pub struct MockCompletion {
    // keyed by an instructions substring; responses replay in order, the
    // last one repeating once the queue is exhausted
    responses: Arc<Mutex<HashMap<String, Vec<String>>>>,
    calls: Arc<Mutex<Vec<CompletionCall>>>,
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletion {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Respond with `response` to any call whose instructions contain
    /// `instructions_contain`. Repeated registrations for the same key
    /// queue up and replay in order.
    pub fn with_response(self, instructions_contain: &str, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(instructions_contain.to_string())
            .or_default()
            .push(response.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any observed call's instructions contain `needle`.
    pub fn was_asked(&self, needle: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.instructions.contains(needle))
    }

    fn respond(&self, instructions: &str) -> Result<String> {
        let mut responses = self.responses.lock().unwrap();
        for (key, queue) in responses.iter_mut() {
            if instructions.contains(key.as_str()) {
                return Ok(if queue.len() > 1 {
                    queue.remove(0)
                } else {
                    queue[0].clone()
                });
            }
        }
        anyhow::bail!("MockCompletion: no response scripted for: {}", instructions)
    }
}

#[async_trait]
impl BaseCompletion for MockCompletion {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String> {
        self.calls.lock().unwrap().push(CompletionCall {
            instructions: instructions.to_string(),
            input: input.to_string(),
            structured: false,
        });
        self.respond(instructions)
    }

    async fn complete_structured(
        &self,
        instructions: &str,
        input: &str,
        _schema_name: &str,
        _schema: serde_json::Value,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(CompletionCall {
            instructions: instructions.to_string(),
            input: input.to_string(),
            structured: true,
        });
        self.respond(instructions)
    }
}

// =============================================================================
// Mock Search
// =============================================================================

pub struct MockSearch {
    results: Arc<Mutex<HashMap<String, Vec<SearchResult>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Return `urls` for any query containing `query_contains`.
    pub fn with_urls(self, query_contains: &str, urls: &[&str]) -> Self {
        let results = urls
            .iter()
            .map(|u| SearchResult {
                title: format!("Page: {}", u),
                url: u.to_string(),
                snippet: String::new(),
            })
            .collect();
        self.results
            .lock()
            .unwrap()
            .insert(query_contains.to_string(), results);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseSearchService for MockSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.lock().unwrap().push(query.to_string());
        let results = self.results.lock().unwrap();
        for (key, matches) in results.iter() {
            if query.contains(key.as_str()) {
                return Ok(matches.iter().take(max_results).cloned().collect());
            }
        }
        Ok(vec![])
    }
}

// =============================================================================
// Mock Fetcher
// =============================================================================

pub struct MockFetcher {
    pages: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BasePageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockFetcher: no page for {}", url))
    }
}

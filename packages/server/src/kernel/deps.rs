//! Server dependencies for domain logic (traits for testability)
//!
//! Central dependency container handed to the chat workflow and the
//! acquisition pipeline. Every external service sits behind a trait so
//! tests can swap in the mocks from `test_dependencies`.

use std::sync::Arc;

use nominatim_client::PlaceDirectory;

use crate::domains::chat::audit::AuditTrail;
use crate::graph::GraphStore;
use crate::kernel::{BaseCompletion, BasePageFetcher, BaseSearchService};

/// Dependencies accessible to domain logic.
#[derive(Clone)]
pub struct ServerDeps {
    pub graph: Arc<dyn GraphStore>,
    pub ai: Arc<dyn BaseCompletion>,
    pub search: Arc<dyn BaseSearchService>,
    pub fetcher: Arc<dyn BasePageFetcher>,
    pub directory: Arc<dyn PlaceDirectory>,
    pub audit: Arc<AuditTrail>,
}

impl ServerDeps {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        ai: Arc<dyn BaseCompletion>,
        search: Arc<dyn BaseSearchService>,
        fetcher: Arc<dyn BasePageFetcher>,
        directory: Arc<dyn PlaceDirectory>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            graph,
            ai,
            search,
            fetcher,
            directory,
            audit,
        }
    }
}

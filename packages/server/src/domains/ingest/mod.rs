//! Ingestion domain - discovery, acquisition, and enrichment.

pub mod bulk;
pub mod enrichment;
pub mod parser;
pub mod pipeline;

pub use enrichment::{EnrichmentConfig, EnrichmentSummary};
pub use parser::ParseError;
pub use pipeline::{acquire, AcquisitionReport};

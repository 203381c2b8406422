//! Graph knowledge base - store trait and implementations.

pub mod memory;
pub mod neo4j;
pub mod store;

pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jGraphStore;
pub use store::{clamp_rating, GraphStore, MenuItemRow, RestaurantRow, ReviewRow};

//! Schema model, discovery, relevance matching and prompt rendering.

pub mod discovery;
pub mod model;
pub mod relevance;
pub mod render;

pub use discovery::{ColumnQuery, SchemaDiscoverer, SnapshotSource};
pub use model::{Column, KeyRole, Relationship, SchemaSnapshot, Table};
pub use relevance::match_tables;
pub use render::render;

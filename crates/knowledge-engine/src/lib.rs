//! Typed knowledge graph for exam preparation material.
//!
//! Questions, definitions, tools, mistakes, examples, lectures, tutorials,
//! courses and homework live in one [`KnowledgeStore`] keyed by globally
//! unique IDs. Relationships are ID references; the store keeps them intact
//! across deletes and renames.

pub mod config;
pub mod error;
pub mod exam;
pub mod export;
pub mod integrity;
pub mod loader;
pub mod mcp_stdio;
pub mod mcp_types;
pub mod model;
pub mod persistence;
pub mod render;
pub mod schema;
pub mod store;

pub use error::{LoadError, MalformedRecord, StoreError};
pub use loader::{LoadReport, Record};
pub use model::{KnowledgeNode, Node};
pub use persistence::DataDir;
pub use schema::NodeKind;
pub use store::KnowledgeStore;

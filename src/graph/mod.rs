//! Knowledge base graph
//!
//! Persisted entities and the relationships between them:
//! - Entities of a fixed set of kinds with properties and provenance
//! - Directed, typed relationships with confidence
//! - In-memory storage with kind and natural-key indices

pub mod entity;
pub mod property;
pub mod relationship;
pub mod source;
pub mod store;
pub mod types;

pub use entity::{Comment, Entity, Releasability, Rfi, RfiRequest, RfiResponse, Sighting};
pub use property::{PropertyMap, PropertyValue};
pub use relationship::Relationship;
pub use source::{SourceAttribution, SourceInstance};
pub use store::{EntityStore, GraphError, GraphResult, StoreSnapshot};
pub use types::{EntityId, EntityKind, RelationId, RelationType};

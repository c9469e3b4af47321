//! IntelGraph
//!
//! Import resolution for structured threat-intelligence documents. A parsed
//! document (a package of indicators, observables, threat actors, campaigns
//! and incidents) is walked node by node and turned into typed entities in a
//! knowledge base, with provenance, auxiliary metadata and relationships.
//!
//! # Architecture
//!
//! - `document`: the typed node graph and the `DocumentParser` seam
//! - `vocab`: lookup tables from document enumerations to KB categories
//! - `kb`: the knowledge-base handler traits and an in-memory implementation
//! - `graph`: entity/relationship storage behind the in-memory KB
//! - `import`: source resolution, the walk, metadata passes and stitching
//! - `config`: YAML import configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use intelgraph::{GraphKnowledgeBase, ImportRequest, Importer};
//! use serde_json::json;
//!
//! let mut kb = GraphKnowledgeBase::with_sources(["PartnerCERT"]);
//! let document = json!({
//!     "id": "pkg-1",
//!     "header": {"information_source": {"identity": {"name": "PartnerCERT"}}},
//!     "observables": [{
//!         "id": "obs-1",
//!         "object": {"properties": {"type": "DomainName", "value": "evil.example"}}
//!     }]
//! });
//!
//! let request = ImportRequest::new("jdoe", "TAXII").with_event(true);
//! let mut importer = Importer::new(&mut kb);
//! let (run, report) = importer
//!     .import_and_stitch(document.to_string().as_bytes(), &request)
//!     .unwrap();
//!
//! assert!(run.failures.is_empty());
//! assert!(run.ledger.was_imported("obs-1"));
//! assert_eq!(report.default_edges, 1);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod document;
pub mod graph;
pub mod import;
pub mod kb;
pub mod vocab;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigResult, ImportConfig, MarkerTitles};

pub use document::{DocumentParser, JsonDocumentParser, Package, ParseError};

pub use graph::{
    Entity, EntityId, EntityKind, EntityStore, GraphError, GraphResult, PropertyMap,
    PropertyValue, RelationType, Relationship, SourceAttribution, SourceInstance,
};

pub use import::{
    FailureLedger, FailureRecord, ImportError, ImportLedger, ImportPhase, ImportRequest,
    ImportResult, ImportRun, ImportedEntity, Importer, NodeError, StitchPolicy, StitchReport,
};

pub use kb::{
    GraphKnowledgeBase, HandlerContext, HandlerError, HandlerResult, KnowledgeBase,
    MetadataHandlers, PersistenceHandlers,
};

pub use vocab::{DefaultVocabulary, Vocabulary};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

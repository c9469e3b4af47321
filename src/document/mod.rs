//! Threat-intelligence document model
//!
//! The typed node graph a parser produces from a raw document: a package
//! with a header, incidents, indicators, observables, threat actors and
//! campaigns. Nodes reference each other by document-scoped id.

pub mod observable;
pub mod package;
pub mod parser;

pub use observable::{
    AddressProperties, ArtifactProperties, ArtifactType, CustomObjectProperties, CustomProperty,
    CyboxObject, EmailHeader, EmailMessageProperties, FileProperties, ObjectProperties,
    Observable, Packaging, RelatedObject, UnsupportedProperties, UriProperties, ValueProperties,
};
pub use package::{
    Campaign, Header, Identity, Incident, Indicator, InformationSource, KillChainPhaseRef,
    Marking, MarkingStructure, Package, RelatedIndicator, RelatedRef, Sighting, ThreatActor,
    TimeInfo, Ttp,
};
pub use parser::{DocumentParser, JsonDocumentParser, ParseError, ParseResult};

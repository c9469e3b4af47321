//! Core type definitions for the knowledge base graph

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a persisted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    /// Parses the hex form produced by `Display`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim(), 16).map(EntityId)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        EntityId(id)
    }
}

/// Unique identifier for a relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RelationId(pub u64);

impl RelationId {
    pub fn new(id: u64) -> Self {
        RelationId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelationId({})", self.0)
    }
}

/// The kind of entity an imported node becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum EntityKind {
    Event,
    Indicator,
    Actor,
    Domain,
    IP,
    Sample,
    Certificate,
    PCAP,
    RawData,
    Email,
    Campaign,
}

impl EntityKind {
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Event,
        EntityKind::Indicator,
        EntityKind::Actor,
        EntityKind::Domain,
        EntityKind::IP,
        EntityKind::Sample,
        EntityKind::Certificate,
        EntityKind::PCAP,
        EntityKind::RawData,
        EntityKind::Email,
        EntityKind::Campaign,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Event => "Event",
            EntityKind::Indicator => "Indicator",
            EntityKind::Actor => "Actor",
            EntityKind::Domain => "Domain",
            EntityKind::IP => "IP",
            EntityKind::Sample => "Sample",
            EntityKind::Certificate => "Certificate",
            EntityKind::PCAP => "PCAP",
            EntityKind::RawData => "RawData",
            EntityKind::Email => "Email",
            EntityKind::Campaign => "Campaign",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

/// Relationship type (e.g., "Related To", "Contains")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RelationType(String);

impl RelationType {
    pub const RELATED_TO: &'static str = "Related To";
    pub const CONTAINS: &'static str = "Contains";

    pub fn new(rel_type: impl Into<String>) -> Self {
        RelationType(rel_type.into())
    }

    pub fn related_to() -> Self {
        RelationType::new(Self::RELATED_TO)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RelationType {
    fn from(s: String) -> Self {
        RelationType(s)
    }
}

impl From<&str> for RelationType {
    fn from(s: &str) -> Self {
        RelationType(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_round_trips_through_display() {
        let id = EntityId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(format!("{}", id), "000000000000002a");
        assert_eq!("000000000000002a".parse::<EntityId>().unwrap(), id);

        let id2: EntityId = 100.into();
        assert_eq!(id2.as_u64(), 100);
    }

    #[test]
    fn test_relation_id() {
        let id = RelationId::new(99);
        assert_eq!(id.as_u64(), 99);
        assert_eq!(format!("{}", id), "RelationId(99)");
    }

    #[test]
    fn test_entity_kind_names() {
        assert_eq!(EntityKind::IP.to_string(), "IP");
        assert_eq!(EntityKind::RawData.as_str(), "RawData");
        assert_eq!("pcap".parse::<EntityKind>().unwrap(), EntityKind::PCAP);
        assert!("Widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_relation_type() {
        let rel = RelationType::new("Contains");
        assert_eq!(rel.as_str(), RelationType::CONTAINS);
        assert_eq!(RelationType::related_to().to_string(), "Related To");
    }

    #[test]
    fn test_id_ordering() {
        assert!(EntityId::new(1) < EntityId::new(2));
    }
}
